use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::api::filter_from;
use crate::models::{ApiResponse, ProcessCounts, ProcessList};
use crate::state::AppState;

// Every handler answers 200; failures are signalled through `success` and the
// cause only goes to the log.

pub async fn list_processes(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let query = data.builder.build(&filter_from(&req));

    match data.store.query(&query).await {
        Ok(processes) => HttpResponse::Ok().json(ApiResponse::ok(Some(ProcessList {
            processes,
            limit: query.limit,
            page: query.page,
        }))),
        Err(e) => {
            log::error!("Failed to query processes: {}", e);
            HttpResponse::Ok().json(ApiResponse::<Option<ProcessList>>::failed(None))
        }
    }
}

pub async fn list_users(data: web::Data<AppState>) -> impl Responder {
    match data.store.distinct_users().await {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::ok(users)),
        Err(e) => {
            log::error!("Failed to list users: {}", e);
            HttpResponse::Ok().json(ApiResponse::failed(Vec::<String>::new()))
        }
    }
}

pub async fn get_counts(data: web::Data<AppState>) -> impl Responder {
    let mut counts = ProcessCounts::default();

    match data.store.count().await {
        Ok(n) => counts.process_count = n,
        Err(e) => {
            log::error!("Failed to count processes: {}", e);
            return HttpResponse::Ok().json(ApiResponse::failed(counts));
        }
    }

    match data.store.user_count().await {
        Ok(n) => counts.users_count = n,
        Err(e) => {
            log::error!("Failed to count users: {}", e);
            return HttpResponse::Ok().json(ApiResponse::failed(counts));
        }
    }

    HttpResponse::Ok().json(ApiResponse::ok(counts))
}

pub async fn get_reports(data: web::Data<AppState>) -> impl Responder {
    match data.store.aggregate_by_user().await {
        Ok(reports) => HttpResponse::Ok().json(ApiResponse::ok(reports)),
        Err(e) => {
            log::error!("Failed to build process reports: {}", e);
            HttpResponse::Ok().json(ApiResponse::failed(Vec::<crate::models::ProcessUserReport>::new()))
        }
    }
}
