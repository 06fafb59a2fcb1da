pub mod metrics;
pub mod processes;
pub mod realtime;

pub use metrics::get_metrics;
pub use processes::{get_counts, get_reports, list_processes, list_users};
pub use realtime::realtime;

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::models::ProcessFilter;

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy"
    }))
}

/// Reads a [`ProcessFilter`] from the raw query string. Never rejects the
/// request: a repeated key keeps its first value and unknown keys are ignored.
pub(crate) fn filter_from(req: &HttpRequest) -> ProcessFilter {
    match web::Query::<Vec<(String, String)>>::from_query(req.query_string()) {
        Ok(pairs) => ProcessFilter::from_pairs(pairs.into_inner()),
        Err(e) => {
            log::warn!("Ignoring unreadable query string: {}", e);
            ProcessFilter::default()
        }
    }
}

/// Mounts every route. Shared by `main` and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/processes")
            .service(
                web::resource("")
                    .route(web::get().to(list_processes))
                    .route(web::post().to(list_processes)),
            )
            .route("/users", web::get().to(list_users))
            .route("/counts", web::get().to(get_counts))
            .route("/reports", web::get().to(get_reports))
            .route("/realtime", web::get().to(realtime)),
    )
    .route("/metrics", web::get().to(get_metrics))
    .route("/health", web::get().to(health));
}
