use actix_web::{web, HttpRequest, HttpResponse};

use crate::api::filter_from;
use crate::services::WsSink;
use crate::state::AppState;

/// Upgrades to a WebSocket and runs the snapshot loop for this connection.
/// The filter comes from the upgrade request's query string.
pub async fn realtime(
    req: HttpRequest,
    body: web::Payload,
    data: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    let filter = filter_from(&req);
    let (response, session, stream) = actix_ws::handle(&req, body)?;

    let distributor = data.distributor.clone();
    log::debug!("Realtime connection opened: {:?}", filter);

    actix_rt::spawn(async move {
        let mut sink = WsSink::new(session, stream);
        distributor.run(&mut sink, &filter).await;
        sink.close().await;
    });

    Ok(response)
}
