use poem::web::websocket::WebSocket;
use poem::web::{Data, Json};
use poem::{handler, IntoResponse, Request};
use shellgate_common::Target;
use shellgate_core::Services;
use tracing::*;
use uuid::Uuid;

use crate::relay::SessionRelay;

#[handler]
pub async fn api_ssh_session(
    ws: WebSocket,
    req: &Request,
    Data(services): Data<&Services>,
) -> impl IntoResponse {
    let services = services.clone();
    let remote_address = req.remote_addr().as_socket_addr().cloned();
    ws.on_upgrade(move |socket| async move {
        let id = Uuid::new_v4();
        let span = info_span!("session", id=%id);
        SessionRelay::new(id, services)
            .run(socket, remote_address)
            .instrument(span)
            .await;
    })
}

/// Read-only view of the inventory; writes belong to the external CRUD
/// API that maintains the store file.
#[handler]
pub async fn api_targets_list(Data(services): Data<&Services>) -> Json<Vec<Target>> {
    Json(services.targets.snapshot().await.into_targets())
}
