use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::notify::{Channel, Notification};
use crate::state::AppState;

/// Optional channel filter. Without one, the socket sees every event
/// (the admin dashboard case).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WsFilter {
    pub courier_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub admin: Option<bool>,
}

impl WsFilter {
    fn matches(&self, notification: &Notification) -> bool {
        if self.courier_id.is_none() && self.order_id.is_none() && self.admin.is_none() {
            return true;
        }
        match notification.channel {
            Channel::Courier(id) => self.courier_id == Some(id),
            Channel::Order(id) => self.order_id == Some(id),
            Channel::Admin => self.admin == Some(true),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<WsFilter>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: WsFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.notifications.subscribe());

    info!("websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            // Lagged receivers skip ahead; dropped events are fine for a
            // best-effort sink.
            let Ok(notification) = event else { continue };
            if !filter.matches(&notification) {
                continue;
            }

            let json = match serde_json::to_string(&notification) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notification for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
