//! WebSocket connection handler.
//!
//! Each connection gets one subscriber session. A writer task drains the
//! session's outbox into the socket while the reader loop turns client
//! frames into joins and leaves. Either side ending closes the session.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};

use super::message::{ClientEvent, ServerEvent};
use crate::application::services::{ConnectionLifecycle, SubscriberSession};
use crate::infrastructure::api::ApiState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    let lifecycle = state.lifecycle.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, lifecycle))
}

/// Serve one subscriber connection until either side closes it.
pub async fn handle_socket(socket: WebSocket, lifecycle: ConnectionLifecycle) {
    let (session, mut outbox) = lifecycle.open();
    let subscriber = session.id();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(update) = outbox.recv().await {
            let json = match serde_json::to_string(&ServerEvent::from(update)) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize price update");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_text_message(&session, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(%subscriber, error = %e, "WebSocket error");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    session.close();
    send_task.abort();
}

/// Apply one client frame. Unparseable frames are ignored.
pub fn handle_text_message(session: &SubscriberSession, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::Subscribe { symbol }) => {
            session.join(&symbol);
        }
        Ok(ClientEvent::Unsubscribe { symbol }) => session.leave(&symbol),
        Err(e) => {
            tracing::debug!(subscriber = %session.id(), error = %e, "Ignoring unparseable client message");
        }
    }
}
