//! services/api/src/web/ws_handler.rs
//!
//! WebSocket endpoint that keeps UI clients in sync. Each connection subscribes
//! to every Event Bus topic and to both stores' change notifications, and
//! forwards them as `ServerMessage`s until the client goes away.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use onyx_core::events::{Event, HandlerError, Topic};
use onyx_core::listeners::Subscription;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Registers the connection's forwarding callbacks on the bus and both stores.
fn subscribe_all(app_state: &AppState, tx: &UnboundedSender<ServerMessage>) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();

    for topic in Topic::ALL {
        let tx = tx.clone();
        subscriptions.push(app_state.bus.subscribe(
            topic,
            Arc::new(move |event: &Event| -> Result<(), HandlerError> {
                tx.send(ServerMessage::from(event))
                    .map_err(|_| "websocket connection closed".into())
            }),
        ));
    }

    let subjects_tx = tx.clone();
    subscriptions.push(app_state.subjects.subscribe(Arc::new(move || {
        let _ = subjects_tx.send(ServerMessage::SubjectsRefresh);
    })));
    let timers_tx = tx.clone();
    subscriptions.push(app_state.timers.subscribe(Arc::new(move || {
        let _ = timers_tx.send(ServerMessage::TimersRefresh);
    })));

    subscriptions
}

/// Takes the next message plus everything already queued, dropping refresh
/// signals that repeat one already in the batch.
async fn next_batch(rx: &mut UnboundedReceiver<ServerMessage>) -> Option<Vec<ServerMessage>> {
    let first = rx.recv().await?;
    let mut batch = vec![first];
    loop {
        match rx.try_recv() {
            Ok(message) => {
                let is_refresh = matches!(
                    message,
                    ServerMessage::SubjectsRefresh | ServerMessage::TimersRefresh
                );
                if !(is_refresh && batch.contains(&message)) {
                    batch.push(message);
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    Some(batch)
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established.");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let subscriptions = subscribe_all(&app_state, &tx);

    // --- Main Loop ---
    loop {
        tokio::select! {
            batch = next_batch(&mut rx) => {
                let Some(batch) = batch else { break };
                let mut failed = false;
                for message in &batch {
                    if send_message(&mut sender, message).await.is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    warn!("Failed to push notification; closing connection.");
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => vec![ServerMessage::Pong],
                            Ok(ClientMessage::Resync) => {
                                debug!("Client requested resync.");
                                vec![ServerMessage::SubjectsRefresh, ServerMessage::TimersRefresh]
                            }
                            Err(e) => {
                                warn!("Failed to deserialize client message: {}", e);
                                vec![ServerMessage::Error {
                                    message: format!("Unrecognised message: {}", e),
                                }]
                            }
                        };
                        for message in reply {
                            // Queued so replies stay ordered with pending notifications.
                            let _ = tx.send(message);
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client sent close message.");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        info!("Client disconnected.");
                        break;
                    }
                }
            }
        }
    }

    // --- Cleanup ---
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    info!("WebSocket connection closed.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batches_collapse_repeated_refreshes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for message in [
            ServerMessage::SubjectsRefresh,
            ServerMessage::TimersRefresh,
            ServerMessage::SubjectsRefresh,
            ServerMessage::Pong,
            ServerMessage::Pong,
        ] {
            tx.send(message).unwrap();
        }

        let batch = next_batch(&mut rx).await.unwrap();
        assert_eq!(
            batch,
            vec![
                ServerMessage::SubjectsRefresh,
                ServerMessage::TimersRefresh,
                ServerMessage::Pong,
                ServerMessage::Pong,
            ]
        );

        drop(tx);
        assert!(next_batch(&mut rx).await.is_none());
    }
}
