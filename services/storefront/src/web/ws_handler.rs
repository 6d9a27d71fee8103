//! services/storefront/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection owns one cart session; client frames are applied to it and
//! every cart change is pushed back as a full snapshot.

use crate::{
    error::AppError,
    web::{
        protocol::{ClientMessage, ServerMessage},
        state::{AppState, CartSession},
    },
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
use std::sync::Arc;
use storefront_core::{CartChanged, CartSyncService};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established.");

    // The sender is wrapped in an Arc<Mutex<>> to allow for shared mutable access across tasks.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let session = CartSession::new(&app_state);
    let cart = session.cart();

    // --- 1. Initial snapshot, then push every change ---
    let changes = cart.subscribe();
    if send_message(&ws_sender, &ServerMessage::cart_updated(&cart))
        .await
        .is_err()
    {
        error!("Failed to send initial cart snapshot.");
        session.close().await;
        return;
    }
    let push_token = CancellationToken::new();
    let push_task = tokio::spawn(push_cart_updates(
        cart.clone(),
        changes,
        ws_sender.clone(),
        push_token.clone(),
    ));

    // --- 2. Main Message Loop ---
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        debug!(?message, "Received client message.");
                        session.apply(message).await
                    }
                    Err(e) => {
                        warn!("Failed to parse client message: {}", e);
                        Some(ServerMessage::bad_request(format!("Unrecognized message: {}", e)))
                    }
                };
                if let Some(reply) = reply {
                    if let Err(e) = send_message(&ws_sender, &reply).await {
                        error!("Failed to send reply: {}", e);
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client closed the connection.");
                break;
            }
            Ok(_) => {} // Binary frames and pings carry nothing for the cart.
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    push_token.cancel();
    if let Err(e) = push_task.await {
        error!("Cart update task failed: {}", e);
    }
    session.close().await;
    info!("WebSocket connection closed.");
}

/// Sends a fresh snapshot to the client after every cart change until cancelled.
async fn push_cart_updates(
    cart: Arc<CartSyncService>,
    mut changes: broadcast::Receiver<CartChanged>,
    ws_sender: WsSender,
    cancellation_token: CancellationToken,
) {
    loop {
        let changed = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => break,
            changed = changes.recv() => changed,
        };
        match changed {
            // A lagging receiver still only needs the latest state.
            Ok(CartChanged) | Err(broadcast::error::RecvError::Lagged(_)) => {
                let snapshot = ServerMessage::cart_updated(&cart);
                if let Err(e) = send_message(&ws_sender, &snapshot).await {
                    warn!("Failed to push cart update, client may have disconnected: {}", e);
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_message(ws_sender: &WsSender, message: &ServerMessage) -> Result<(), AppError> {
    let json = serde_json::to_string(message).map_err(|e| AppError::Internal(e.to_string()))?;
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await?;
    Ok(())
}
