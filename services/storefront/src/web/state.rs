//! services/storefront/src/web/state.rs
//!
//! Defines the gateway's shared state and the per-connection cart session.

use crate::adapters::SessionIdentity;
use crate::config::Config;
use crate::web::protocol::{ClientMessage, ServerMessage};
use std::sync::Arc;
use storefront_core::{CartSyncService, DocumentStore, Identity};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<Config>,
}

//=========================================================================================
// CartSession (Specific to One WebSocket Connection)
//=========================================================================================

/// One client's cart: an identity source driven by the client's sign-in and
/// sign-out messages, and the cart service listening to it.
pub struct CartSession {
    identity: SessionIdentity,
    cart: Arc<CartSyncService>,
}

impl CartSession {
    /// Creates a signed-out session over the shared store.
    pub fn new(app_state: &AppState) -> Self {
        let identity = SessionIdentity::new();
        let cart = Arc::new(CartSyncService::new(
            app_state.store.clone(),
            &identity,
            app_state.config.sync_options(),
        ));
        Self { identity, cart }
    }

    pub fn cart(&self) -> Arc<CartSyncService> {
        self.cart.clone()
    }

    /// Handles one client message. Returns the direct reply, if the message has
    /// one; cart changes are reported separately through change notifications.
    pub async fn apply(&self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::SignIn { user_id } => {
                if user_id.trim().is_empty() {
                    return Some(ServerMessage::bad_request("user_id must not be empty"));
                }
                self.switch_identity(Some(Identity::new(user_id))).await;
                None
            }
            ClientMessage::SignOut => {
                self.switch_identity(None).await;
                None
            }
            ClientMessage::AddItem {
                id,
                name,
                unit_price,
                quantity,
            } => self
                .cart
                .add_item(id, name, unit_price, quantity)
                .err()
                .map(|e| ServerMessage::from(&e)),
            ClientMessage::RemoveItem { id } => {
                self.cart.remove_item(&id);
                None
            }
            ClientMessage::DecrementItem { id } => {
                self.cart.decrement_item(&id);
                None
            }
            ClientMessage::ClearCart => {
                self.cart.clear_cart();
                None
            }
            ClientMessage::PlaceOrder => Some(match self.cart.place_order().await {
                Ok(order_id) => ServerMessage::OrderPlaced { order_id },
                Err(e) => ServerMessage::from(&e),
            }),
        }
    }

    /// Publishes the identity change and waits until the cart has switched to it
    /// and finished loading, so the client's next message runs against the
    /// stored cart of the new identity.
    async fn switch_identity(&self, identity: Option<Identity>) {
        let mut changes = self.cart.subscribe();
        match &identity {
            Some(identity) => self.identity.sign_in(identity.clone()),
            None => self.identity.sign_out(),
        }
        while self.cart.identity() != identity || self.cart.is_loading() {
            if let Err(RecvError::Closed) = changes.recv().await {
                break;
            }
        }
    }

    /// Lets queued cart writes finish, then stops listening for identity changes.
    pub async fn close(&self) {
        self.cart.flush().await;
        self.cart.dispose();
        info!("Cart session closed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use crate::web::protocol::ErrorKind;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn app_state(store: &InMemoryDocumentStore) -> AppState {
        AppState {
            store: Arc::new(store.clone()),
            config: Arc::new(Config::from_lookup(|_| None).unwrap()),
        }
    }

    fn add(id: &str, price: &str, quantity: u32) -> ClientMessage {
        ClientMessage::AddItem {
            id: id.into(),
            name: id.to_uppercase(),
            unit_price: Decimal::from_str(price).unwrap(),
            quantity,
        }
    }

    fn error_kind(reply: Option<ServerMessage>) -> Option<ErrorKind> {
        match reply {
            Some(ServerMessage::Error { kind, .. }) => Some(kind),
            _ => None,
        }
    }

    #[tokio::test]
    async fn signed_in_client_can_fill_cart_and_check_out() {
        let store = InMemoryDocumentStore::new();
        let session = CartSession::new(&app_state(&store));

        assert_eq!(session.apply(ClientMessage::SignIn { user_id: "u1".into() }).await, None);
        assert_eq!(session.apply(add("p1", "19.99", 1)).await, None);
        assert_eq!(session.apply(add("p1", "19.99", 2)).await, None);
        assert_eq!(session.cart().item_count(), 3);

        let reply = session.apply(ClientMessage::PlaceOrder).await;
        assert!(matches!(reply, Some(ServerMessage::OrderPlaced { .. })));
        assert_eq!(store.records("orders").unwrap().len(), 1);
        assert_eq!(session.cart().item_count(), 3);

        session.close().await;
        assert!(store.get("carts", "u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn requests_without_sign_in_are_refused() {
        let store = InMemoryDocumentStore::new();
        let session = CartSession::new(&app_state(&store));

        assert_eq!(
            error_kind(session.apply(add("p1", "1.00", 1)).await),
            Some(ErrorKind::InvalidOperation)
        );
        assert_eq!(
            error_kind(session.apply(ClientMessage::PlaceOrder).await),
            Some(ErrorKind::InvalidOperation)
        );
        assert_eq!(
            error_kind(session.apply(ClientMessage::SignIn { user_id: " ".into() }).await),
            Some(ErrorKind::BadRequest)
        );
        assert!(store.records("orders").unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_items_are_reported() {
        let store = InMemoryDocumentStore::new();
        let session = CartSession::new(&app_state(&store));
        session.apply(ClientMessage::SignIn { user_id: "u1".into() }).await;

        assert_eq!(
            error_kind(session.apply(add("p1", "1.00", 0)).await),
            Some(ErrorKind::InvalidItem)
        );
        assert_eq!(
            error_kind(session.apply(add("p1", "79228162514264337593543950335", 2)).await),
            Some(ErrorKind::InvalidItem)
        );
        assert!(matches!(
            ServerMessage::cart_updated(&session.cart()),
            ServerMessage::CartUpdated { item_count: 0, .. }
        ));
    }

    #[tokio::test]
    async fn cart_follows_the_user_across_sign_out() {
        let store = InMemoryDocumentStore::new();
        let session = CartSession::new(&app_state(&store));
        session.apply(ClientMessage::SignIn { user_id: "u1".into() }).await;
        session.apply(add("p1", "2.50", 2)).await;
        session.apply(add("p2", "1.00", 1)).await;

        session.apply(ClientMessage::SignOut).await;
        assert!(session.cart().items().is_empty());

        session.apply(ClientMessage::SignIn { user_id: "u1".into() }).await;
        session.cart().flush().await;
        assert_eq!(session.cart().item_count(), 3);
        assert_eq!(session.cart().total_price(), Decimal::from_str("6.00").unwrap());

        // A second session for the same user sees the same stored cart.
        let other = CartSession::new(&app_state(&store));
        other.apply(ClientMessage::SignIn { user_id: "u1".into() }).await;
        other.cart().flush().await;
        assert_eq!(other.cart().items(), session.cart().items());
    }
}
