//! services/storefront/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between a storefront client and the
//! gateway. Every frame is a JSON text message tagged by `type`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storefront_core::{CartError, CartSyncService, LineItem};

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The user signed in with the identity provider.
    SignIn { user_id: String },

    /// The user signed out. The cart is cleared locally.
    SignOut,

    /// Adds a product; repeated adds of the same id raise its quantity.
    AddItem {
        id: String,
        name: String,
        unit_price: Decimal,
        #[serde(default = "default_quantity")]
        quantity: u32,
    },

    RemoveItem { id: String },

    /// Lowers the quantity of a product by one.
    DecrementItem { id: String },

    ClearCart,

    /// Submits the cart as an order. The cart is kept until the client clears it.
    PlaceOrder,
}

fn default_quantity() -> u32 {
    1
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The cart is in a state that does not allow the request (e.g. empty checkout).
    InvalidOperation,
    InvalidItem,
    /// The order could not be written; the client may retry.
    StoreFailure,
    /// The frame could not be understood.
    BadRequest,
}

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full cart after a change. Sent after every change notification.
    CartUpdated {
        user_id: Option<String>,
        items: Vec<LineItem>,
        item_count: u64,
        total_price: Decimal,
        loading: bool,
    },

    /// Confirms a successful checkout.
    OrderPlaced { order_id: String },

    /// Reports a failed request.
    Error { kind: ErrorKind, message: String },
}

impl ServerMessage {
    /// Snapshot of the service's current cart.
    pub fn cart_updated(cart: &CartSyncService) -> Self {
        let snapshot = cart.snapshot();
        ServerMessage::CartUpdated {
            user_id: cart.identity().map(|i| i.user_id),
            item_count: snapshot.item_count(),
            total_price: snapshot.total_price(),
            items: snapshot.into_items(),
            loading: cart.is_loading(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind: ErrorKind::BadRequest,
            message: message.into(),
        }
    }
}

impl From<&CartError> for ServerMessage {
    fn from(e: &CartError) -> Self {
        let kind = match e {
            CartError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            CartError::InvalidItem(_) => ErrorKind::InvalidItem,
            CartError::Store(_) | CartError::Record(_) => ErrorKind::StoreFailure,
        };
        ServerMessage::Error {
            kind,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;
    use storefront_core::{InvalidOperation, PortError};

    #[test]
    fn add_item_defaults_to_one_unit() {
        let message: ClientMessage = serde_json::from_value(json!({
            "type": "add_item", "id": "p1", "name": "Shirt", "unit_price": "19.99"
        }))
        .unwrap();

        assert_eq!(
            message,
            ClientMessage::AddItem {
                id: "p1".into(),
                name: "Shirt".into(),
                unit_price: Decimal::from_str("19.99").unwrap(),
                quantity: 1,
            }
        );
    }

    #[test]
    fn unit_price_may_be_a_number() {
        let message: ClientMessage = serde_json::from_value(json!({
            "type": "add_item", "id": "p1", "name": "Shirt", "unit_price": 5, "quantity": 3
        }))
        .unwrap();
        assert!(matches!(message, ClientMessage::AddItem { quantity: 3, .. }));
    }

    #[test]
    fn unit_variants_parse_from_type_alone() {
        let message: ClientMessage = serde_json::from_str(r#"{"type":"place_order"}"#).unwrap();
        assert_eq!(message, ClientMessage::PlaceOrder);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn cart_errors_map_to_kinds() {
        let invalid = CartError::from(InvalidOperation::CartEmpty);
        let store = CartError::from(PortError::Unavailable("down".into()));

        assert_eq!(
            serde_json::to_value(ServerMessage::from(&invalid)).unwrap()["kind"],
            json!("invalid_operation")
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::from(&store)).unwrap()["kind"],
            json!("store_failure")
        );
    }

    #[test]
    fn order_placed_is_tagged() {
        let value = serde_json::to_value(ServerMessage::OrderPlaced {
            order_id: "o1".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "order_placed", "order_id": "o1"}));
    }
}
