//! crates/storefront_core/src/record.rs
//!
//! Conversion between domain values and the records kept in the document store.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::{ItemError, LineItem, Order};
use crate::ports::{server_timestamp, Record};

/// Field of the per-user cart record holding the line items.
pub const CART_ITEMS_FIELD: &str = "cartItems";

const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Malformed record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Expected a JSON object for {0}")]
    NotAnObject(&'static str),
    #[error("Invalid line {index}: {source}")]
    InvalidLine { index: usize, source: ItemError },
}

/// Encodes the full cart as a record. The result always replaces the stored
/// document as a whole.
pub fn encode_cart_record(items: &[LineItem]) -> Result<Record, RecordError> {
    let mut record = Record::new();
    record.insert(CART_ITEMS_FIELD.to_string(), serde_json::to_value(items)?);
    Ok(record)
}

/// Decodes a stored cart record. A missing record, a missing field and `null`
/// all mean an empty cart. Every line must pass `LineItem::validate`.
pub fn decode_cart_record(record: Option<&Record>) -> Result<Vec<LineItem>, RecordError> {
    let items = match record.and_then(|r| r.get(CART_ITEMS_FIELD)) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(items) => Vec::<LineItem>::deserialize(items)?,
    };
    for (index, item) in items.iter().enumerate() {
        item.validate()
            .map_err(|source| RecordError::InvalidLine { index, source })?;
    }
    Ok(items)
}

/// Encodes an order for appending to the order collection. `createdAt` is
/// left for the store to fill in.
pub fn encode_order_record(order: &Order) -> Result<Record, RecordError> {
    let Value::Object(mut record) = serde_json::to_value(order)? else {
        return Err(RecordError::NotAnObject("order"));
    };
    record.insert(CREATED_AT_FIELD.to_string(), server_timestamp());
    Ok(record)
}
