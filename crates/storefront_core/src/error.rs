//! crates/storefront_core/src/error.rs
//!
//! Errors surfaced by the cart service to its callers.

use crate::domain::ItemError;
use crate::ports::PortError;
use crate::record::RecordError;

/// Why an operation is not allowed in the current cart state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOperation {
    #[error("no signed-in user")]
    IdentityAbsent,
    #[error("the cart is empty")]
    CartEmpty,
    #[error("the cart is still loading")]
    CartLoading,
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),

    #[error("Invalid item: {0}")]
    InvalidItem(#[from] ItemError),

    /// The document store rejected or failed a write the caller waited on.
    #[error("Store failure: {0}")]
    Store(#[from] PortError),

    #[error("Record encoding failed: {0}")]
    Record(#[from] RecordError),
}

impl CartError {
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, CartError::InvalidOperation(_))
    }
}

pub type CartResult<T> = Result<T, CartError>;
