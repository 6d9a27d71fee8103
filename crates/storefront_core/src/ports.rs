//! crates/storefront_core/src/ports.rs
//!
//! Defines the contracts (traits) for the collaborators the cart depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of a concrete identity provider or document database.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;

use crate::domain::Identity;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Records
//=========================================================================================

/// A JSON-like document as held by the document store.
pub type Record = Map<String, Value>;

const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// A placeholder value that the store replaces with its own clock when the
/// record is written.
pub fn server_timestamp() -> Value {
    let mut sentinel = Map::new();
    sentinel.insert(SERVER_TIMESTAMP_KEY.to_string(), Value::Bool(true));
    Value::Object(sentinel)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    matches!(value, Value::Object(m) if m.len() == 1 && m.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true)))
}

/// Replaces every top-level server timestamp placeholder in `record` with `now`
/// as an RFC 3339 string. Store adapters call this right before writing.
pub fn resolve_server_timestamps(record: &mut Record, now: DateTime<Utc>) {
    for value in record.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A lazy, unbounded sequence of identity events. `None` means signed out.
pub type IdentityStream = Pin<Box<dyn Stream<Item = Option<Identity>> + Send>>;

pub trait IdentitySource: Send + Sync {
    /// Subscribes to identity changes. The stream yields the current identity
    /// (or `None`) first, then one item per sign-in or sign-out.
    fn subscribe(&self) -> IdentityStream;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a record. `Ok(None)` when nothing is stored under `key`.
    async fn get(&self, collection: &str, key: &str) -> PortResult<Option<Record>>;

    /// Overwrites the whole record under `key`.
    async fn set(&self, collection: &str, key: &str, record: Record) -> PortResult<()>;

    /// Appends a record under a store-generated key and returns that key.
    async fn add(&self, collection: &str, record: Record) -> PortResult<String>;
}
