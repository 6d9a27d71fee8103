//! services/storefront/src/adapters/memory.rs
//!
//! An in-process implementation of the `DocumentStore` port. Used when no
//! database is configured, and handy in tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use storefront_core::ports::{resolve_server_timestamps, DocumentStore, PortError, PortResult, Record};
use uuid::Uuid;

type DocumentKey = (String, String);

/// A document store kept in a `RwLock<HashMap>`. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<DocumentKey, Record>>>,
}

impl InMemoryDocumentStore {
    /// Creates a new, empty `InMemoryDocumentStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in `collection`, in no particular order.
    pub fn records(&self, collection: &str) -> PortResult<Vec<Record>> {
        let documents = self
            .documents
            .read()
            .map_err(|e| PortError::Unexpected(format!("Failed to acquire read lock: {}", e)))?;
        Ok(documents
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn write(&self, collection: &str, key: String, mut record: Record) -> PortResult<()> {
        resolve_server_timestamps(&mut record, Utc::now());
        let mut documents = self
            .documents
            .write()
            .map_err(|e| PortError::Unexpected(format!("Failed to acquire write lock: {}", e)))?;
        documents.insert((collection.to_string(), key), record);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> PortResult<Option<Record>> {
        let documents = self
            .documents
            .read()
            .map_err(|e| PortError::Unexpected(format!("Failed to acquire read lock: {}", e)))?;
        Ok(documents
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, record: Record) -> PortResult<()> {
        self.write(collection, key.to_string(), record)
    }

    async fn add(&self, collection: &str, record: Record) -> PortResult<String> {
        let key = Uuid::new_v4().to_string();
        self.write(collection, key.clone(), record)?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storefront_core::ports::server_timestamp;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn set_overwrites_the_whole_record() {
        let store = InMemoryDocumentStore::new();
        store
            .set("carts", "u1", record(json!({"cartItems": [1], "extra": true})))
            .await
            .unwrap();
        store
            .set("carts", "u1", record(json!({"cartItems": []})))
            .await
            .unwrap();

        let stored = store.get("carts", "u1").await.unwrap().unwrap();
        assert_eq!(stored, record(json!({"cartItems": []})));
        assert!(store.get("carts", "u2").await.unwrap().is_none());
        assert!(store.get("orders", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_generates_distinct_keys_and_stamps_time() {
        let store = InMemoryDocumentStore::new();
        let mut order = record(json!({"status": "Pending"}));
        order.insert("createdAt".into(), server_timestamp());

        let first = store.add("orders", order.clone()).await.unwrap();
        let second = store.add("orders", order).await.unwrap();
        assert_ne!(first, second);

        let stored = store.get("orders", &first).await.unwrap().unwrap();
        assert!(stored["createdAt"].is_string());
        assert_eq!(store.records("orders").unwrap().len(), 2);
    }
}
