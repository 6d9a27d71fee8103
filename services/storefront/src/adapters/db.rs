//! services/storefront/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. Each record is one JSONB
//! row in a PostgreSQL table, addressed by collection and key.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use storefront_core::ports::{resolve_server_timestamps, DocumentStore, PortError, PortResult, Record};
use serde_json::Value;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn map_db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> PortResult<Option<Record>> {
        let body: Option<Json<Value>> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        match body {
            None => Ok(None),
            Some(Json(Value::Object(record))) => Ok(Some(record)),
            Some(Json(other)) => Err(PortError::Unexpected(format!(
                "Document {}/{} is not an object: {}",
                collection, key, other
            ))),
        }
    }

    async fn set(&self, collection: &str, key: &str, mut record: Record) -> PortResult<()> {
        resolve_server_timestamps(&mut record, Utc::now());
        sqlx::query(
            "INSERT INTO documents (collection, key, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, key) DO UPDATE SET body = EXCLUDED.body, updated_at = now()",
        )
        .bind(collection)
        .bind(key)
        .bind(Json(record))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn add(&self, collection: &str, mut record: Record) -> PortResult<String> {
        resolve_server_timestamps(&mut record, Utc::now());
        let key = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO documents (collection, key, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&key)
            .bind(Json(record))
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(key)
    }
}
