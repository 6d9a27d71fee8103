//! services/storefront/src/config.rs
//!
//! Defines the gateway's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use storefront_core::SyncOptions;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When unset, carts and orders live in process memory only.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub allowed_origin: String,
    pub carts_collection: String,
    pub orders_collection: String,
    pub change_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server and Database Settings ---
        let bind_address = parse_var(&var, "BIND_ADDRESS", "0.0.0.0:3000")?;
        let database_url = var("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let db_max_connections = parse_var(&var, "DB_MAX_CONNECTIONS", "5")?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin =
            var("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Cart Sync Settings ---
        let carts_collection = non_empty_var(&var, "CARTS_COLLECTION", "carts")?;
        let orders_collection = non_empty_var(&var, "ORDERS_COLLECTION", "orders")?;
        let change_capacity: usize = parse_var(&var, "CHANGE_CAPACITY", "64")?;
        if change_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CHANGE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            allowed_origin,
            carts_collection,
            orders_collection,
            change_capacity,
        })
    }

    /// The cart service settings derived from this configuration.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            carts_collection: self.carts_collection.clone(),
            orders_collection: self.orders_collection.clone(),
            change_capacity: self.change_capacity,
        }
    }
}

fn parse_var<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var(name).unwrap_or_else(|| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn non_empty_var(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match var(name) {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => Err(ConfigError::MissingVar(name.to_string())),
        Some(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.database_url, None);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.carts_collection, "carts");
        assert_eq!(config.orders_collection, "orders");
        assert_eq!(config.change_capacity, 64);
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("RUST_LOG", "debug"),
            ("CARTS_COLLECTION", "user_carts"),
            ("CHANGE_CAPACITY", "8"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.log_level, Level::DEBUG);

        let options = config.sync_options();
        assert_eq!(options.carts_collection, "user_carts");
        assert_eq!(options.orders_collection, "orders");
        assert_eq!(options.change_capacity, 8);
    }

    #[test]
    fn bad_values_are_reported_by_name() {
        let err = Config::from_lookup(lookup(&[("BIND_ADDRESS", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "BIND_ADDRESS"));

        let err = Config::from_lookup(lookup(&[("CHANGE_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "CHANGE_CAPACITY"));

        let err = Config::from_lookup(lookup(&[("ORDERS_COLLECTION", " ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref name) if name == "ORDERS_COLLECTION"));
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "")])).unwrap();
        assert!(config.database_url.is_none());
    }
}
