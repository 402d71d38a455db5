//! PostgreSQL storage backend for gatekeeper-auth
//!
//! Provides persistent storage for:
//!
//! - Per-username retry counters
//! - Step-up tokens and their one-time codes
//! - Local accounts and shadows of external identities
//!
//! Tables live in the `gatekeeper` schema and are created by
//! [`PostgresAuthStorage::ensure_schema`] during bootstrap.
//!
//! # Example
//!
//! ```ignore
//! use gatekeeper_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/gatekeeper").await?;
//! storage.ensure_schema().await?;
//!
//! let tracker = RetryLockoutTracker::new(
//!     Arc::new(storage.retry_counters()),
//!     Arc::new(storage.accounts()),
//!     registry,
//!     &config.lockout,
//! );
//! ```

pub mod account;
pub mod retry_counter;
pub mod schema;
pub mod step_up_token;

use std::sync::Arc;

use gatekeeper_auth::AuthError;
use gatekeeper_auth::identity::Username;
use serde::de::DeserializeOwned;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use account::PostgresLocalAccountStore;
pub use retry_counter::PostgresRetryCounterStore;
pub use step_up_token::PostgresStepUpTokenStore;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Row already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data cannot be mapped back to a domain value.
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidRow` error.
    #[must_use]
    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::InvalidRow(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(error: StorageError) -> Self {
        AuthError::storage(error.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Decodes an enum stored by its serde name (`"directory_a"`, `"email"`, ...).
pub(crate) fn decode_enum<T: DeserializeOwned>(column: &str, value: String) -> StorageResult<T> {
    serde_json::from_value(serde_json::Value::String(value))
        .map_err(|e| StorageError::invalid_row(format!("{column}: {e}")))
}

pub(crate) fn decode_username(value: &str) -> StorageResult<Username> {
    Username::parse(value).ok_or_else(|| StorageError::invalid_row("blank username"))
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for authentication state.
///
/// Holds the connection pool and hands out the store implementations.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Creates the `gatekeeper` schema and its tables if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        schema::create_tables_if_not_exists(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Store Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn retry_counters(&self) -> PostgresRetryCounterStore {
        PostgresRetryCounterStore::new(Arc::clone(&self.pool))
    }

    #[must_use]
    pub fn step_up_tokens(&self) -> PostgresStepUpTokenStore {
        PostgresStepUpTokenStore::new(Arc::clone(&self.pool))
    }

    #[must_use]
    pub fn accounts(&self) -> PostgresLocalAccountStore {
        PostgresLocalAccountStore::new(Arc::clone(&self.pool))
    }
}

// =============================================================================
// Tests
// =============================================================================
