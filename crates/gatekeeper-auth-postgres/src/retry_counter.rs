//! Retry counters in `gatekeeper.retry_counters`.
//!
//! The increment is an `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`, which
//! takes the row lock; the threshold reset runs in the same transaction so
//! concurrent failures for one username are serialized.

use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_auth::AuthResult;
use gatekeeper_auth::identity::Username;
use gatekeeper_auth::storage::{FailureRecord, RetryCounterStore};
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;

use crate::{PgPool, StorageResult};

/// PostgreSQL [`RetryCounterStore`].
#[derive(Debug, Clone)]
pub struct PostgresRetryCounterStore {
    pool: Arc<PgPool>,
}

impl PostgresRetryCounterStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn increment(&self, username: &Username, threshold: u32) -> StorageResult<FailureRecord> {
        let mut tx = self.pool.begin().await?;

        let attempts: i32 = query_scalar(
            r#"
            INSERT INTO gatekeeper.retry_counters (username, attempts, updated_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (username) DO UPDATE
            SET attempts = gatekeeper.retry_counters.attempts + 1,
                updated_at = NOW()
            RETURNING attempts
            "#,
        )
        .bind(username.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let attempts = u32::try_from(attempts).unwrap_or(0);
        let threshold_reached = attempts >= threshold;
        if threshold_reached {
            query(
                r#"
                UPDATE gatekeeper.retry_counters
                SET attempts = 0, updated_at = NOW()
                WHERE username = $1
                "#,
            )
            .bind(username.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(FailureRecord {
            attempts,
            threshold_reached,
        })
    }
}

#[async_trait]
impl RetryCounterStore for PostgresRetryCounterStore {
    async fn record_failure(
        &self,
        username: &Username,
        threshold: u32,
    ) -> AuthResult<FailureRecord> {
        Ok(self.increment(username, threshold).await?)
    }

    async fn reset(&self, username: &Username) -> AuthResult<()> {
        query("DELETE FROM gatekeeper.retry_counters WHERE username = $1")
            .bind(username.as_str())
            .execute(&*self.pool)
            .await
            .map_err(crate::StorageError::from)?;
        Ok(())
    }

    async fn current(&self, username: &Username) -> AuthResult<u32> {
        let attempts: Option<i32> =
            query_scalar("SELECT attempts FROM gatekeeper.retry_counters WHERE username = $1")
                .bind(username.as_str())
                .fetch_optional(&*self.pool)
                .await
                .map_err(crate::StorageError::from)?;
        Ok(attempts.map_or(0, |a| u32::try_from(a).unwrap_or(0)))
    }
}
