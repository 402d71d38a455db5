//! Step-up tokens in `gatekeeper.step_up_tokens`.
//!
//! One row per `(kind, username)`. The token and its code share the row, so
//! deleting the row invalidates both at once.

use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_auth::AuthResult;
use gatekeeper_auth::identity::Username;
use gatekeeper_auth::storage::StepUpTokenStore;
use gatekeeper_auth::types::{StepUpKind, StepUpToken};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;

use crate::{PgPool, StorageError, StorageResult, decode_enum, decode_username};

type TokenTuple = (
    String,
    String,
    String,
    String,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
);

const SELECT_COLUMNS: &str =
    "SELECT token, kind, username, code, source, channel, expires_at, created_at \
     FROM gatekeeper.step_up_tokens";

fn from_tuple(row: TokenTuple) -> StorageResult<StepUpToken> {
    let (token, kind, username, code, source, channel, expires_at, created_at) = row;
    Ok(StepUpToken {
        token,
        code,
        kind: decode_enum("kind", kind)?,
        username: decode_username(&username)?,
        source: decode_enum("source", source)?,
        channel: decode_enum("channel", channel)?,
        expires_at,
        created_at,
    })
}

/// PostgreSQL [`StepUpTokenStore`].
#[derive(Debug, Clone)]
pub struct PostgresStepUpTokenStore {
    pool: Arc<PgPool>,
}

impl PostgresStepUpTokenStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        filter: &str,
        kind: StepUpKind,
        value: &str,
    ) -> StorageResult<Option<StepUpToken>> {
        let sql = format!("{SELECT_COLUMNS} WHERE kind = $1 AND {filter} = $2");
        let row: Option<TokenTuple> = query_as(&sql)
            .bind(kind.as_str())
            .bind(value)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(from_tuple).transpose()
    }
}

#[async_trait]
impl StepUpTokenStore for PostgresStepUpTokenStore {
    async fn upsert(&self, token: &StepUpToken) -> AuthResult<()> {
        query(
            r#"
            INSERT INTO gatekeeper.step_up_tokens
                (token, kind, username, code, source, channel, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (kind, username) DO UPDATE
            SET token = EXCLUDED.token,
                code = EXCLUDED.code,
                source = EXCLUDED.source,
                channel = EXCLUDED.channel,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&token.token)
        .bind(token.kind.as_str())
        .bind(token.username.as_str())
        .bind(&token.code)
        .bind(token.source.as_str())
        .bind(token.channel.as_str())
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&*self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    async fn find_by_token(
        &self,
        kind: StepUpKind,
        token: &str,
    ) -> AuthResult<Option<StepUpToken>> {
        Ok(self.fetch("token", kind, token).await?)
    }

    async fn find_by_owner(
        &self,
        kind: StepUpKind,
        username: &Username,
    ) -> AuthResult<Option<StepUpToken>> {
        Ok(self.fetch("username", kind, username.as_str()).await?)
    }

    async fn code_in_use(&self, kind: StepUpKind, code: &str) -> AuthResult<bool> {
        let in_use: bool = query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM gatekeeper.step_up_tokens
                WHERE kind = $1 AND code = $2 AND expires_at > NOW()
            )
            "#,
        )
        .bind(kind.as_str())
        .bind(code)
        .fetch_one(&*self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(in_use)
    }

    async fn delete(&self, kind: StepUpKind, token: &str) -> AuthResult<bool> {
        let result = query("DELETE FROM gatekeeper.step_up_tokens WHERE kind = $1 AND token = $2")
            .bind(kind.as_str())
            .bind(token)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query("DELETE FROM gatekeeper.step_up_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }
}
