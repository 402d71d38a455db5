//! DDL for the `gatekeeper` schema.

use sqlx_core::query::query;
use tracing::{info, instrument};

use crate::{PgPool, StorageResult};

const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS gatekeeper",
    r#"
    CREATE TABLE IF NOT EXISTS gatekeeper.retry_counters (
        username TEXT PRIMARY KEY,
        attempts INTEGER NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gatekeeper.step_up_tokens (
        token TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        username TEXT NOT NULL,
        code TEXT NOT NULL,
        source TEXT NOT NULL,
        channel TEXT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        UNIQUE (kind, username)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_step_up_tokens_code
    ON gatekeeper.step_up_tokens(kind, code)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_step_up_tokens_expires_at
    ON gatekeeper.step_up_tokens(expires_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gatekeeper.local_accounts (
        username TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        password_hash TEXT,
        authoritative BOOLEAN NOT NULL DEFAULT FALSE,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        locked BOOLEAN NOT NULL DEFAULT FALSE,
        credentials_expired BOOLEAN NOT NULL DEFAULT FALSE,
        account_expired BOOLEAN NOT NULL DEFAULT FALSE,
        roles JSONB NOT NULL DEFAULT '[]',
        contacts JSONB NOT NULL DEFAULT '{}',
        last_login_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_local_accounts_email
    ON gatekeeper.local_accounts(lower(contacts->>'email'))
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_local_accounts_secondary_email
    ON gatekeeper.local_accounts(lower(contacts->>'secondary_email'))
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_local_accounts_last_login
    ON gatekeeper.local_accounts(last_login_at)
    WHERE enabled
    "#,
];

/// Creates the schema, tables and indexes. Safe to call on every start.
#[instrument(skip(pool))]
pub async fn create_tables_if_not_exists(pool: &PgPool) -> StorageResult<()> {
    for statement in STATEMENTS {
        query(statement).execute(pool).await?;
    }
    info!("gatekeeper schema ready");
    Ok(())
}
