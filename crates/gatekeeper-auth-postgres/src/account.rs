//! Local accounts and shadows in `gatekeeper.local_accounts`.
//!
//! `source = 'local'` marks a native account. Any other source marks a shadow
//! of an identity owned elsewhere; shadows never carry a password hash.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_auth::AuthResult;
use gatekeeper_auth::identity::{ContactChannels, IdentityRecord, Username};
use gatekeeper_auth::storage::LocalAccountStore;
use gatekeeper_auth::types::LocalAccount;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tracing::debug;

use crate::{PgPool, StorageError, StorageResult, decode_enum, decode_username};

type AccountTuple = (
    String,
    String,
    Option<String>,
    bool,
    bool,
    bool,
    bool,
    bool,
    Value,
    Value,
    Option<OffsetDateTime>,
);

const SELECT_COLUMNS: &str = "SELECT username, source, password_hash, authoritative, enabled, \
     locked, credentials_expired, account_expired, roles, contacts, last_login_at \
     FROM gatekeeper.local_accounts";

fn from_tuple(row: AccountTuple) -> StorageResult<LocalAccount> {
    let (
        username,
        source,
        password_hash,
        authoritative,
        enabled,
        locked,
        credentials_expired,
        account_expired,
        roles,
        contacts,
        last_login_at,
    ) = row;

    let roles: BTreeSet<String> = serde_json::from_value(roles)?;
    let contacts: ContactChannels = serde_json::from_value(contacts)?;

    let mut record =
        IdentityRecord::new(decode_username(&username)?, decode_enum("source", source)?);
    record.enabled = enabled;
    record.locked = locked;
    record.credentials_expired = credentials_expired;
    record.account_expired = account_expired;
    record.roles = roles;
    record.contacts = contacts;
    record.last_login_at = last_login_at;

    Ok(LocalAccount {
        record,
        password_hash,
        authoritative,
    })
}

/// PostgreSQL [`LocalAccountStore`].
#[derive(Debug, Clone)]
pub struct PostgresLocalAccountStore {
    pool: Arc<PgPool>,
}

impl PostgresLocalAccountStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn fetch_all(&self, sql: &str, bind: BindValue<'_>) -> StorageResult<Vec<LocalAccount>> {
        let rows: Vec<AccountTuple> = match bind {
            BindValue::Text(value) => query_as(sql).bind(value).fetch_all(&*self.pool).await?,
            BindValue::Instant(value) => query_as(sql).bind(value).fetch_all(&*self.pool).await?,
        };
        rows.into_iter().map(from_tuple).collect()
    }

    async fn set_flag(
        &self,
        column: Flag,
        username: &Username,
        value: bool,
    ) -> StorageResult<bool> {
        let sql = format!(
            "UPDATE gatekeeper.local_accounts SET {} = $2, updated_at = NOW() WHERE username = $1",
            column.as_str()
        );
        let result = query(&sql)
            .bind(username.as_str())
            .bind(value)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, account: &LocalAccount) -> StorageResult<()> {
        let record = &account.record;
        let result = query(
            r#"
            INSERT INTO gatekeeper.local_accounts
                (username, source, password_hash, authoritative, enabled, locked,
                 credentials_expired, account_expired, roles, contacts, last_login_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (username) DO NOTHING
            "#,
        )
        .bind(record.username.as_str())
        .bind(record.source.as_str())
        .bind(account.password_hash.as_deref())
        .bind(account.authoritative)
        .bind(record.enabled)
        .bind(record.locked)
        .bind(record.credentials_expired)
        .bind(record.account_expired)
        .bind(serde_json::to_value(&record.roles)?)
        .bind(serde_json::to_value(&record.contacts)?)
        .bind(record.last_login_at)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::conflict(format!(
                "Account already exists: {}",
                record.username
            )));
        }
        Ok(())
    }

    async fn refresh_shadow(&self, record: &IdentityRecord) -> StorageResult<bool> {
        let shadow = LocalAccount::shadow(record);
        let result = query(
            r#"
            INSERT INTO gatekeeper.local_accounts
                (username, source, password_hash, authoritative, enabled, locked,
                 credentials_expired, account_expired, roles, contacts, updated_at)
            VALUES ($1, $2, NULL, FALSE, $3, $4, $5, $6, $7, '{}', NOW())
            ON CONFLICT (username) DO UPDATE
            SET source = EXCLUDED.source,
                enabled = EXCLUDED.enabled,
                locked = EXCLUDED.locked,
                credentials_expired = EXCLUDED.credentials_expired,
                account_expired = EXCLUDED.account_expired,
                roles = EXCLUDED.roles,
                updated_at = NOW()
            WHERE gatekeeper.local_accounts.source <> 'local'
            "#,
        )
        .bind(shadow.record.username.as_str())
        .bind(shadow.record.source.as_str())
        .bind(shadow.record.enabled)
        .bind(shadow.record.locked)
        .bind(shadow.record.credentials_expired)
        .bind(shadow.record.account_expired)
        .bind(serde_json::to_value(&shadow.record.roles)?)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn execute_update(
        &self,
        sql: &str,
        username: &Username,
        value: UpdateValue<'_>,
    ) -> StorageResult<bool> {
        let q = query(sql).bind(username.as_str());
        let q = match value {
            UpdateValue::Bool(v) => q.bind(v),
            UpdateValue::Text(v) => q.bind(v),
            UpdateValue::Instant(v) => q.bind(v),
        };
        let result = q.execute(&*self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

enum BindValue<'a> {
    Text(&'a str),
    Instant(OffsetDateTime),
}

enum UpdateValue<'a> {
    Bool(bool),
    Text(&'a str),
    Instant(OffsetDateTime),
}

#[derive(Clone, Copy)]
enum Flag {
    Locked,
    Enabled,
}

impl Flag {
    fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Enabled => "enabled",
        }
    }
}

#[async_trait]
impl LocalAccountStore for PostgresLocalAccountStore {
    async fn find(&self, username: &Username) -> AuthResult<Option<LocalAccount>> {
        let sql = format!("{SELECT_COLUMNS} WHERE username = $1");
        let row: Option<AccountTuple> = query_as(&sql)
            .bind(username.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(from_tuple).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<LocalAccount>> {
        let sql = format!(
            "{SELECT_COLUMNS} \
             WHERE lower(contacts->>'email') = lower($1) \
                OR lower(contacts->>'secondary_email') = lower($1) \
             ORDER BY username"
        );
        Ok(self.fetch_all(&sql, BindValue::Text(email)).await?)
    }

    async fn create(&self, account: &LocalAccount) -> AuthResult<()> {
        self.insert(account).await?;
        debug!(username = %account.record.username, "local account created");
        Ok(())
    }

    async fn upsert_shadow(&self, record: &IdentityRecord) -> AuthResult<bool> {
        Ok(self.refresh_shadow(record).await?)
    }

    async fn set_authoritative(
        &self,
        username: &Username,
        authoritative: bool,
    ) -> AuthResult<bool> {
        Ok(self
            .execute_update(
                "UPDATE gatekeeper.local_accounts SET authoritative = $2, updated_at = NOW() \
                 WHERE username = $1 AND source <> 'local'",
                username,
                UpdateValue::Bool(authoritative),
            )
            .await?)
    }

    async fn set_locked(&self, username: &Username, locked: bool) -> AuthResult<bool> {
        Ok(self.set_flag(Flag::Locked, username, locked).await?)
    }

    async fn set_enabled(&self, username: &Username, enabled: bool) -> AuthResult<bool> {
        Ok(self.set_flag(Flag::Enabled, username, enabled).await?)
    }

    async fn set_password_hash(&self, username: &Username, hash: &str) -> AuthResult<bool> {
        Ok(self
            .execute_update(
                "UPDATE gatekeeper.local_accounts \
                 SET password_hash = $2, credentials_expired = FALSE, updated_at = NOW() \
                 WHERE username = $1 AND source = 'local'",
                username,
                UpdateValue::Text(hash),
            )
            .await?)
    }

    async fn set_verified_email(&self, username: &Username, email: &str) -> AuthResult<bool> {
        Ok(self
            .execute_update(
                "UPDATE gatekeeper.local_accounts \
                 SET contacts = jsonb_set(contacts, '{email}', to_jsonb($2::text)), \
                     updated_at = NOW() \
                 WHERE username = $1",
                username,
                UpdateValue::Text(email),
            )
            .await?)
    }

    async fn set_last_login(&self, username: &Username, at: OffsetDateTime) -> AuthResult<bool> {
        Ok(self
            .execute_update(
                "UPDATE gatekeeper.local_accounts SET last_login_at = $2, updated_at = NOW() \
                 WHERE username = $1",
                username,
                UpdateValue::Instant(at),
            )
            .await?)
    }

    async fn find_inactive_since(&self, cutoff: OffsetDateTime) -> AuthResult<Vec<LocalAccount>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE enabled AND last_login_at < $1 ORDER BY username"
        );
        Ok(self.fetch_all(&sql, BindValue::Instant(cutoff)).await?)
    }
}
