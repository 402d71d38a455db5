//! In-memory storage backends.
//!
//! Each store guards its map with a single `tokio::sync::RwLock`. The retry
//! counter holds the write guard across the whole increment-compare-reset, which
//! gives the same per-username atomicity the PostgreSQL backend gets from row
//! locking. State is lost on restart and not shared between processes.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::{IdentityRecord, Username};
use crate::storage::{FailureRecord, LocalAccountStore, RetryCounterStore, StepUpTokenStore};
use crate::types::{LocalAccount, StepUpKind, StepUpToken};

// =============================================================================
// Retry Counters
// =============================================================================

/// In-memory retry counter store.
#[derive(Debug, Default)]
pub struct InMemoryRetryCounterStore {
    counters: RwLock<HashMap<Username, u32>>,
}

impl InMemoryRetryCounterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryCounterStore for InMemoryRetryCounterStore {
    async fn record_failure(
        &self,
        username: &Username,
        threshold: u32,
    ) -> AuthResult<FailureRecord> {
        let mut counters = self.counters.write().await;
        let count = counters.entry(username.clone()).or_insert(0);
        *count = count.saturating_add(1);
        let attempts = *count;
        let threshold_reached = attempts >= threshold;
        if threshold_reached {
            *count = 0;
        }
        Ok(FailureRecord {
            attempts,
            threshold_reached,
        })
    }

    async fn reset(&self, username: &Username) -> AuthResult<()> {
        self.counters.write().await.remove(username);
        Ok(())
    }

    async fn current(&self, username: &Username) -> AuthResult<u32> {
        Ok(self
            .counters
            .read()
            .await
            .get(username)
            .copied()
            .unwrap_or(0))
    }
}

// =============================================================================
// Step-Up Tokens
// =============================================================================

/// In-memory step-up token store, keyed by `(kind, username)`.
#[derive(Debug, Default)]
pub struct InMemoryStepUpTokenStore {
    tokens: RwLock<HashMap<(StepUpKind, Username), StepUpToken>>,
}

impl InMemoryStepUpTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepUpTokenStore for InMemoryStepUpTokenStore {
    async fn upsert(&self, token: &StepUpToken) -> AuthResult<()> {
        self.tokens
            .write()
            .await
            .insert((token.kind, token.username.clone()), token.clone());
        Ok(())
    }

    async fn find_by_token(
        &self,
        kind: StepUpKind,
        token: &str,
    ) -> AuthResult<Option<StepUpToken>> {
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .find(|t| t.kind == kind && t.token == token)
            .cloned())
    }

    async fn find_by_owner(
        &self,
        kind: StepUpKind,
        username: &Username,
    ) -> AuthResult<Option<StepUpToken>> {
        Ok(self
            .tokens
            .read()
            .await
            .get(&(kind, username.clone()))
            .cloned())
    }

    async fn code_in_use(&self, kind: StepUpKind, code: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .tokens
            .read()
            .await
            .values()
            .any(|t| t.kind == kind && t.code == code && !t.is_expired_at(now)))
    }

    async fn delete(&self, kind: StepUpKind, token: &str) -> AuthResult<bool> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !(t.kind == kind && t.token == token));
        Ok(tokens.len() < before)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

// =============================================================================
// Local Accounts
// =============================================================================

/// In-memory local account store.
#[derive(Debug, Default)]
pub struct InMemoryLocalAccountStore {
    accounts: RwLock<HashMap<Username, LocalAccount>>,
}

impl InMemoryLocalAccountStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, username: &Username, apply: F) -> AuthResult<bool>
    where
        F: FnOnce(&mut LocalAccount) + Send,
    {
        match self.accounts.write().await.get_mut(username) {
            Some(account) => {
                apply(account);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn email_matches(account: &LocalAccount, email: &str) -> bool {
    let contacts = &account.record.contacts;
    [contacts.email.as_deref(), contacts.secondary_email.as_deref()]
        .into_iter()
        .flatten()
        .any(|candidate| candidate.eq_ignore_ascii_case(email))
}

#[async_trait]
impl LocalAccountStore for InMemoryLocalAccountStore {
    async fn find(&self, username: &Username) -> AuthResult<Option<LocalAccount>> {
        Ok(self.accounts.read().await.get(username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<LocalAccount>> {
        let mut matches: Vec<LocalAccount> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|account| email_matches(account, email))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.record.username.cmp(&b.record.username));
        Ok(matches)
    }

    async fn create(&self, account: &LocalAccount) -> AuthResult<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.record.username) {
            return Err(AuthError::storage(format!(
                "Account already exists: {}",
                account.record.username
            )));
        }
        accounts.insert(account.record.username.clone(), account.clone());
        Ok(())
    }

    async fn upsert_shadow(&self, record: &IdentityRecord) -> AuthResult<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&record.username) {
            Some(existing) if existing.is_native() => Ok(false),
            Some(existing) => {
                let mut refreshed = LocalAccount::shadow(record);
                refreshed.record.contacts = existing.record.contacts.clone();
                refreshed.record.last_login_at = existing.record.last_login_at;
                refreshed.authoritative = existing.authoritative;
                *existing = refreshed;
                Ok(true)
            }
            None => {
                accounts.insert(record.username.clone(), LocalAccount::shadow(record));
                Ok(true)
            }
        }
    }

    async fn set_authoritative(
        &self,
        username: &Username,
        authoritative: bool,
    ) -> AuthResult<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(username) {
            Some(account) if !account.is_native() => {
                account.authoritative = authoritative;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_locked(&self, username: &Username, locked: bool) -> AuthResult<bool> {
        self.update(username, |account| account.record.locked = locked)
            .await
    }

    async fn set_enabled(&self, username: &Username, enabled: bool) -> AuthResult<bool> {
        self.update(username, |account| account.record.enabled = enabled)
            .await
    }

    async fn set_password_hash(&self, username: &Username, hash: &str) -> AuthResult<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(username) {
            Some(account) if account.is_native() => {
                account.password_hash = Some(hash.to_string());
                account.record.credentials_expired = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_verified_email(&self, username: &Username, email: &str) -> AuthResult<bool> {
        let email = email.to_string();
        self.update(username, move |account| {
            account.record.contacts.email = Some(email)
        })
        .await
    }

    async fn set_last_login(&self, username: &Username, at: OffsetDateTime) -> AuthResult<bool> {
        self.update(username, |account| account.record.last_login_at = Some(at))
            .await
    }

    async fn find_inactive_since(&self, cutoff: OffsetDateTime) -> AuthResult<Vec<LocalAccount>> {
        let mut stale: Vec<LocalAccount> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|account| {
                account.record.enabled
                    && account
                        .record
                        .last_login_at
                        .is_some_and(|last| last < cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.record.username.cmp(&b.record.username));
        Ok(stale)
    }
}
