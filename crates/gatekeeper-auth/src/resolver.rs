//! Account resolution across identity sources.
//!
//! A username resolves to exactly one identity. The local store is consulted
//! first: a native local account always wins, and a shadow wins only when it
//! is flagged authoritative. Otherwise the registered sources are tried in
//! [`SourceKind`] order and the first match is returned. Records from
//! different sources are never merged.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::outcome::{AuthFailure, LockReason};
use crate::source::SourceRegistry;
use crate::storage::LocalAccountStore;

/// Sources consulted after the local store, in priority order.
const EXTERNAL_PRIORITY: [SourceKind; 3] = [
    SourceKind::DirectoryA,
    SourceKind::DirectoryB,
    SourceKind::Federated,
];

/// Result of resolving a username and pre-checking its account state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCheck {
    /// The identity exists and may authenticate.
    Passed(IdentityRecord),
    /// Resolution or a pre-check failed.
    Rejected(AuthFailure),
}

/// Account-state checks, in order: locked, enabled, expired.
#[must_use]
pub fn pre_check(record: &IdentityRecord) -> Option<AuthFailure> {
    if record.locked {
        Some(AuthFailure::locked(LockReason::AccountLocked))
    } else if !record.enabled {
        Some(AuthFailure::AccountDisabled)
    } else if record.account_expired {
        Some(AuthFailure::AccountExpired)
    } else {
        None
    }
}

/// Maps usernames to their authoritative identity and keeps shadow rows.
pub struct AccountResolver {
    accounts: Arc<dyn LocalAccountStore>,
    registry: Arc<SourceRegistry>,
}

impl AccountResolver {
    pub fn new(accounts: Arc<dyn LocalAccountStore>, registry: Arc<SourceRegistry>) -> Self {
        Self { accounts, registry }
    }

    /// Resolves `username` to its authoritative identity.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` if a source that had to be consulted could
    /// not answer. An unreachable source is never read as "not found".
    pub async fn resolve(&self, username: &Username) -> AuthResult<Option<IdentityRecord>> {
        if let Some(account) = self.accounts.find(username).await?
            && account.is_authoritative()
        {
            return Ok(Some(account.record));
        }

        for kind in EXTERNAL_PRIORITY {
            if !self.registry.is_registered(kind) {
                continue;
            }
            if let Some(mut record) = self.registry.fetch_identity(kind, username).await? {
                record.source = kind;
                tracing::debug!(username = %username, source = %kind, "Identity resolved");
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    /// Resolves `username` and runs the account-state pre-checks.
    ///
    /// An unreachable source becomes [`AuthFailure::SourceUnavailable`];
    /// other errors propagate.
    pub async fn check(&self, username: &Username) -> AuthResult<AuthCheck> {
        match self.resolve(username).await {
            Ok(Some(record)) => Ok(match pre_check(&record) {
                Some(failure) => AuthCheck::Rejected(failure),
                None => AuthCheck::Passed(record),
            }),
            Ok(None) => Ok(AuthCheck::Rejected(AuthFailure::AccountNotFound)),
            Err(AuthError::SourceUnavailable {
                source_kind,
                message,
            }) => {
                tracing::warn!(
                    username = %username,
                    source = %source_kind,
                    error = %message,
                    "Identity source unavailable during resolution"
                );
                Ok(AuthCheck::Rejected(AuthFailure::source_unavailable(
                    source_kind,
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Upserts the local shadow of an externally owned identity.
    ///
    /// Idempotent. Returns `false` for local identities and when a native
    /// local account already holds the username; the native account is never
    /// overwritten.
    pub async fn materialize_shadow(&self, record: &IdentityRecord) -> AuthResult<bool> {
        if !record.source.is_external() {
            return Ok(false);
        }

        let written = self.accounts.upsert_shadow(record).await?;
        if !written {
            tracing::warn!(
                username = %record.username,
                source = %record.source,
                "External identity collides with a native local account; shadow not written"
            );
        }
        Ok(written)
    }

    /// Copies a directory-verified email into the shadow of `username`.
    ///
    /// Returns `false` if there is no shadow to update.
    pub async fn trust_verified_email(&self, username: &Username, email: &str) -> AuthResult<bool> {
        match self.accounts.find(username).await? {
            Some(account) if !account.is_native() => {
                self.accounts.set_verified_email(username, email).await
            }
            _ => Ok(false),
        }
    }

    /// Records a successful login on the local row (native or shadow).
    pub async fn record_login(&self, username: &Username, at: OffsetDateTime) -> AuthResult<bool> {
        self.accounts.set_last_login(username, at).await
    }

    /// Returns the local shadow or native row of `username` as an identity.
    pub async fn local_record(&self, username: &Username) -> AuthResult<Option<IdentityRecord>> {
        Ok(self
            .accounts
            .find(username)
            .await?
            .map(|account| account.record))
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn accounts(&self) -> &Arc<dyn LocalAccountStore> {
        &self.accounts
    }
}
