//! Stale-account disabling.
//!
//! Accounts whose last login is older than `max_inactivity` are disabled. A
//! re-enabled account gets its last login moved to
//! `now - max_inactivity + grace_period`, which leaves it `grace_period` to
//! log in before the next sweep disables it again.
//!
//! Only rows whose account state lives in the local store are swept: native
//! accounts and federated shadows. Directory accounts keep their enabled flag
//! at the directory.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::config::InactivityConfig;
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::storage::LocalAccountStore;
use crate::types::LocalAccount;

pub struct InactivityPolicy {
    accounts: Arc<dyn LocalAccountStore>,
    max_inactivity: Duration,
    grace_period: Duration,
    audit: AuditLogger,
}

impl InactivityPolicy {
    /// # Errors
    ///
    /// Returns a configuration error if a duration does not fit
    /// [`time::Duration`] or the grace period exceeds the inactivity limit.
    pub fn new(
        accounts: Arc<dyn LocalAccountStore>,
        config: &InactivityConfig,
    ) -> AuthResult<Self> {
        let max_inactivity = Duration::try_from(config.max_inactivity)
            .map_err(|e| AuthError::configuration(format!("max_inactivity: {e}")))?;
        let grace_period = Duration::try_from(config.grace_period)
            .map_err(|e| AuthError::configuration(format!("grace_period: {e}")))?;
        if grace_period > max_inactivity {
            return Err(AuthError::configuration(
                "grace_period must not exceed max_inactivity",
            ));
        }

        Ok(Self {
            accounts,
            max_inactivity,
            grace_period,
            audit: AuditLogger::tracing(),
        })
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Returns `true` if the record has not logged in within
    /// `max_inactivity` of `now`. Records that never logged in are not stale.
    pub fn is_stale(&self, record: &IdentityRecord, now: OffsetDateTime) -> bool {
        record
            .last_login_at
            .is_some_and(|last| last < now - self.max_inactivity)
    }

    /// Re-enables an account and starts its grace period.
    ///
    /// Returns `false` if no such account exists locally.
    pub async fn reenable(&self, username: &Username, now: OffsetDateTime) -> AuthResult<bool> {
        if !self.accounts.set_enabled(username, true).await? {
            return Ok(false);
        }
        let adjusted = now - self.max_inactivity + self.grace_period;
        self.accounts.set_last_login(username, adjusted).await?;

        tracing::info!(
            username = %username,
            last_login_at = %adjusted,
            "Account re-enabled with grace period"
        );
        self.audit
            .record(
                AuditEvent::builder(AuditAction::AccountReenabled)
                    .username(username)
                    .build(),
            )
            .await;
        Ok(true)
    }

    /// Disables every locally managed account that is stale at `now` and
    /// returns the affected usernames.
    pub async fn disable_stale(&self, now: OffsetDateTime) -> AuthResult<Vec<Username>> {
        let cutoff = now - self.max_inactivity;
        let mut disabled = Vec::new();

        for account in self.accounts.find_inactive_since(cutoff).await? {
            if !is_locally_managed(&account) {
                continue;
            }
            let username = account.record.username;
            if self.accounts.set_enabled(&username, false).await? {
                self.audit
                    .record(
                        AuditEvent::builder(AuditAction::AccountDisabled)
                            .username(&username)
                            .source(account.record.source)
                            .detail("inactive")
                            .build(),
                    )
                    .await;
                disabled.push(username);
            }
        }

        if !disabled.is_empty() {
            tracing::info!(count = disabled.len(), "Disabled stale accounts");
        }
        Ok(disabled)
    }
}

fn is_locally_managed(account: &LocalAccount) -> bool {
    matches!(account.shadow_of(), None | Some(SourceKind::Federated))
}
