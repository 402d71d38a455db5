//! Retry counting and account lockout.
//!
//! Every bad password and every bad step-up code is one failure. When the
//! per-username count reaches the configured threshold the account is locked
//! at its owning source and the counter starts again from zero. A directory
//! account's local shadow is locked in the same step, since an authoritative
//! shadow answers the lock pre-check in place of the directory. The
//! increment, the comparison and the reset are a single store operation, so
//! concurrent attempts for one username never lose a failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, AuditLogger, AuditOutcome};
use crate::config::LockoutConfig;
use crate::identity::{SourceKind, Username};
use crate::source::SourceRegistry;
use crate::storage::{LocalAccountStore, RetryCounterStore};

/// Outcome of recording one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutDecision {
    /// This failure reached the threshold.
    pub locked: bool,

    /// The owning source accepted the lock. Always `false` when `locked` is
    /// `false`.
    pub lock_applied: bool,

    /// Failures counted, including this one.
    pub attempts: u32,
}

/// Per-username failure counter and lock decision.
pub struct RetryLockoutTracker {
    counters: Arc<dyn RetryCounterStore>,
    accounts: Arc<dyn LocalAccountStore>,
    registry: Arc<SourceRegistry>,
    threshold: u32,
    audit: AuditLogger,
}

impl RetryLockoutTracker {
    pub fn new(
        counters: Arc<dyn RetryCounterStore>,
        accounts: Arc<dyn LocalAccountStore>,
        registry: Arc<SourceRegistry>,
        config: &LockoutConfig,
    ) -> Self {
        Self {
            counters,
            accounts,
            registry,
            threshold: config.threshold,
            audit: AuditLogger::tracing(),
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Records one failure for `username`, whose account is owned by `owner`.
    ///
    /// On reaching the threshold the account is locked at `owner`. A failed
    /// lock is logged and reported through
    /// [`LockoutDecision::lock_applied`]; the counter is reset either way.
    ///
    /// # Errors
    ///
    /// Returns the store error if the counter cannot be updated. Callers must
    /// fail the attempt.
    pub async fn increment(
        &self,
        username: &Username,
        owner: SourceKind,
    ) -> AuthResult<LockoutDecision> {
        let record = self
            .counters
            .record_failure(username, self.threshold)
            .await?;

        if !record.threshold_reached {
            tracing::debug!(
                username = %username,
                attempts = record.attempts,
                threshold = self.threshold,
                "Failed attempt recorded"
            );
            return Ok(LockoutDecision {
                locked: false,
                lock_applied: false,
                attempts: record.attempts,
            });
        }

        let lock_applied = match self.registry.lock(owner, username).await {
            Ok(()) => {
                tracing::warn!(
                    username = %username,
                    source = %owner,
                    attempts = record.attempts,
                    "Account locked after repeated failures"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    username = %username,
                    source = %owner,
                    error = %e,
                    "Lockout threshold reached but the owning source could not lock the account"
                );
                false
            }
        };
        self.lock_directory_shadow(username, owner).await;

        let mut event = AuditEvent::builder(AuditAction::AccountLocked)
            .username(username)
            .source(owner)
            .detail(format!("attempts={}", record.attempts));
        if !lock_applied {
            event = event.outcome(AuditOutcome::Failure);
        }
        self.audit.record(event.build()).await;

        Ok(LockoutDecision {
            locked: true,
            lock_applied,
            attempts: record.attempts,
        })
    }

    /// Locks the local shadow of a directory account, if one exists.
    ///
    /// Local and federated owners lock their row through the registry.
    async fn lock_directory_shadow(&self, username: &Username, owner: SourceKind) {
        if !matches!(owner, SourceKind::DirectoryA | SourceKind::DirectoryB) {
            return;
        }
        if let Err(e) = self.accounts.set_locked(username, true).await {
            tracing::error!(
                username = %username,
                source = %owner,
                error = %e,
                "Could not lock the local shadow of a directory account"
            );
        }
    }

    /// Clears the failure count after a success.
    pub async fn reset(&self, username: &Username) -> AuthResult<()> {
        self.counters.reset(username).await
    }

    /// Returns the current failure count.
    pub async fn current(&self, username: &Username) -> AuthResult<u32> {
        self.counters.current(username).await
    }
}
