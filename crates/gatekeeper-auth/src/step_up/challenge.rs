//! One-time code lifecycle.
//!
//! A challenge is a [`StepUpToken`]: an opaque token returned to the client
//! plus a six-digit code delivered out of band. There is at most one live
//! challenge per user; issuing another keeps the token, replaces the code and
//! moves the expiry. A correct code consumes token and code together.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::{StepUpConfig, StepUpTemplates};
use crate::error::AuthError;
use crate::identity::{ContactChannel, IdentityRecord, SourceKind, Username};
use crate::lockout::RetryLockoutTracker;
use crate::outcome::{AuthFailure, StepUpTicket};
use crate::password::{generate_numeric_code, generate_opaque_token};
use crate::step_up::notify::NotificationSender;
use crate::step_up::policy::StepUpPolicy;
use crate::storage::StepUpTokenStore;
use crate::types::{StepUpKind, StepUpToken};

/// Attempts at drawing a code not held by another live challenge.
const MAX_CODE_ATTEMPTS: usize = 10;

// ============================================================================
// Validation results
// ============================================================================

/// Owner of a successfully validated challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpOwner {
    pub username: Username,
    pub source: SourceKind,
}

/// The client may try again (or ask for a new code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryableReason {
    /// The code is past its expiry; a resend issues a new one.
    Expired,
    /// Wrong code, counted against the retry limit.
    InvalidCode,
}

/// The challenge is over; the client must start a new login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminalReason {
    /// Unknown token, or already consumed.
    TokenNotFound,
    /// A wrong code crossed the lockout threshold for `username`.
    Locked { username: Username },
    /// The identity no longer passes authentication checks.
    Rejected {
        failure: AuthFailure,
    },
}

/// Result of validating or resending a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum StepUpValidation<T = StepUpOwner> {
    Success(T),
    Retryable(RetryableReason),
    Terminal(TerminalReason),
}

impl<T> StepUpValidation<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepUpValidation<U> {
        match self {
            Self::Success(value) => StepUpValidation::Success(f(value)),
            Self::Retryable(reason) => StepUpValidation::Retryable(reason),
            Self::Terminal(reason) => StepUpValidation::Terminal(reason),
        }
    }
}

// ============================================================================
// Challenge service
// ============================================================================

/// Creates, validates and resends step-up challenges.
pub struct StepUpChallenge {
    tokens: Arc<dyn StepUpTokenStore>,
    notifier: Arc<dyn NotificationSender>,
    tracker: Arc<RetryLockoutTracker>,
    policy: StepUpPolicy,
    code_lifetime: Duration,
    templates: StepUpTemplates,
}

impl StepUpChallenge {
    /// Creates the challenge service.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a trusted network is not valid CIDR.
    pub fn new(
        tokens: Arc<dyn StepUpTokenStore>,
        notifier: Arc<dyn NotificationSender>,
        tracker: Arc<RetryLockoutTracker>,
        config: &StepUpConfig,
    ) -> AuthResult<Self> {
        Ok(Self {
            tokens,
            notifier,
            tracker,
            policy: StepUpPolicy::from_config(config)?,
            code_lifetime: config.code_lifetime,
            templates: config.templates.clone(),
        })
    }

    pub fn policy(&self) -> &StepUpPolicy {
        &self.policy
    }

    /// Returns `true` if a login needs a second factor.
    pub fn is_required(&self, roles: &BTreeSet<String>, origin: Option<IpAddr>) -> bool {
        self.policy.is_required(roles, origin)
    }

    /// Issues a code to the identity's preferred verified channel.
    ///
    /// Returns `Ok(None)` if the identity has no verified channel.
    pub async fn create_challenge(
        &self,
        identity: &IdentityRecord,
    ) -> AuthResult<Option<StepUpTicket>> {
        self.create_challenge_at(identity, OffsetDateTime::now_utc())
            .await
    }

    /// [`create_challenge`](Self::create_challenge) with an explicit clock.
    pub async fn create_challenge_at(
        &self,
        identity: &IdentityRecord,
        now: OffsetDateTime,
    ) -> AuthResult<Option<StepUpTicket>> {
        let Some((channel, recipient)) = identity.contacts.preferred() else {
            return Ok(None);
        };

        let token = match self
            .tokens
            .find_by_owner(StepUpKind::Mfa, &identity.username)
            .await?
        {
            Some(existing) => existing.token,
            None => generate_opaque_token(),
        };
        let code = self.unused_code().await?;

        let lifetime = time::Duration::try_from(self.code_lifetime).map_err(|e| {
            AuthError::configuration(format!("Invalid step-up code lifetime: {}", e))
        })?;
        let record = StepUpToken {
            token,
            code,
            kind: StepUpKind::Mfa,
            username: identity.username.clone(),
            source: identity.source,
            channel,
            expires_at: now + lifetime,
            created_at: now,
        };
        self.tokens.upsert(&record).await?;

        let parameters = HashMap::from([
            ("code".to_string(), record.code.clone()),
            ("username".to_string(), identity.username.to_string()),
            (
                "expires_in_minutes".to_string(),
                lifetime.whole_minutes().to_string(),
            ),
        ]);
        self.notifier
            .send(channel, recipient, self.template_for(channel), &parameters)
            .await?;

        tracing::info!(
            username = %identity.username,
            channel = %channel,
            expires_at = %record.expires_at,
            "Step-up code issued"
        );

        Ok(Some(StepUpTicket {
            token: record.token,
            username: record.username,
            channel,
            expires_at: record.expires_at,
        }))
    }

    /// Looks up a challenge by its token.
    pub async fn find(&self, token: &str) -> AuthResult<Option<StepUpToken>> {
        self.tokens.find_by_token(StepUpKind::Mfa, token).await
    }

    /// Validates a code against a challenge.
    ///
    /// # Errors
    ///
    /// Returns store errors, including a failed retry-counter update.
    pub async fn validate(&self, token: &str, code: &str) -> AuthResult<StepUpValidation> {
        self.validate_at(token, code, OffsetDateTime::now_utc())
            .await
    }

    /// [`validate`](Self::validate) with an explicit clock.
    pub async fn validate_at(
        &self,
        token: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<StepUpValidation> {
        let Some(record) = self.find(token).await? else {
            return Ok(StepUpValidation::Terminal(TerminalReason::TokenNotFound));
        };

        if record.is_expired_at(now) {
            tracing::debug!(username = %record.username, "Step-up code expired");
            return Ok(StepUpValidation::Retryable(RetryableReason::Expired));
        }

        let matches: bool = record.code.as_bytes().ct_eq(code.as_bytes()).into();
        if !matches {
            let decision = self
                .tracker
                .increment(&record.username, record.source)
                .await?;
            if decision.locked {
                self.tokens.delete(StepUpKind::Mfa, &record.token).await?;
                return Ok(StepUpValidation::Terminal(TerminalReason::Locked {
                    username: record.username,
                }));
            }
            return Ok(StepUpValidation::Retryable(RetryableReason::InvalidCode));
        }

        if !self.tokens.delete(StepUpKind::Mfa, &record.token).await? {
            // Consumed concurrently.
            return Ok(StepUpValidation::Terminal(TerminalReason::TokenNotFound));
        }
        self.tracker.reset(&record.username).await?;

        Ok(StepUpValidation::Success(StepUpOwner {
            username: record.username,
            source: record.source,
        }))
    }

    /// Issues a fresh code for an existing challenge. The token stays the
    /// same; code and expiry are replaced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the identity does not own the challenge.
    pub async fn resend(
        &self,
        challenge: &StepUpToken,
        identity: &IdentityRecord,
    ) -> AuthResult<Option<StepUpTicket>> {
        if challenge.username != identity.username {
            return Err(AuthError::invalid_token("Challenge belongs to another user"));
        }
        self.create_challenge(identity).await
    }

    /// Removes challenges expired at `now`.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        self.tokens.delete_expired(now).await
    }

    fn template_for(&self, channel: ContactChannel) -> &str {
        match channel {
            ContactChannel::Email | ContactChannel::SecondaryEmail => &self.templates.email,
            ContactChannel::Text => &self.templates.text,
        }
    }

    async fn unused_code(&self) -> AuthResult<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_numeric_code();
            if !self.tokens.code_in_use(StepUpKind::Mfa, &code).await? {
                return Ok(code);
            }
        }
        Err(AuthError::internal("Could not draw an unused step-up code"))
    }
}
