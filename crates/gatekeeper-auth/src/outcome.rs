//! Authentication outcomes.
//!
//! An authentication attempt ends in exactly one [`AuthOutcome`]. A pending
//! second factor is a distinct variant rather than a failure, so callers must
//! route the user into the step-up flow explicitly.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::identity::{ContactChannel, IdentityRecord, SourceKind, Username};

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The identity is fully authenticated.
    Success(IdentityRecord),

    /// The password matched but a second factor is required.
    NeedsStepUp(StepUpTicket),

    /// The attempt failed.
    Failure(AuthFailure),
}

impl AuthOutcome {
    /// Returns `true` for a fully authenticated identity.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the authenticated identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&IdentityRecord> {
        match self {
            Self::Success(identity) => Some(identity),
            _ => None,
        }
    }

    /// Returns the pending step-up ticket, if any.
    #[must_use]
    pub fn step_up(&self) -> Option<&StepUpTicket> {
        match self {
            Self::NeedsStepUp(ticket) => Some(ticket),
            _ => None,
        }
    }

    /// Returns the failure kind, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<AuthFailure> for AuthOutcome {
    fn from(failure: AuthFailure) -> Self {
        Self::Failure(failure)
    }
}

/// Handle to a pending step-up challenge returned to the caller.
///
/// Never carries the one-time code itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpTicket {
    /// Opaque challenge token.
    pub token: String,

    /// Owner of the challenge.
    pub username: Username,

    /// Channel the code was sent through.
    pub channel: ContactChannel,

    /// Code expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Why an account is reported as locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    /// The account was already locked at its source.
    AccountLocked,

    /// This attempt crossed the lockout threshold.
    ThresholdReached,
}

/// User-facing reasons an authentication attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthFailure {
    /// Blank principal or secret.
    MissingCredentials,

    /// No identity resolves for the username.
    AccountNotFound,

    /// The account is locked.
    Locked {
        /// Pre-existing lock or just-crossed threshold.
        reason: LockReason,
    },

    /// The account is disabled.
    AccountDisabled,

    /// The account has expired.
    AccountExpired,

    /// The password is correct but must be changed.
    CredentialsExpired,

    /// Wrong password or one-time code.
    BadCredentials,

    /// A second factor is required but no verified channel exists.
    MfaUnavailable,

    /// The owning identity source timed out or failed.
    SourceUnavailable {
        /// The source that failed.
        source: SourceKind,
    },
}

impl AuthFailure {
    /// Creates a `Locked` failure.
    #[must_use]
    pub fn locked(reason: LockReason) -> Self {
        Self::Locked { reason }
    }

    /// Creates a `SourceUnavailable` failure.
    #[must_use]
    pub fn source_unavailable(source: SourceKind) -> Self {
        Self::SourceUnavailable { source }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::AccountNotFound => "account_not_found",
            Self::Locked { .. } => "account_locked",
            Self::AccountDisabled => "account_disabled",
            Self::AccountExpired => "account_expired",
            Self::CredentialsExpired => "credentials_expired",
            Self::BadCredentials => "bad_credentials",
            Self::MfaUnavailable => "mfa_unavailable",
            Self::SourceUnavailable { .. } => "source_unavailable",
        }
    }

    /// Returns `true` if this failure consumed a retry slot.
    #[must_use]
    pub fn counts_against_retries(&self) -> bool {
        matches!(
            self,
            Self::BadCredentials
                | Self::Locked {
                    reason: LockReason::ThresholdReached
                }
        )
    }

    /// Returns `true` if the caller may retry the same attempt later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "Username and password are required"),
            Self::AccountNotFound => write!(f, "Account not found"),
            Self::Locked {
                reason: LockReason::AccountLocked,
            } => write!(f, "Account is locked"),
            Self::Locked {
                reason: LockReason::ThresholdReached,
            } => write!(f, "Account locked after too many failed attempts"),
            Self::AccountDisabled => write!(f, "Account is disabled"),
            Self::AccountExpired => write!(f, "Account has expired"),
            Self::CredentialsExpired => write!(f, "Password has expired"),
            Self::BadCredentials => write!(f, "Bad credentials"),
            Self::MfaUnavailable => write!(f, "No verified contact channel for second factor"),
            Self::SourceUnavailable { source } => {
                write!(f, "Identity source unavailable: {}", source)
            }
        }
    }
}
