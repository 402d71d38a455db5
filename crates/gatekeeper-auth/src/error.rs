//! Authentication infrastructure error types.
//!
//! [`AuthError`] covers faults of the machinery around an authentication
//! attempt: storage, configuration, identity-source transport, notification
//! delivery and token handling. Outcomes that describe the attempt itself
//! (bad password, locked account, ...) are modelled by
//! [`AuthFailure`](crate::outcome::AuthFailure) instead.

use std::fmt;

use crate::identity::SourceKind;

/// Errors raised by the authentication machinery.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A persistent store (retry counters, step-up tokens, accounts) failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },

    /// An identity source timed out or could not be reached.
    #[error("Identity source unavailable: {source_kind} - {message}")]
    SourceUnavailable {
        /// The source that failed.
        source_kind: SourceKind,
        /// Description of the failure.
        message: String,
    },

    /// No identity source is registered for the requested kind.
    #[error("Identity source not registered: {source_kind}")]
    SourceNotRegistered {
        /// The missing source.
        source_kind: SourceKind,
    },

    /// The source does not support the requested operation.
    #[error("Identity source {source_kind} does not support {operation}")]
    UnsupportedOperation {
        /// The source asked to perform the operation.
        source_kind: SourceKind,
        /// Name of the operation.
        operation: &'static str,
    },

    /// A state-changing call named an account the source does not hold.
    #[error("Unknown account at {source_kind}: {username}")]
    UnknownAccount {
        /// The source that was asked.
        source_kind: SourceKind,
        /// The username that was not found.
        username: String,
    },

    /// A notification could not be delivered.
    #[error("Notification error: {message}")]
    Notification {
        /// Description of the delivery failure.
        message: String,
    },

    /// The verification side-channel rejected or failed a call.
    #[error("Verification channel error: {message}")]
    VerificationChannel {
        /// Description of the failure.
        message: String,
    },

    /// The token is invalid, malformed, or cannot be parsed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The refresh grant is invalid or was issued to another client.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The client is unknown or not allowed to perform the operation.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,
}

impl AuthError {
    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a new `SourceUnavailable` error.
    #[must_use]
    pub fn source_unavailable(source_kind: SourceKind, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_kind,
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedOperation` error.
    #[must_use]
    pub fn unsupported(source_kind: SourceKind, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            source_kind,
            operation,
        }
    }

    /// Creates a new `UnknownAccount` error.
    #[must_use]
    pub fn unknown_account(source_kind: SourceKind, username: impl Into<String>) -> Self {
        Self::UnknownAccount {
            source_kind,
            username: username.into(),
        }
    }

    /// Creates a new `Notification` error.
    #[must_use]
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// Creates a new `VerificationChannel` error.
    #[must_use]
    pub fn verification_channel(message: impl Into<String>) -> Self {
        Self::VerificationChannel {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller sent something invalid (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. }
                | Self::InvalidGrant { .. }
                | Self::InvalidClient { .. }
                | Self::TokenExpired
        )
    }

    /// Returns `true` if this is a server-side fault (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if the failure came from an unreachable dependency and
    /// the caller may retry at the transport level.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::Notification { .. }
                | Self::VerificationChannel { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::SourceUnavailable { .. }
            | Self::SourceNotRegistered { .. }
            | Self::UnsupportedOperation { .. }
            | Self::UnknownAccount { .. } => ErrorCategory::IdentitySource,
            Self::Notification { .. } | Self::VerificationChannel { .. } => {
                ErrorCategory::Delivery
            }
            Self::InvalidToken { .. } | Self::TokenExpired => ErrorCategory::Token,
            Self::InvalidGrant { .. } | Self::InvalidClient { .. } => ErrorCategory::Validation,
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Token-related errors (validation, expiration).
    Token,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
    /// Identity source transport errors.
    IdentitySource,
    /// Outbound delivery (notifications, verification side-channel).
    Delivery,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
            Self::IdentitySource => write!(f, "identity_source"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}
