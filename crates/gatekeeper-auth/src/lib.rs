//! # gatekeeper-auth
//!
//! Authentication core for a service whose users live in several identity
//! sources: a local credential store, two legacy directories and a federated
//! SSO provider.
//!
//! This crate provides:
//! - Account resolution across sources in a fixed priority order
//! - A password authentication state machine with retry lockout
//! - Step-up (second factor) codes delivered by email or text
//! - Cross-source account discovery by verified email
//! - Access/refresh token issuance mirrored to a verification service
//! - Stale-account disabling
//! - Audit logging for security events
//!
//! ## Modules
//!
//! - [`config`] - Configuration
//! - [`source`] - Identity sources and the source registry
//! - [`resolver`] - Account resolution and pre-checks
//! - [`orchestrator`] - The authentication state machine
//! - [`lockout`] - Retry counting and lockout
//! - [`step_up`] - Second factor policy, challenges and delivery
//! - [`linker`] - Cross-source account discovery
//! - [`token`] - Token issuance and lifecycle
//! - [`inactivity`] - Stale-account handling
//! - [`audit`] - Security event audit logging
//! - [`storage`] - Storage traits and in-memory stores

pub mod audit;
pub mod config;
pub mod error;
pub mod identity;
pub mod inactivity;
pub mod linker;
pub mod lockout;
pub mod orchestrator;
pub mod outcome;
pub mod password;
pub mod resolver;
pub mod source;
pub mod step_up;
pub mod storage;
pub mod token;
pub mod types;

pub use audit::{AuditAction, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingAuditSink};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use identity::{ContactChannel, ContactChannels, IdentityRecord, SourceKind, Username};
pub use inactivity::InactivityPolicy;
pub use linker::{CrossSourceAccountLinker, LinkedAccount};
pub use lockout::{LockoutDecision, RetryLockoutTracker};
pub use orchestrator::{AuthContext, AuthRequest, AuthenticationOrchestrator};
pub use outcome::{AuthFailure, AuthOutcome, LockReason, StepUpTicket};
pub use resolver::{AccountResolver, AuthCheck};
pub use source::{FederatedShadowSource, IdentitySource, LocalCredentialSource, SourceRegistry};
pub use step_up::{
    NotificationSender, RetryableReason, StepUpChallenge, StepUpOwner, StepUpPolicy,
    StepUpValidation, TerminalReason, WebhookNotificationSender,
};
pub use storage::{LocalAccountStore, RetryCounterStore, StepUpTokenStore};
pub use token::{
    HttpVerificationChannel, IssuedAccessToken, IssuedTokens, JwtService, TokenConfig,
    TokenLifecycleTracker, VerificationChannel,
};
pub use types::{Client, ClientValidationError, GrantType, LocalAccount, StepUpKind, StepUpToken};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use gatekeeper_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::identity::{IdentityRecord, SourceKind, Username};
    pub use crate::orchestrator::{AuthContext, AuthRequest, AuthenticationOrchestrator};
    pub use crate::outcome::{AuthFailure, AuthOutcome, LockReason, StepUpTicket};
    pub use crate::source::{IdentitySource, SourceRegistry};
    pub use crate::step_up::{StepUpValidation, TerminalReason};
    pub use crate::token::{IssuedTokens, TokenLifecycleTracker};
    pub use crate::types::{Client, GrantType};
}
