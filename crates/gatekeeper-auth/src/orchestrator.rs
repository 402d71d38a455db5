//! The authentication state machine.
//!
//! An attempt moves through `Start → Resolved → CredentialChecked →
//! RetryEvaluated → StepUpEvaluated` and ends in an [`AuthOutcome`]:
//!
//! - blank principal or secret fails before any lookup
//! - the resolved identity is pre-checked (locked, enabled, expired); these
//!   failures never touch the retry counter
//! - the password is checked at the owning source; an unreachable source is
//!   reported as such and not counted
//! - a mismatch is counted and may lock the account
//! - a match resets the counter, records the login and keeps the local
//!   shadow current, then decides whether a second factor is required
//!
//! Infrastructure faults that must fail closed (counter store, token store)
//! are returned as `Err`.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::lockout::RetryLockoutTracker;
use crate::outcome::{AuthFailure, AuthOutcome, LockReason, StepUpTicket};
use crate::resolver::{AccountResolver, AuthCheck, pre_check};
use crate::step_up::{StepUpChallenge, StepUpValidation, TerminalReason};
use crate::types::GrantType;

// ============================================================================
// Requests
// ============================================================================

/// Where an attempt comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Requesting OAuth client.
    pub client_id: String,

    /// Grant the attempt belongs to.
    pub grant: GrantType,

    /// Network origin, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<IpAddr>,
}

impl AuthContext {
    #[must_use]
    pub fn new(client_id: impl Into<String>, grant: GrantType) -> Self {
        Self {
            client_id: client_id.into(),
            grant,
            origin: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: IpAddr) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// A username/password attempt.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
    pub context: AuthContext,
}

impl AuthRequest {
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        context: AuthContext,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            context,
        }
    }
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("context", &self.context)
            .finish()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Sequences resolution, credential check, lockout and step-up.
pub struct AuthenticationOrchestrator {
    resolver: Arc<AccountResolver>,
    tracker: Arc<RetryLockoutTracker>,
    step_up: Arc<StepUpChallenge>,
    audit: AuditLogger,
}

impl AuthenticationOrchestrator {
    pub fn new(
        resolver: Arc<AccountResolver>,
        tracker: Arc<RetryLockoutTracker>,
        step_up: Arc<StepUpChallenge>,
    ) -> Self {
        Self {
            resolver,
            tracker,
            step_up,
            audit: AuditLogger::tracing(),
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Authenticates a username/password attempt.
    ///
    /// # Errors
    ///
    /// Returns an error only for faults that must fail closed: the retry
    /// counter store, the step-up token store, code delivery, or the local
    /// account store. Unreachable identity sources are reported as
    /// [`AuthFailure::SourceUnavailable`].
    pub async fn authenticate(&self, request: &AuthRequest) -> AuthResult<AuthOutcome> {
        let context = &request.context;

        // Start → Resolved
        let username = match Username::parse(&request.username) {
            Some(username) if !request.password.trim().is_empty() => username,
            parsed => {
                return self
                    .fail(context, parsed.as_ref(), AuthFailure::MissingCredentials)
                    .await;
            }
        };

        let record = match self.resolver.check(&username).await? {
            AuthCheck::Passed(record) => record,
            AuthCheck::Rejected(failure) => {
                return self.fail(context, Some(&username), failure).await;
            }
        };

        // Resolved → CredentialChecked
        let verified = match self
            .resolver
            .registry()
            .verify_password(record.source, &username, &request.password)
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                tracing::warn!(
                    username = %username,
                    source = %record.source,
                    error = %e,
                    "Credential check failed at identity source"
                );
                return self
                    .fail(
                        context,
                        Some(&username),
                        AuthFailure::source_unavailable(record.source),
                    )
                    .await;
            }
        };

        // CredentialChecked → RetryEvaluated
        if !verified {
            let decision = self.tracker.increment(&username, record.source).await?;
            let failure = if decision.locked {
                AuthFailure::locked(LockReason::ThresholdReached)
            } else {
                AuthFailure::BadCredentials
            };
            return self.fail(context, Some(&username), failure).await;
        }

        let record = self.accept_credentials(record).await?;
        if record.credentials_expired {
            return self
                .fail(context, Some(&username), AuthFailure::CredentialsExpired)
                .await;
        }

        // RetryEvaluated → StepUpEvaluated
        self.evaluate_step_up(record, context).await
    }

    /// Completes a login the SSO provider has already authenticated.
    ///
    /// The identity is checked against its local shadow (lock and disable
    /// state live there), the shadow is refreshed, and step-up is evaluated
    /// exactly as for a password login.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for non-federated identities.
    pub async fn complete_federated_login(
        &self,
        mut identity: IdentityRecord,
        context: &AuthContext,
    ) -> AuthResult<AuthOutcome> {
        if identity.source != SourceKind::Federated {
            return Err(AuthError::unsupported(identity.source, "federated_login"));
        }

        if let Some(shadow) = self.resolver.local_record(&identity.username).await? {
            if shadow.source != SourceKind::Federated {
                tracing::warn!(
                    username = %identity.username,
                    owner = %shadow.source,
                    "Federated login for a username owned by another source"
                );
                return self
                    .fail(context, Some(&identity.username), AuthFailure::AccountNotFound)
                    .await;
            }
            identity.locked |= shadow.locked;
            identity.enabled &= shadow.enabled;
        }

        if let Some(failure) = pre_check(&identity) {
            return self.fail(context, Some(&identity.username), failure).await;
        }

        let identity = self.accept_credentials(identity).await?;
        self.evaluate_step_up(identity, context).await
    }

    /// Validates a step-up code and, on success, returns the identity.
    ///
    /// The identity is resolved again so a lock or disable that happened
    /// while the code was outstanding still applies.
    pub async fn complete_step_up(
        &self,
        token: &str,
        code: &str,
        context: &AuthContext,
    ) -> AuthResult<StepUpValidation<IdentityRecord>> {
        let owner = match self.step_up.validate(token, code).await? {
            StepUpValidation::Success(owner) => owner,
            StepUpValidation::Retryable(reason) => {
                tracing::debug!(reason = ?reason, "Step-up code not accepted");
                return Ok(StepUpValidation::Retryable(reason));
            }
            StepUpValidation::Terminal(reason) => {
                if let TerminalReason::Locked { username } = &reason {
                    self.audit
                        .login_failed(
                            context.grant,
                            Some(username),
                            &context.client_id,
                            context.origin,
                            &AuthFailure::locked(LockReason::ThresholdReached),
                        )
                        .await;
                }
                return Ok(StepUpValidation::Terminal(reason));
            }
        };

        match self.resolver.check(&owner.username).await? {
            AuthCheck::Passed(record) => {
                self.audit_login(&record, context).await;
                Ok(StepUpValidation::Success(record))
            }
            AuthCheck::Rejected(failure) => {
                self.audit
                    .login_failed(
                        context.grant,
                        Some(&owner.username),
                        &context.client_id,
                        context.origin,
                        &failure,
                    )
                    .await;
                Ok(StepUpValidation::Terminal(TerminalReason::Rejected { failure }))
            }
        }
    }

    /// Re-issues the code of a live challenge. The token stays the same; the
    /// code and expiry change.
    pub async fn resend_step_up(&self, token: &str) -> AuthResult<StepUpValidation<StepUpTicket>> {
        let Some(challenge) = self.step_up.find(token).await? else {
            return Ok(StepUpValidation::Terminal(TerminalReason::TokenNotFound));
        };

        let record = match self.resolver.check(&challenge.username).await? {
            AuthCheck::Passed(record) => record,
            AuthCheck::Rejected(failure) => {
                return Ok(StepUpValidation::Terminal(TerminalReason::Rejected { failure }));
            }
        };

        Ok(match self.step_up.resend(&challenge, &record).await? {
            Some(ticket) => StepUpValidation::Success(ticket),
            None => StepUpValidation::Terminal(TerminalReason::Rejected {
                failure: AuthFailure::MfaUnavailable,
            }),
        })
    }

    /// Success path after a correct password or a federated assertion.
    async fn accept_credentials(&self, mut record: IdentityRecord) -> AuthResult<IdentityRecord> {
        let now = OffsetDateTime::now_utc();

        self.tracker.reset(&record.username).await?;

        if record.source.is_external() {
            self.resolver.materialize_shadow(&record).await?;
        }
        if record.source == SourceKind::DirectoryB
            && let Some(email) = record.contacts.email.as_deref()
        {
            self.resolver
                .trust_verified_email(&record.username, email)
                .await?;
        }

        self.resolver.record_login(&record.username, now).await?;
        record.last_login_at = Some(now);
        Ok(record)
    }

    async fn evaluate_step_up(
        &self,
        record: IdentityRecord,
        context: &AuthContext,
    ) -> AuthResult<AuthOutcome> {
        if !self.step_up.is_required(&record.roles, context.origin) {
            self.audit_login(&record, context).await;
            return Ok(AuthOutcome::Success(record));
        }

        match self.step_up.create_challenge(&record).await? {
            Some(ticket) => {
                self.audit
                    .emit(
                        context.grant,
                        AuditEvent::builder(AuditAction::StepUpIssued)
                            .username(&record.username)
                            .client_id(&context.client_id)
                            .source(record.source)
                            .ip_address(context.origin)
                            .detail(ticket.channel.as_str())
                            .build(),
                    )
                    .await;
                Ok(AuthOutcome::NeedsStepUp(ticket))
            }
            None => {
                tracing::warn!(
                    username = %record.username,
                    "Second factor required but no verified contact channel"
                );
                self.fail(context, Some(&record.username), AuthFailure::MfaUnavailable)
                    .await
            }
        }
    }

    async fn audit_login(&self, record: &IdentityRecord, context: &AuthContext) {
        self.audit
            .emit(
                context.grant,
                AuditEvent::builder(AuditAction::UserLogin)
                    .username(&record.username)
                    .client_id(&context.client_id)
                    .source(record.source)
                    .ip_address(context.origin)
                    .build(),
            )
            .await;
    }

    async fn fail(
        &self,
        context: &AuthContext,
        username: Option<&Username>,
        failure: AuthFailure,
    ) -> AuthResult<AuthOutcome> {
        tracing::info!(
            username = username.map(Username::as_str),
            client_id = %context.client_id,
            failure = failure.code(),
            "Authentication failed"
        );
        self.audit
            .login_failed(
                context.grant,
                username,
                &context.client_id,
                context.origin,
                &failure,
            )
            .await;
        Ok(AuthOutcome::Failure(failure))
    }
}
