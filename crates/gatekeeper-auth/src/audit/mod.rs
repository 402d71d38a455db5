//! Security event audit logging.
//!
//! Authentication and token lifecycle events are handed to an [`AuditSink`].
//! [`AuditLogger`] applies the audit configuration and drops every event for
//! machine-to-machine (client-credentials) grants.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::identity::{SourceKind, Username};
use crate::outcome::AuthFailure;
use crate::types::GrantType;

/// Audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Authentication
    UserLogin,
    UserLoginFailed,
    StepUpIssued,

    // Lockout and account state
    AccountLocked,
    AccountDisabled,
    AccountReenabled,

    // Token lifecycle
    TokenIssued,
    TokenRefreshed,
    TokenRevoked,
}

impl AuditAction {
    /// Returns the dotted event code.
    pub fn to_code(&self) -> &'static str {
        match self {
            AuditAction::UserLogin => "user.login",
            AuditAction::UserLoginFailed => "user.login_failed",
            AuditAction::StepUpIssued => "user.step_up_issued",
            AuditAction::AccountLocked => "account.locked",
            AuditAction::AccountDisabled => "account.disabled",
            AuditAction::AccountReenabled => "account.reenabled",
            AuditAction::TokenIssued => "token.issued",
            AuditAction::TokenRefreshed => "token.refreshed",
            AuditAction::TokenRevoked => "token.revoked",
        }
    }

    fn is_token_operation(&self) -> bool {
        matches!(
            self,
            AuditAction::TokenIssued | AuditAction::TokenRefreshed | AuditAction::TokenRevoked
        )
    }
}

/// Audit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub username: Option<Username>,
    pub client_id: Option<String>,
    pub source: Option<SourceKind>,
    pub ip_address: Option<IpAddr>,
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Starts a successful event for `action`.
    pub fn builder(action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder {
            event: AuditEvent {
                id: Uuid::new_v4(),
                action,
                outcome: AuditOutcome::Success,
                recorded_at: OffsetDateTime::now_utc(),
                username: None,
                client_id: None,
                source: None,
                ip_address: None,
                detail: None,
            },
        }
    }
}

/// Builder for audit events
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.event.outcome = outcome;
        self
    }

    pub fn username(mut self, username: &Username) -> Self {
        self.event.username = Some(username.clone());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.event.client_id = Some(client_id.into());
        self
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.event.source = Some(source);
        self
    }

    pub fn ip_address(mut self, ip: Option<IpAddr>) -> Self {
        self.event.ip_address = ip;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.event.detail = Some(detail.into());
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }
}

/// Destination for audit events. Implementations handle their own delivery
/// errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Writes audit events to the `gatekeeper::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "gatekeeper::audit",
            event_id = %event.id,
            action = event.action.to_code(),
            outcome = ?event.outcome,
            username = event.username.as_ref().map(Username::as_str),
            client_id = event.client_id.as_deref(),
            source = event.source.map(|s| s.as_str()),
            ip = ?event.ip_address,
            detail = event.detail.as_deref(),
            "audit"
        );
    }
}

/// Filters events through [`AuditConfig`] before handing them to a sink.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    config: AuditConfig,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self { sink, config }
    }

    /// Logger writing to [`TracingAuditSink`] with default settings.
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingAuditSink), AuditConfig::default())
    }

    fn enabled_for(&self, action: AuditAction, outcome: AuditOutcome) -> bool {
        if action.is_token_operation() {
            return self.config.log_token_operations;
        }
        match outcome {
            AuditOutcome::Success => self.config.log_successful_auth,
            AuditOutcome::Failure => self.config.log_failed_auth,
        }
    }

    /// Records an event unless it belongs to a machine-to-machine grant or is
    /// disabled by configuration.
    pub async fn emit(&self, grant: GrantType, event: AuditEvent) {
        if grant.is_machine_to_machine() {
            return;
        }
        self.record(event).await;
    }

    /// Records an event that is not tied to a grant, such as a revocation or
    /// an account state change.
    pub async fn record(&self, event: AuditEvent) {
        if self.enabled_for(event.action, event.outcome) {
            self.sink.record(event).await;
        }
    }

    /// Records a failed authentication attempt.
    pub async fn login_failed(
        &self,
        grant: GrantType,
        username: Option<&Username>,
        client_id: &str,
        ip: Option<IpAddr>,
        failure: &AuthFailure,
    ) {
        let mut builder = AuditEvent::builder(AuditAction::UserLoginFailed)
            .outcome(AuditOutcome::Failure)
            .client_id(client_id)
            .ip_address(ip)
            .detail(failure.code());
        if let Some(username) = username {
            builder = builder.username(username);
        }
        self.emit(grant, builder.build()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, event: AuditEvent) {
            self.events.lock().await.push(event);
        }
    }

    fn bob() -> Username {
        Username::parse("bob").unwrap()
    }

    #[tokio::test]
    async fn test_machine_grants_are_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let logger = AuditLogger::new(sink.clone(), AuditConfig::default());

        let event = AuditEvent::builder(AuditAction::TokenIssued)
            .client_id("batch")
            .build();
        logger.emit(GrantType::ClientCredentials, event.clone()).await;
        assert!(sink.events.lock().await.is_empty());

        logger.emit(GrantType::Password, event).await;
        assert_eq!(sink.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_config_filters_failures() {
        let sink = Arc::new(RecordingSink::default());
        let config = AuditConfig {
            log_failed_auth: false,
            ..AuditConfig::default()
        };
        let logger = AuditLogger::new(sink.clone(), config);

        logger
            .login_failed(
                GrantType::Password,
                Some(&bob()),
                "portal",
                None,
                &AuthFailure::BadCredentials,
            )
            .await;
        assert!(sink.events.lock().await.is_empty());

        let event = AuditEvent::builder(AuditAction::UserLogin)
            .username(&bob())
            .build();
        logger.emit(GrantType::Password, event).await;
        let events = sink.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action.to_code(), "user.login");
    }

    #[tokio::test]
    async fn test_failed_login_detail_is_failure_code() {
        let sink = Arc::new(RecordingSink::default());
        let logger = AuditLogger::new(sink.clone(), AuditConfig::default());
        logger
            .login_failed(
                GrantType::Password,
                None,
                "portal",
                Some("10.1.2.3".parse().unwrap()),
                &AuthFailure::AccountNotFound,
            )
            .await;

        let events = sink.events.lock().await;
        assert_eq!(events[0].outcome, AuditOutcome::Failure);
        assert_eq!(events[0].detail.as_deref(), Some("account_not_found"));
        assert!(events[0].username.is_none());
    }
}
