//! Authentication configuration.
//!
//! Configuration types for lockout, step-up challenges, token issuance, the
//! verification side-channel, identity-source timeouts and account
//! inactivity. Values are deserialized by the embedding service; this module
//! only defines defaults and validation.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::SourceKind;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.lockout]
/// threshold = 5
///
/// [auth.step_up]
/// code_lifetime = "20m"
/// mfa_roles = ["admin", "supervisor"]
/// trusted_networks = ["10.0.0.0/8"]
///
/// [auth.verification]
/// enabled = true
/// base_url = "https://verify.internal.example.com"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Retry counting and lockout.
    pub lockout: LockoutConfig,

    /// Second-factor challenges.
    pub step_up: StepUpConfig,

    /// Webhook delivery of one-time codes.
    pub notifier: NotifierConfig,

    /// Access and refresh token issuance.
    pub tokens: TokenSettings,

    /// External token verification side-channel.
    pub verification: VerificationConfig,

    /// Identity source timeouts.
    pub sources: SourceConfig,

    /// Stale-account handling.
    pub inactivity: InactivityConfig,

    /// Audit configuration.
    pub audit: AuditConfig,
}

/// Retry counting and lockout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive bad attempts (passwords or step-up codes) before the
    /// account is locked at its owning source.
    pub threshold: u32,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self { threshold: 5 }
    }
}

/// Step-up (MFA) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StepUpConfig {
    /// How long a one-time code stays valid.
    #[serde(with = "humantime_serde")]
    pub code_lifetime: Duration,

    /// Roles that require a second factor.
    pub mfa_roles: Vec<String>,

    /// Networks (CIDR) exempt from step-up regardless of role.
    pub trusted_networks: Vec<String>,

    /// Notification template per channel.
    pub templates: StepUpTemplates,
}

impl Default for StepUpConfig {
    fn default() -> Self {
        Self {
            code_lifetime: Duration::from_secs(20 * 60), // 20 minutes
            mfa_roles: Vec::new(),
            trusted_networks: Vec::new(),
            templates: StepUpTemplates::default(),
        }
    }
}

/// Notification template identifiers used for step-up codes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StepUpTemplates {
    /// Template for the primary and secondary email channels.
    pub email: String,

    /// Template for the text-message channel.
    pub text: String,
}

impl Default for StepUpTemplates {
    fn default() -> Self {
        Self {
            email: "mfa-code-email".to_string(),
            text: "mfa-code-text".to_string(),
        }
    }
}

/// Webhook notifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Endpoint receiving notification requests. `None` leaves delivery to
    /// an embedder-provided sender.
    pub webhook_url: Option<String>,

    /// HMAC-SHA256 secret for the `X-Signature-256` header.
    pub webhook_secret: Option<String>,

    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_secret: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Token issuance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Issuer claim.
    pub issuer: String,

    /// Audience claim.
    pub audience: String,

    /// Signing algorithm. Supported: "RS256", "RS384", "ES384".
    pub algorithm: String,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            audience: "http://localhost:8080".to_string(),
            algorithm: "RS256".to_string(),
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

/// Verification side-channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// When disabled no side-channel call is ever made.
    pub enabled: bool,

    /// Base URL of the verification service.
    pub base_url: String,

    /// OAuth client id the verification service itself uses. Tokens issued to
    /// this client are never mirrored.
    pub client_id: String,

    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8081".to_string(),
            client_id: "token-verification".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Identity source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Timeout applied to sources without an explicit override.
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Per-source timeout overrides.
    pub timeouts: HashMap<SourceKind, humantime_serde::Serde<Duration>>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            timeouts: HashMap::new(),
        }
    }
}

impl SourceConfig {
    /// Returns the timeout for a source.
    #[must_use]
    pub fn timeout_for(&self, kind: SourceKind) -> Duration {
        self.timeouts
            .get(&kind)
            .map(|timeout| **timeout)
            .unwrap_or(self.default_timeout)
    }
}

/// Stale-account configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InactivityConfig {
    /// Accounts without a login for this long are disabled.
    #[serde(with = "humantime_serde")]
    pub max_inactivity: Duration,

    /// Head start given to a re-enabled account before it counts as stale
    /// again.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            max_inactivity: Duration::from_secs(90 * 24 * 3600), // 90 days
            grace_period: Duration::from_secs(7 * 24 * 3600),    // 7 days
        }
    }
}

/// Audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Log successful authentication events.
    pub log_successful_auth: bool,

    /// Log failed authentication events.
    pub log_failed_auth: bool,

    /// Log token operations (issue, refresh, revoke).
    pub log_token_operations: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_successful_auth: true,
            log_failed_auth: true,
            log_token_operations: true,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the lockout threshold is zero
    /// - a trusted network is not valid CIDR
    /// - the notifier webhook URL does not parse
    /// - the signing algorithm is not supported
    /// - the issuer is empty
    /// - the side-channel is enabled without a base URL
    /// - the grace period exceeds the inactivity window
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lockout.threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "lockout.threshold must be > 0".to_string(),
            ));
        }

        if self.step_up.code_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "step_up.code_lifetime must be > 0".to_string(),
            ));
        }

        for network in &self.step_up.trusted_networks {
            if network.parse::<ipnetwork::IpNetwork>().is_err() {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid trusted network: '{}'",
                    network
                )));
            }
        }

        if let Some(webhook_url) = &self.notifier.webhook_url
            && url::Url::parse(webhook_url).is_err()
        {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid notifier.webhook_url: '{}'",
                webhook_url
            )));
        }

        if self.tokens.issuer.is_empty() {
            return Err(ConfigError::Missing("tokens.issuer".to_string()));
        }

        match self.tokens.algorithm.as_str() {
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be RS256, RS384, or ES384",
                    other
                )));
            }
        }

        if self.verification.enabled {
            if self.verification.base_url.is_empty() {
                return Err(ConfigError::Missing("verification.base_url".to_string()));
            }
            if url::Url::parse(&self.verification.base_url).is_err() {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid verification.base_url: '{}'",
                    self.verification.base_url
                )));
            }
        }

        if self.inactivity.grace_period > self.inactivity.max_inactivity {
            return Err(ConfigError::InvalidValue(
                "inactivity.grace_period must not exceed inactivity.max_inactivity".to_string(),
            ));
        }

        Ok(())
    }
}
