//! Token lifecycle tracking.
//!
//! [`TokenLifecycleTracker`] issues signed access and refresh tokens for
//! authenticated identities and mirrors issuance, refresh and revocation to
//! the verification side-channel.
//!
//! # Usage
//!
//! ```ignore
//! use gatekeeper_auth::token::{TokenConfig, TokenLifecycleTracker};
//!
//! let config = TokenConfig::new("https://auth.example.com", "https://api.example.com");
//! let tracker = TokenLifecycleTracker::new(jwt_service, config)
//!     .with_verification_config(&auth_config.verification)?;
//!
//! let tokens = tracker.issue_access_token(&identity, &client, GrantType::Password).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::config::{TokenSettings, VerificationConfig};
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::token::jwt::{
    AccessTokenClaims, AccessTokenClaimsBuilder, JwtError, JwtService, REFRESH_TOKEN_USE,
    RefreshTokenClaims,
};
use crate::token::verification::{HttpVerificationChannel, VerificationChannel};
use crate::types::{Client, GrantType};

/// A signed access token. Immutable; a refresh produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedAccessToken {
    /// Signed JWT.
    pub value: String,

    /// Subject (username, or client id for client-credentials).
    pub subject: String,

    /// Authenticating identity source. `None` for client-credentials.
    pub auth_source: Option<SourceKind>,

    /// JWT ID.
    pub jwt_id: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Tokens returned from a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokens {
    /// The access token.
    pub access: IssuedAccessToken,

    /// Signed refresh token, absent for client-credentials grants and for
    /// clients not allowed to refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Configuration for the token lifecycle tracker.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Issuer (`iss`).
    pub issuer: String,

    /// Default audience (`aud`).
    pub audience: String,

    /// Default access token lifetime. Can be overridden per-client.
    pub access_token_lifetime: Duration,

    /// Default refresh token lifetime. Can be overridden per-client.
    pub refresh_token_lifetime: Duration,
}

impl TokenConfig {
    /// Creates a new token configuration with defaults.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            access_token_lifetime: Duration::hours(1),
            refresh_token_lifetime: Duration::days(30),
        }
    }

    /// Builds the configuration from deserialized settings.
    #[must_use]
    pub fn from_settings(settings: &TokenSettings) -> Self {
        Self::new(settings.issuer.clone(), settings.audience.clone())
            .with_access_token_lifetime(to_time(settings.access_token_lifetime))
            .with_refresh_token_lifetime(to_time(settings.refresh_token_lifetime))
    }

    /// Sets the access token lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Sets the refresh token lifetime.
    #[must_use]
    pub fn with_refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }
}

fn to_time(duration: std::time::Duration) -> Duration {
    Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
}

/// Issues tokens and mirrors their lifecycle to the verification service.
pub struct TokenLifecycleTracker {
    jwt_service: Arc<JwtService>,
    verification: Option<Arc<dyn VerificationChannel>>,
    verification_client_id: Option<String>,
    audit: AuditLogger,
    config: TokenConfig,
}

impl TokenLifecycleTracker {
    /// Creates a tracker with no verification side-channel and tracing audit.
    #[must_use]
    pub fn new(jwt_service: Arc<JwtService>, config: TokenConfig) -> Self {
        Self {
            jwt_service,
            verification: None,
            verification_client_id: None,
            audit: AuditLogger::tracing(),
            config,
        }
    }

    /// Enables the verification side-channel. Tokens issued to `own_client_id`
    /// (the verification service itself) are never mirrored.
    #[must_use]
    pub fn with_verification(
        mut self,
        channel: Arc<dyn VerificationChannel>,
        own_client_id: impl Into<String>,
    ) -> Self {
        self.verification = Some(channel);
        self.verification_client_id = Some(own_client_id.into());
        self
    }

    /// Attaches the HTTP verification side-channel when `config.enabled` is
    /// set. A disabled config leaves the tracker without a channel.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the channel cannot be built.
    pub fn with_verification_config(self, config: &VerificationConfig) -> AuthResult<Self> {
        if !config.enabled {
            tracing::debug!("Verification side-channel disabled");
            return Ok(self);
        }
        let channel = HttpVerificationChannel::new(config)?;
        Ok(self.with_verification(Arc::new(channel), config.client_id.clone()))
    }

    /// Replaces the audit logger.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Issues an access token, plus a refresh token when the client may use
    /// the refresh grant, for an authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for inactive clients and `Internal` if signing
    /// fails. Side-channel failures never fail issuance.
    pub async fn issue_access_token(
        &self,
        identity: &IdentityRecord,
        client: &Client,
        grant: GrantType,
    ) -> AuthResult<IssuedTokens> {
        ensure_active(client)?;

        let access_claims = self
            .access_claims(identity.username.as_str(), client)
            .auth_source(identity.source)
            .build();
        let refresh_token = if client.is_grant_type_allowed(GrantType::RefreshToken) {
            let claims = RefreshTokenClaims::for_access_token(
                &access_claims,
                identity.source,
                self.refresh_lifetime_secs(client),
            );
            Some(self.sign_refresh(&claims)?)
        } else {
            None
        };
        let access = self.sign_access(access_claims)?;

        self.audit
            .emit(
                grant,
                AuditEvent::builder(AuditAction::TokenIssued)
                    .username(&identity.username)
                    .client_id(&client.client_id)
                    .source(identity.source)
                    .detail(access.jwt_id.clone())
                    .build(),
            )
            .await;

        self.mirror_issue(&access).await;

        Ok(IssuedTokens {
            access,
            refresh_token,
        })
    }

    /// Issues an access token for a client-credentials grant. The client is
    /// the subject; no refresh token is issued and no audit event is emitted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client may not use client-credentials.
    pub async fn issue_client_token(&self, client: &Client) -> AuthResult<IssuedTokens> {
        ensure_active(client)?;
        if !client.is_grant_type_allowed(GrantType::ClientCredentials) {
            return Err(AuthError::invalid_client(
                "Client not authorized for client_credentials grant",
            ));
        }

        let claims = self.access_claims(&client.client_id, client).build();
        let access = self.sign_access(claims)?;

        self.mirror_issue(&access).await;

        Ok(IssuedTokens {
            access,
            refresh_token: None,
        })
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The new access token keeps the subject and auth source. The refresh
    /// token is rotated so it references the new access token, and the
    /// verification service is told which token id was replaced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client may not refresh and
    /// `InvalidGrant` if the refresh token is invalid, expired or bound to a
    /// different client.
    pub async fn refresh_access_token(
        &self,
        refresh_value: &str,
        client: &Client,
    ) -> AuthResult<IssuedTokens> {
        ensure_active(client)?;
        if !client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(AuthError::invalid_client(
                "Client not authorized for refresh_token grant",
            ));
        }

        let prior = self
            .jwt_service
            .decode::<RefreshTokenClaims>(refresh_value)
            .map_err(|e| match e {
                JwtError::Expired => AuthError::invalid_grant("Refresh token has expired"),
                other => AuthError::invalid_grant(format!("Invalid refresh token: {}", other)),
            })?
            .claims;

        if prior.token_use != REFRESH_TOKEN_USE {
            return Err(AuthError::invalid_grant("Not a refresh token"));
        }
        if prior.client_id != client.client_id {
            return Err(AuthError::invalid_grant(
                "Refresh token was issued to a different client",
            ));
        }

        let access_claims = self
            .access_claims(&prior.sub, client)
            .auth_source(prior.auth_source)
            .build();

        // Rotated token keeps the original expiry.
        let mut rotated =
            RefreshTokenClaims::for_access_token(&access_claims, prior.auth_source, 0);
        rotated.exp = prior.exp;

        let access = self.sign_access(access_claims)?;
        let refresh_token = self.sign_refresh(&rotated)?;

        let mut event = AuditEvent::builder(AuditAction::TokenRefreshed)
            .client_id(&client.client_id)
            .source(prior.auth_source)
            .detail(format!("{} replaces {}", access.jwt_id, prior.ati));
        if let Some(username) = Username::parse(&prior.sub) {
            event = event.username(&username);
        }
        self.audit.emit(GrantType::RefreshToken, event.build()).await;

        self.mirror_refresh(&prior.ati, &access).await;

        Ok(IssuedTokens {
            access,
            refresh_token: Some(refresh_token),
        })
    }

    /// Revokes a token at the verification service (logout or replacement).
    pub async fn revoke(&self, jwt_id: &str, client_id: &str) {
        self.audit
            .record(
                AuditEvent::builder(AuditAction::TokenRevoked)
                    .client_id(client_id)
                    .detail(jwt_id)
                    .build(),
            )
            .await;

        let Some(channel) = self.channel_for(client_id) else {
            return;
        };
        if let Err(e) = channel.token_revoked(jwt_id).await {
            tracing::warn!(jwt_id = %jwt_id, error = %e, "Failed to mirror token revocation");
        }
    }

    /// Returns the JWT service.
    #[must_use]
    pub fn jwt_service(&self) -> &Arc<JwtService> {
        &self.jwt_service
    }

    /// Returns the tracker configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn access_claims(
        &self,
        subject: &str,
        client: &Client,
    ) -> AccessTokenClaimsBuilder {
        let lifetime = client
            .access_token_lifetime_secs()
            .unwrap_or_else(|| self.config.access_token_lifetime.whole_seconds());
        AccessTokenClaims::builder(&self.config.issuer, subject, &client.client_id)
            .audience(vec![self.config.audience.clone()])
            .expires_in_seconds(lifetime)
    }

    fn refresh_lifetime_secs(&self, client: &Client) -> i64 {
        client
            .refresh_token_lifetime_secs()
            .unwrap_or_else(|| self.config.refresh_token_lifetime.whole_seconds())
    }

    fn sign_access(&self, claims: AccessTokenClaims) -> AuthResult<IssuedAccessToken> {
        let value = self
            .jwt_service
            .encode(&claims)
            .map_err(|e| AuthError::internal(format!("Failed to encode access token: {}", e)))?;

        Ok(IssuedAccessToken {
            value,
            subject: claims.sub,
            auth_source: claims.auth_source,
            jwt_id: claims.jti,
            client_id: claims.client_id,
            issued_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
        })
    }

    fn sign_refresh(&self, claims: &RefreshTokenClaims) -> AuthResult<String> {
        self.jwt_service
            .encode(claims)
            .map_err(|e| AuthError::internal(format!("Failed to encode refresh token: {}", e)))
    }

    fn channel_for(&self, client_id: &str) -> Option<&Arc<dyn VerificationChannel>> {
        let channel = self.verification.as_ref()?;
        if self.verification_client_id.as_deref() == Some(client_id) {
            return None;
        }
        Some(channel)
    }

    async fn mirror_issue(&self, access: &IssuedAccessToken) {
        let Some(channel) = self.channel_for(&access.client_id) else {
            return;
        };
        if let Err(e) = channel.token_issued(&access.jwt_id, &access.value).await {
            tracing::warn!(
                jwt_id = %access.jwt_id,
                client_id = %access.client_id,
                error = %e,
                "Failed to mirror issued token"
            );
        }
    }

    async fn mirror_refresh(&self, prior_jwt_id: &str, access: &IssuedAccessToken) {
        let Some(channel) = self.channel_for(&access.client_id) else {
            return;
        };
        if let Err(e) = channel.token_refreshed(prior_jwt_id, &access.value).await {
            tracing::warn!(
                prior_jwt_id = %prior_jwt_id,
                jwt_id = %access.jwt_id,
                error = %e,
                "Failed to mirror token refresh"
            );
        }
    }
}

fn ensure_active(client: &Client) -> AuthResult<()> {
    if client.active {
        Ok(())
    } else {
        Err(AuthError::invalid_client(format!(
            "Client '{}' is inactive",
            client.client_id
        )))
    }
}

fn timestamp(unix: i64) -> AuthResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| AuthError::internal(format!("Invalid token timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::{SigningAlgorithm, SigningKeyPair};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Issued(String),
        Refreshed(String),
        Revoked(String),
    }

    #[derive(Default)]
    struct MockVerificationChannel {
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    #[async_trait]
    impl VerificationChannel for MockVerificationChannel {
        async fn token_issued(&self, jwt_id: &str, _token_value: &str) -> AuthResult<()> {
            self.calls.lock().await.push(Call::Issued(jwt_id.to_string()));
            if self.fail {
                return Err(AuthError::verification_channel("connection refused"));
            }
            Ok(())
        }

        async fn token_refreshed(&self, prior_jwt_id: &str, _new: &str) -> AuthResult<()> {
            self.calls
                .lock()
                .await
                .push(Call::Refreshed(prior_jwt_id.to_string()));
            Ok(())
        }

        async fn token_revoked(&self, jwt_id: &str) -> AuthResult<()> {
            self.calls.lock().await.push(Call::Revoked(jwt_id.to_string()));
            Ok(())
        }
    }

    fn create_test_tracker(channel: Arc<MockVerificationChannel>) -> TokenLifecycleTracker {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let jwt = Arc::new(JwtService::new(key_pair, "https://auth.example.com"));
        let config = TokenConfig::new("https://auth.example.com", "https://api.example.com");
        TokenLifecycleTracker::new(jwt, config).with_verification(channel, "token-verification")
    }

    fn portal() -> Client {
        Client::new(
            "portal",
            "Case Portal",
            vec![GrantType::Password, GrantType::RefreshToken],
        )
    }

    fn bob() -> IdentityRecord {
        IdentityRecord::new(Username::parse("bob").unwrap(), SourceKind::DirectoryA)
    }

    #[tokio::test]
    async fn test_issue_mirrors_jwt_id() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel.clone());

        let tokens = tracker
            .issue_access_token(&bob(), &portal(), GrantType::Password)
            .await
            .unwrap();

        assert_eq!(tokens.access.subject, "BOB");
        assert_eq!(tokens.access.auth_source, Some(SourceKind::DirectoryA));
        assert!(tokens.refresh_token.is_some());
        assert_eq!(
            *channel.calls.lock().await,
            vec![Call::Issued(tokens.access.jwt_id.clone())]
        );
    }

    #[tokio::test]
    async fn test_issue_survives_side_channel_failure() {
        let channel = Arc::new(MockVerificationChannel {
            fail: true,
            ..Default::default()
        });
        let tracker = create_test_tracker(channel.clone());

        let result = tracker
            .issue_access_token(&bob(), &portal(), GrantType::Password)
            .await;
        assert!(result.is_ok());
        assert_eq!(channel.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_verification_client_is_not_mirrored() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel.clone());
        let own = Client::new(
            "token-verification",
            "Verification",
            vec![GrantType::ClientCredentials],
        );

        let tokens = tracker.issue_client_token(&own).await.unwrap();
        assert_eq!(tokens.access.subject, "token-verification");
        assert!(tokens.access.auth_source.is_none());
        assert!(tokens.refresh_token.is_none());

        tracker.revoke(&tokens.access.jwt_id, "token-verification").await;
        assert!(channel.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_preserves_subject_and_references_prior_id() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel.clone());
        let client = portal();

        let first = tracker
            .issue_access_token(&bob(), &client, GrantType::Password)
            .await
            .unwrap();
        let refreshed = tracker
            .refresh_access_token(first.refresh_token.as_deref().unwrap(), &client)
            .await
            .unwrap();

        assert_eq!(refreshed.access.subject, first.access.subject);
        assert_eq!(refreshed.access.auth_source, first.access.auth_source);
        assert_ne!(refreshed.access.jwt_id, first.access.jwt_id);

        let calls = channel.calls.lock().await;
        assert_eq!(calls[1], Call::Refreshed(first.access.jwt_id.clone()));

        let rotated = tracker
            .jwt_service()
            .decode::<RefreshTokenClaims>(refreshed.refresh_token.as_deref().unwrap())
            .unwrap()
            .claims;
        assert_eq!(rotated.ati, refreshed.access.jwt_id);
    }

    #[tokio::test]
    async fn test_refresh_rejects_other_client() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel);

        let tokens = tracker
            .issue_access_token(&bob(), &portal(), GrantType::Password)
            .await
            .unwrap();
        let other = Client::new("other", "Other", vec![GrantType::RefreshToken]);

        let err = tracker
            .refresh_access_token(tokens.refresh_token.as_deref().unwrap(), &other)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel);
        let client = portal();

        let tokens = tracker
            .issue_access_token(&bob(), &client, GrantType::Password)
            .await
            .unwrap();
        let err = tracker
            .refresh_access_token(&tokens.access.value, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_refresh_requires_grant() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel);
        let client = Client::new("kiosk", "Kiosk", vec![GrantType::Password]);

        let tokens = tracker
            .issue_access_token(&bob(), &client, GrantType::Password)
            .await
            .unwrap();
        assert!(tokens.refresh_token.is_none());

        let err = tracker
            .refresh_access_token("anything", &client)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));
    }

    #[tokio::test]
    async fn test_revoke_is_mirrored() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel.clone());

        tracker.revoke("jti-9", "portal").await;
        assert_eq!(
            *channel.calls.lock().await,
            vec![Call::Revoked("jti-9".to_string())]
        );
    }

    #[tokio::test]
    async fn test_inactive_client_rejected() {
        let channel = Arc::new(MockVerificationChannel::default());
        let tracker = create_test_tracker(channel.clone());
        let mut client = portal();
        client.active = false;

        let err = tracker
            .issue_access_token(&bob(), &client, GrantType::Password)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));
        assert!(channel.calls.lock().await.is_empty());
    }

    #[test]
    fn test_token_config_from_settings() {
        let settings = TokenSettings {
            access_token_lifetime: std::time::Duration::from_secs(600),
            ..TokenSettings::default()
        };
        let config = TokenConfig::from_settings(&settings);
        assert_eq!(config.access_token_lifetime, Duration::minutes(10));
        assert_eq!(config.refresh_token_lifetime, Duration::days(30));
    }
}
