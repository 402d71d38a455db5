//! Verification side-channel client.
//!
//! The verification service keeps its own record of every issued token id so
//! tokens can be invalidated out of band. Calls are advisory: the token
//! service logs failures and never fails issuance because of them.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `POST /token?authJwtId={id}` with the token value as body
//! - `POST /token/refresh?accessJwtId={id}` with the new token value as body
//! - `DELETE /token?authJwtId={id}`

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::AuthResult;
use crate::config::VerificationConfig;
use crate::error::AuthError;

/// Outbound interface of the verification service.
#[async_trait]
pub trait VerificationChannel: Send + Sync {
    /// Mirrors a newly issued token.
    async fn token_issued(&self, jwt_id: &str, token_value: &str) -> AuthResult<()>;

    /// Reports that the token `prior_jwt_id` has been replaced by
    /// `new_token_value`.
    async fn token_refreshed(&self, prior_jwt_id: &str, new_token_value: &str) -> AuthResult<()>;

    /// Removes the mirror of a token.
    async fn token_revoked(&self, jwt_id: &str) -> AuthResult<()>;
}

/// HTTP implementation of [`VerificationChannel`].
pub struct HttpVerificationChannel {
    http_client: Client,
    base_url: String,
}

impl HttpVerificationChannel {
    /// Creates a client for the configured verification service.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: &VerificationConfig) -> AuthResult<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            AuthError::configuration(format!(
                "Invalid verification base URL '{}': {}",
                config.base_url, e
            ))
        })?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, operation: &str, request: RequestBuilder) -> AuthResult<()> {
        let response = request.send().await.map_err(|e| {
            AuthError::verification_channel(format!("{} request failed: {}", operation, e))
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AuthError::verification_channel(format!(
                "{} returned {}: {}",
                operation, status, body
            )))
        }
    }
}

#[async_trait]
impl VerificationChannel for HttpVerificationChannel {
    async fn token_issued(&self, jwt_id: &str, token_value: &str) -> AuthResult<()> {
        let request = self
            .http_client
            .post(self.endpoint("/token"))
            .query(&[("authJwtId", jwt_id)])
            .header("Content-Type", "text/plain")
            .body(token_value.to_string());
        self.execute("token issue", request).await
    }

    async fn token_refreshed(&self, prior_jwt_id: &str, new_token_value: &str) -> AuthResult<()> {
        let request = self
            .http_client
            .post(self.endpoint("/token/refresh"))
            .query(&[("accessJwtId", prior_jwt_id)])
            .header("Content-Type", "text/plain")
            .body(new_token_value.to_string());
        self.execute("token refresh", request).await
    }

    async fn token_revoked(&self, jwt_id: &str) -> AuthResult<()> {
        let request = self
            .http_client
            .delete(self.endpoint("/token"))
            .query(&[("authJwtId", jwt_id)]);
        self.execute("token revoke", request).await
    }
}
