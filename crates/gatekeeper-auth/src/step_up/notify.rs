//! Delivery of one-time codes.

use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde_json::json;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::NotifierConfig;
use crate::error::AuthError;
use crate::identity::ContactChannel;

type HmacSha256 = Hmac<Sha256>;

/// Outbound notification interface (email, secondary email, text).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends a templated message to `recipient` over `channel`.
    ///
    /// Implementations retry once on a server-side failure and otherwise
    /// propagate the error.
    async fn send(
        &self,
        channel: ContactChannel,
        recipient: &str,
        template_id: &str,
        parameters: &HashMap<String, String>,
    ) -> AuthResult<()>;
}

/// Posts notification requests as signed JSON to a delivery gateway.
pub struct WebhookNotificationSender {
    http_client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotificationSender {
    /// Creates a sender from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no webhook URL is configured or it does not
    /// parse.
    pub fn new(config: &NotifierConfig) -> AuthResult<Self> {
        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| AuthError::configuration("Missing notifier.webhook_url"))?;
        url::Url::parse(&url).map_err(|e| {
            AuthError::configuration(format!("Invalid webhook URL '{}': {}", url, e))
        })?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url,
            secret: config.webhook_secret.clone(),
        })
    }

    fn sign_payload(&self, payload: &str, secret: &str) -> AuthResult<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AuthError::configuration(format!("Invalid webhook secret: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn post(&self, payload: &str) -> AuthResult<StatusCode> {
        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.secret {
            let signature = self.sign_payload(payload, secret)?;
            request = request.header("X-Signature-256", format!("sha256={}", signature));
        }

        let response = request
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| AuthError::notification(format!("Webhook request failed: {}", e)))?;
        Ok(response.status())
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send(
        &self,
        channel: ContactChannel,
        recipient: &str,
        template_id: &str,
        parameters: &HashMap<String, String>,
    ) -> AuthResult<()> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();

        let payload = json!({
            "channel": channel,
            "recipient": recipient,
            "template_id": template_id,
            "data": parameters,
            "timestamp": timestamp
        });
        let payload = serde_json::to_string(&payload)
            .map_err(|e| AuthError::internal(format!("Failed to encode notification: {}", e)))?;

        let mut status = self.post(&payload).await?;
        if status.is_server_error() {
            tracing::warn!(
                channel = %channel,
                template_id,
                status = status.as_u16(),
                "Notification gateway failed, retrying once"
            );
            status = self.post(&payload).await?;
        }

        if status.is_success() {
            Ok(())
        } else {
            Err(AuthError::notification(format!(
                "Webhook returned {} for template '{}'",
                status, template_id
            )))
        }
    }
}
