//! OAuth 2.0 client domain types.
//!
//! Only the parts of a client registration the token lifecycle needs: its
//! identifier, allowed grants and token lifetime overrides.

use serde::{Deserialize, Serialize};

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Client Credentials flow (machine-to-machine).
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
    /// Resource Owner Password Credentials flow.
    Password,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
        }
    }

    /// Returns `true` for grants with no end user behind them.
    #[must_use]
    pub fn is_machine_to_machine(&self) -> bool {
        matches!(self, Self::ClientCredentials)
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// OAuth 2.0 client registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name.
    pub name: String,

    /// Grant types this client is allowed to use.
    pub grant_types: Vec<GrantType>,

    /// Whether this client is currently active.
    pub active: bool,

    /// Access token lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime: Option<i64>,

    /// Refresh token lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_lifetime: Option<i64>,
}

impl Client {
    /// Creates an active client allowed to use the given grants.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        name: impl Into<String>,
        grant_types: Vec<GrantType>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            grant_types,
            active: true,
            access_token_lifetime: None,
            refresh_token_lifetime: None,
        }
    }

    /// Validates the client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.name.is_empty() {
            return Err(ClientValidationError::EmptyName);
        }

        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        Ok(())
    }

    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Returns `true` if every grant of this client is machine-to-machine.
    #[must_use]
    pub fn is_machine_only(&self) -> bool {
        !self.grant_types.is_empty()
            && self
                .grant_types
                .iter()
                .all(GrantType::is_machine_to_machine)
    }

    /// Access token lifetime override in seconds.
    #[must_use]
    pub fn access_token_lifetime_secs(&self) -> Option<i64> {
        self.access_token_lifetime
    }

    /// Refresh token lifetime override in seconds.
    #[must_use]
    pub fn refresh_token_lifetime_secs(&self) -> Option<i64> {
        self.refresh_token_lifetime
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client validation.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// Client name cannot be empty.
    #[error("Client name cannot be empty")]
    EmptyName,

    /// At least one grant type is required.
    #[error("At least one grant type is required")]
    NoGrantTypes,
}
