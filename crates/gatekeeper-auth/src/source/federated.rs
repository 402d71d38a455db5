//! Federated identities as seen through their local shadow rows.
//!
//! The SSO provider authenticates its users itself; by the time a federated
//! identity reaches this crate it arrives through
//! [`complete_federated_login`] and has a shadow row. Password logins against
//! federated accounts never succeed here.
//!
//! [`complete_federated_login`]: crate::orchestrator::AuthenticationOrchestrator::complete_federated_login

use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::source::IdentitySource;
use crate::storage::LocalAccountStore;
use crate::types::LocalAccount;

/// Federated identity source over the local shadow store.
pub struct FederatedShadowSource {
    accounts: Arc<dyn LocalAccountStore>,
}

impl FederatedShadowSource {
    pub fn new(accounts: Arc<dyn LocalAccountStore>) -> Self {
        Self { accounts }
    }

    fn is_federated(account: &LocalAccount) -> bool {
        account.shadow_of() == Some(SourceKind::Federated)
    }

    async fn shadow(&self, username: &Username) -> AuthResult<Option<LocalAccount>> {
        Ok(self
            .accounts
            .find(username)
            .await?
            .filter(Self::is_federated))
    }
}

#[async_trait]
impl IdentitySource for FederatedShadowSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Federated
    }

    async fn verify_password(&self, username: &Username, _password: &str) -> AuthResult<bool> {
        tracing::debug!(username = %username, "Password login attempted for federated identity");
        Ok(false)
    }

    async fn fetch_identity(&self, username: &Username) -> AuthResult<Option<IdentityRecord>> {
        Ok(self.shadow(username).await?.map(|account| account.record))
    }

    async fn lock(&self, username: &Username) -> AuthResult<()> {
        if self.shadow(username).await?.is_none() {
            return Err(AuthError::unknown_account(
                SourceKind::Federated,
                username.as_str(),
            ));
        }
        self.accounts.set_locked(username, true).await?;
        Ok(())
    }

    async fn change_password(&self, _username: &Username, _new_password: &str) -> AuthResult<()> {
        Err(AuthError::unsupported(SourceKind::Federated, "change_password"))
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<Username>> {
        Ok(self
            .accounts
            .find_by_email(email)
            .await?
            .into_iter()
            .filter(Self::is_federated)
            .map(|account| account.record.username)
            .collect())
    }
}
