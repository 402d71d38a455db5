//! Local credential source backed by the local account store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::password;
use crate::source::IdentitySource;
use crate::storage::LocalAccountStore;
use crate::types::LocalAccount;

/// Native local accounts. Shadow rows in the same store are invisible here.
pub struct LocalCredentialSource {
    accounts: Arc<dyn LocalAccountStore>,
}

impl LocalCredentialSource {
    pub fn new(accounts: Arc<dyn LocalAccountStore>) -> Self {
        Self { accounts }
    }

    async fn native(&self, username: &Username) -> AuthResult<Option<LocalAccount>> {
        Ok(self
            .accounts
            .find(username)
            .await?
            .filter(LocalAccount::is_native))
    }
}

#[async_trait]
impl IdentitySource for LocalCredentialSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn verify_password(&self, username: &Username, password: &str) -> AuthResult<bool> {
        let Some(hash) = self
            .native(username)
            .await?
            .and_then(|account| account.password_hash)
        else {
            return Ok(false);
        };

        password::verify_password(password, &hash).map_err(|e| {
            AuthError::internal(format!("Malformed password hash for {}: {}", username, e))
        })
    }

    async fn fetch_identity(&self, username: &Username) -> AuthResult<Option<IdentityRecord>> {
        Ok(self.native(username).await?.map(|account| account.record))
    }

    async fn lock(&self, username: &Username) -> AuthResult<()> {
        if self.native(username).await?.is_none() {
            return Err(AuthError::unknown_account(SourceKind::Local, username.as_str()));
        }
        self.accounts.set_locked(username, true).await?;
        Ok(())
    }

    async fn change_password(&self, username: &Username, new_password: &str) -> AuthResult<()> {
        let hash = password::hash_password(new_password)
            .map_err(|e| AuthError::internal(format!("Failed to hash password: {}", e)))?;

        if self.accounts.set_password_hash(username, &hash).await? {
            Ok(())
        } else {
            Err(AuthError::unknown_account(SourceKind::Local, username.as_str()))
        }
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<Username>> {
        Ok(self
            .accounts
            .find_by_email(email)
            .await?
            .into_iter()
            .filter(LocalAccount::is_native)
            .map(|account| account.record.username)
            .collect())
    }
}
