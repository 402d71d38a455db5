//! Cross-source account discovery.
//!
//! The same person may hold accounts in several sources that share a verified
//! email. [`CrossSourceAccountLinker::discover`] lists them as
//! `(source, username)` pairs so a consent or account-selection flow can let
//! the user pick one. Accounts are never merged.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::resolver::AccountResolver;

/// One account found for an identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub source: SourceKind,
    pub username: Username,
}

/// Discovers the accounts belonging to one identity across sources.
pub struct CrossSourceAccountLinker {
    resolver: Arc<AccountResolver>,
}

impl CrossSourceAccountLinker {
    pub fn new(resolver: Arc<AccountResolver>) -> Self {
        Self { resolver }
    }

    /// Lists every account sharing a verified email with `identity`,
    /// including `identity` itself, ordered by source then username.
    ///
    /// Sources that cannot be reached are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local account store fails.
    pub async fn discover(&self, identity: &IdentityRecord) -> AuthResult<Vec<LinkedAccount>> {
        let mut linked = BTreeSet::new();
        linked.insert(LinkedAccount {
            source: identity.source,
            username: identity.username.clone(),
        });

        let contacts = &identity.contacts;
        let emails: BTreeSet<String> = [
            contacts.email.as_deref(),
            contacts.secondary_email.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .collect();

        let registry = self.resolver.registry();
        for email in &emails {
            // Shadows are linked under the source they mirror.
            for account in self.resolver.accounts().find_by_email(email).await? {
                linked.insert(LinkedAccount {
                    source: account.record.source,
                    username: account.record.username,
                });
            }

            for kind in registry.kinds() {
                match registry.find_by_email(kind, email).await {
                    Ok(usernames) => {
                        linked.extend(
                            usernames
                                .into_iter()
                                .map(|username| LinkedAccount { source: kind, username }),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            source = %kind,
                            error = %e,
                            "Skipping unreachable source during account linking"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            username = %identity.username,
            linked = linked.len(),
            "Linked accounts discovered"
        );
        Ok(linked.into_iter().collect())
    }
}
