//! Local account storage trait.
//!
//! Holds native local accounts and shadows of externally owned identities.
//! Update operations return `true` when a row was affected and `false` when
//! the username is unknown.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::identity::{IdentityRecord, Username};
use crate::types::LocalAccount;

/// Storage trait for local accounts and shadows.
#[async_trait]
pub trait LocalAccountStore: Send + Sync {
    /// Finds an account (native or shadow) by username.
    async fn find(&self, username: &Username) -> AuthResult<Option<LocalAccount>>;

    /// Finds every account whose verified email (primary or secondary)
    /// matches, case-insensitively.
    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<LocalAccount>>;

    /// Inserts a native account.
    ///
    /// # Errors
    ///
    /// Returns an error if the username is already taken.
    async fn create(&self, account: &LocalAccount) -> AuthResult<()>;

    /// Inserts or refreshes the shadow of an external identity, keyed by
    /// username.
    ///
    /// An existing shadow keeps its contacts, last login and authoritative
    /// flag. Returns `false` without writing if a native account owns the
    /// username.
    async fn upsert_shadow(&self, record: &IdentityRecord) -> AuthResult<bool>;

    /// Marks a shadow as authoritative (or not) for resolution. Returns
    /// `false` for native accounts, which are always authoritative.
    async fn set_authoritative(&self, username: &Username, authoritative: bool)
    -> AuthResult<bool>;

    /// Sets the locked flag.
    async fn set_locked(&self, username: &Username, locked: bool) -> AuthResult<bool>;

    /// Sets the enabled flag.
    async fn set_enabled(&self, username: &Username, enabled: bool) -> AuthResult<bool>;

    /// Replaces the password hash of a native account.
    async fn set_password_hash(&self, username: &Username, hash: &str) -> AuthResult<bool>;

    /// Stores a verified primary email.
    async fn set_verified_email(&self, username: &Username, email: &str) -> AuthResult<bool>;

    /// Sets the last login timestamp.
    async fn set_last_login(&self, username: &Username, at: OffsetDateTime) -> AuthResult<bool>;

    /// Lists enabled accounts whose last login is before `cutoff`.
    ///
    /// Accounts that never logged in are not listed.
    async fn find_inactive_since(&self, cutoff: OffsetDateTime) -> AuthResult<Vec<LocalAccount>>;
}
