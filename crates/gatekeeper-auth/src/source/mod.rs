//! Identity sources.
//!
//! Every system that can confirm a username/password pair implements
//! [`IdentitySource`]. Sources are addressed by [`SourceKind`] through a single
//! [`SourceRegistry`]; adding a source means registering one more
//! implementation, not touching the dispatch code.
//!
//! Shipped implementations:
//!
//! - [`LocalCredentialSource`] - native local accounts with argon2 hashes
//! - [`FederatedShadowSource`] - federated identities known through their
//!   local shadow rows
//!
//! The two case-management directories are external collaborators that
//! plug into the same trait.

pub mod federated;
pub mod local;
pub mod registry;

pub use federated::FederatedShadowSource;
pub use local::LocalCredentialSource;
pub use registry::SourceRegistry;

use async_trait::async_trait;

use crate::AuthResult;
use crate::identity::{IdentityRecord, SourceKind, Username};

/// Capability interface of one identity source.
///
/// Transport failures must be returned as errors, never folded into
/// `Ok(false)` or `Ok(None)`: callers distinguish "unreachable" from "wrong
/// password" and "no such user".
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// The kind this source answers for.
    fn kind(&self) -> SourceKind;

    /// Checks a password. Unknown users yield `Ok(false)`.
    async fn verify_password(&self, username: &Username, password: &str) -> AuthResult<bool>;

    /// Fetches the identity owned by this source, if any.
    async fn fetch_identity(&self, username: &Username) -> AuthResult<Option<IdentityRecord>>;

    /// Locks the account at this source.
    async fn lock(&self, username: &Username) -> AuthResult<()>;

    /// Replaces the password at this source.
    async fn change_password(&self, username: &Username, new_password: &str) -> AuthResult<()>;

    /// Lists usernames whose verified email matches, case-insensitively.
    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<Username>>;
}
