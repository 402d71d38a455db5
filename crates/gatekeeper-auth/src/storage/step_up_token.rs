//! Step-up token storage trait.
//!
//! Tokens are addressed by `(kind, token)` for validation, by
//! `(kind, username)` to enforce one live token per user, and by
//! `(kind, code)` to avoid handing out a code that is already live.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::identity::Username;
use crate::types::{StepUpKind, StepUpToken};

/// Storage trait for step-up tokens.
#[async_trait]
pub trait StepUpTokenStore: Send + Sync {
    /// Inserts or replaces the token for `(token.kind, token.username)`.
    ///
    /// Any previous token of the same owner and kind, together with its
    /// code, no longer validates after this call.
    async fn upsert(&self, token: &StepUpToken) -> AuthResult<()>;

    /// Finds a token by its opaque value.
    async fn find_by_token(&self, kind: StepUpKind, token: &str)
    -> AuthResult<Option<StepUpToken>>;

    /// Finds the live token of a user, if any.
    async fn find_by_owner(
        &self,
        kind: StepUpKind,
        username: &Username,
    ) -> AuthResult<Option<StepUpToken>>;

    /// Returns `true` if `code` belongs to an unexpired token.
    async fn code_in_use(&self, kind: StepUpKind, code: &str) -> AuthResult<bool>;

    /// Deletes a token and its code together.
    ///
    /// Returns `true` if a token was deleted.
    async fn delete(&self, kind: StepUpKind, token: &str) -> AuthResult<bool>;

    /// Deletes every token expired at `now`.
    ///
    /// Returns the number of deleted tokens.
    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
