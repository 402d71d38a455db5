//! Retry counter storage trait.
//!
//! Counters are keyed by normalized username and hold only the current count.
//! Concurrent failures for the same username must never lose an increment, so
//! the increment, the threshold comparison and the reset happen in one store
//! operation.

use async_trait::async_trait;

use crate::AuthResult;
use crate::identity::Username;

/// Result of recording one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    /// Count after this failure, before any threshold reset.
    pub attempts: u32,

    /// This failure reached the threshold; the stored count is now 0.
    pub threshold_reached: bool,
}

/// Storage trait for per-username retry counters.
///
/// # Implementations
///
/// - [`InMemoryRetryCounterStore`](crate::storage::memory::InMemoryRetryCounterStore)
/// - `gatekeeper-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait RetryCounterStore: Send + Sync {
    /// Atomically increments the counter for `username`.
    ///
    /// When the new count reaches `threshold` the stored count is reset to 0
    /// within the same operation and `threshold_reached` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable. Callers must treat this
    /// as a failed attempt.
    async fn record_failure(&self, username: &Username, threshold: u32)
    -> AuthResult<FailureRecord>;

    /// Resets the counter for `username` to 0. A missing counter is not an
    /// error.
    async fn reset(&self, username: &Username) -> AuthResult<()>;

    /// Returns the current count (0 if no counter exists).
    async fn current(&self, username: &Username) -> AuthResult<u32>;
}
