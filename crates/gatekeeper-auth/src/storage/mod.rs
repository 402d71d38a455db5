//! Storage traits for authentication state.
//!
//! This module defines storage interfaces for:
//!
//! - Per-username retry counters
//! - Step-up (MFA) tokens and codes
//! - Local accounts and shadows of external identities
//!
//! # Implementations
//!
//! - [`memory`] - in-process stores for tests and single-node deployments
//! - `gatekeeper-auth-postgres` - PostgreSQL storage backend

pub mod account;
pub mod memory;
pub mod retry_counter;
pub mod step_up_token;

pub use account::LocalAccountStore;
pub use memory::{InMemoryLocalAccountStore, InMemoryRetryCounterStore, InMemoryStepUpTokenStore};
pub use retry_counter::{FailureRecord, RetryCounterStore};
pub use step_up_token::StepUpTokenStore;
