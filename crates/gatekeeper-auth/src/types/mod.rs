//! Common types used across the authentication modules.
//!
//! ## Domain Types
//!
//! - [`Client`] - OAuth 2.0 client registration
//! - [`GrantType`] - Supported OAuth grant types
//! - [`LocalAccount`] - Native local account or shadow of an external identity
//! - [`StepUpToken`] - Live second-factor challenge

pub mod account;
pub mod client;
pub mod step_up_token;

pub use account::LocalAccount;
pub use client::{Client, ClientValidationError, GrantType};
pub use step_up_token::{StepUpKind, StepUpToken};
