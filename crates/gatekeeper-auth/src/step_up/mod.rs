//! Step-up (second factor) authentication.
//!
//! - [`policy`] - decides whether a login needs a second factor
//! - [`challenge`] - one-time code creation, validation and resend
//! - [`notify`] - code delivery

pub mod challenge;
pub mod notify;
pub mod policy;

pub use challenge::{
    RetryableReason, StepUpChallenge, StepUpOwner, StepUpValidation, TerminalReason,
};
pub use notify::{NotificationSender, WebhookNotificationSender};
pub use policy::StepUpPolicy;
