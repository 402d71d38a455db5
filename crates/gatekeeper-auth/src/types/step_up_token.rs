//! Step-up token domain type.
//!
//! A step-up token pairs an opaque token handed to the client with a short
//! numeric code delivered out of band. Both are stored together and must be
//! invalidated together.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::identity::{ContactChannel, SourceKind, Username};

/// Purpose of a step-up token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepUpKind {
    /// Second authentication factor.
    Mfa,
}

impl StepUpKind {
    /// Returns the stored identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mfa => "mfa",
        }
    }
}

/// A live step-up challenge.
///
/// At most one token exists per `(username, kind)`. Re-creating a challenge
/// keeps `token` and replaces `code` and `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpToken {
    /// Opaque token returned to the client.
    pub token: String,

    /// One-time numeric code sent to the user.
    pub code: String,

    /// Purpose of the token.
    pub kind: StepUpKind,

    /// Owner of the challenge.
    pub username: Username,

    /// Source that owns the identity; bad codes lock the account there.
    pub source: SourceKind,

    /// Channel the code was delivered through.
    pub channel: ContactChannel,

    /// Expiry. The code is expired at exactly this instant.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the token (or its latest code) was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StepUpToken {
    /// Returns `true` if the token is expired at `now` (inclusive bound).
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}
