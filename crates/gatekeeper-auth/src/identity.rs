//! Identity model shared by every identity source.
//!
//! An [`IdentityRecord`] is the canonical view of one account as reported by
//! its owning source. Sources are distinguished by [`SourceKind`] rather than by
//! separate record types, so every component can treat identities uniformly.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Source Kind
// =============================================================================

/// The identity sources an account can belong to.
///
/// The declaration order is the resolution priority used by
/// [`AccountResolver`](crate::resolver::AccountResolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The local credential store.
    Local,
    /// Legacy case-management directory A.
    DirectoryA,
    /// Legacy case-management directory B.
    DirectoryB,
    /// Federated SSO provider.
    Federated,
}

impl SourceKind {
    /// All source kinds in resolution priority order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Local,
        SourceKind::DirectoryA,
        SourceKind::DirectoryB,
        SourceKind::Federated,
    ];

    /// Returns the stable identifier used in tokens and audit events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::DirectoryA => "directory_a",
            Self::DirectoryB => "directory_b",
            Self::Federated => "federated",
        }
    }

    /// Parses the identifier produced by [`SourceKind::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Returns `true` for sources whose accounts are mirrored by a local shadow.
    #[must_use]
    pub fn is_external(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Username
// =============================================================================

/// A case-normalized username.
///
/// Usernames are trimmed and upper-cased so that `bob`, `Bob ` and `BOB` all
/// address the same account and the same retry counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Normalizes a raw principal. Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_uppercase()))
        }
    }

    /// Returns the normalized username.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Contact Channels
// =============================================================================

/// A channel a one-time code can be delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    /// The verified primary email address.
    Email,
    /// The verified secondary email address.
    SecondaryEmail,
    /// Text message to the verified mobile number.
    Text,
}

impl ContactChannel {
    /// Delivery preference order for step-up codes.
    pub const PREFERENCE: [ContactChannel; 3] = [
        ContactChannel::Email,
        ContactChannel::SecondaryEmail,
        ContactChannel::Text,
    ];

    /// Returns the channel identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::SecondaryEmail => "secondary_email",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ContactChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified contact details of an identity.
///
/// Only verified values are ever stored here; an unverified address is
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactChannels {
    /// Verified primary email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Verified mobile number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,

    /// Verified secondary email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_email: Option<String>,
}

impl ContactChannels {
    /// Returns the address for a channel, if verified.
    #[must_use]
    pub fn address(&self, channel: ContactChannel) -> Option<&str> {
        match channel {
            ContactChannel::Email => self.email.as_deref(),
            ContactChannel::SecondaryEmail => self.secondary_email.as_deref(),
            ContactChannel::Text => self.mobile.as_deref(),
        }
    }

    /// Picks the first verified channel in preference order.
    #[must_use]
    pub fn preferred(&self) -> Option<(ContactChannel, &str)> {
        ContactChannel::PREFERENCE
            .into_iter()
            .find_map(|channel| self.address(channel).map(|addr| (channel, addr)))
    }

    /// Returns `true` if no channel is verified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferred().is_none()
    }
}

// =============================================================================
// Identity Record
// =============================================================================

/// Canonical view of one account as reported by its owning source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Normalized username, unique within the source.
    pub username: Username,

    /// The source that owns this identity.
    pub source: SourceKind,

    /// Disabled accounts cannot authenticate.
    pub enabled: bool,

    /// Locked accounts cannot authenticate until unlocked at the source.
    pub locked: bool,

    /// The password must be changed before the next login succeeds.
    pub credentials_expired: bool,

    /// The account itself has expired.
    pub account_expired: bool,

    /// Roles granted to the identity.
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Verified contact channels.
    #[serde(default)]
    pub contacts: ContactChannels,

    /// Last successful login.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
}

impl IdentityRecord {
    /// Creates an enabled, unlocked identity with no roles or contacts.
    #[must_use]
    pub fn new(username: Username, source: SourceKind) -> Self {
        Self {
            username,
            source,
            enabled: true,
            locked: false,
            credentials_expired: false,
            account_expired: false,
            roles: BTreeSet::new(),
            contacts: ContactChannels::default(),
            last_login_at: None,
        }
    }

    /// Creates a new identity builder.
    #[must_use]
    pub fn builder(username: Username, source: SourceKind) -> IdentityRecordBuilder {
        IdentityRecordBuilder {
            record: Self::new(username, source),
        }
    }

    /// Returns `true` if the identity has any of the given roles.
    #[must_use]
    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a String>) -> bool {
        roles.into_iter().any(|role| self.roles.contains(role))
    }
}

/// Builder for [`IdentityRecord`].
pub struct IdentityRecordBuilder {
    record: IdentityRecord,
}

impl IdentityRecordBuilder {
    /// Sets the enabled flag.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.record.enabled = enabled;
        self
    }

    /// Sets the locked flag.
    #[must_use]
    pub fn locked(mut self, locked: bool) -> Self {
        self.record.locked = locked;
        self
    }

    /// Sets the credentials-expired flag.
    #[must_use]
    pub fn credentials_expired(mut self, expired: bool) -> Self {
        self.record.credentials_expired = expired;
        self
    }

    /// Sets the account-expired flag.
    #[must_use]
    pub fn account_expired(mut self, expired: bool) -> Self {
        self.record.account_expired = expired;
        self
    }

    /// Adds a granted role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.record.roles.insert(role.into());
        self
    }

    /// Sets the verified primary email.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.record.contacts.email = Some(email.into());
        self
    }

    /// Sets the verified secondary email.
    #[must_use]
    pub fn secondary_email(mut self, email: impl Into<String>) -> Self {
        self.record.contacts.secondary_email = Some(email.into());
        self
    }

    /// Sets the verified mobile number.
    #[must_use]
    pub fn mobile(mut self, mobile: impl Into<String>) -> Self {
        self.record.contacts.mobile = Some(mobile.into());
        self
    }

    /// Sets the last login timestamp.
    #[must_use]
    pub fn last_login_at(mut self, at: OffsetDateTime) -> Self {
        self.record.last_login_at = Some(at);
        self
    }

    /// Builds the record.
    #[must_use]
    pub fn build(self) -> IdentityRecord {
        self.record
    }
}
