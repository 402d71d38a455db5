//! Local account domain type.
//!
//! The local store holds two kinds of rows: native local accounts, which own
//! their password hash, and shadows of identities owned by an external source.
//! A shadow exists so lockout, login timestamps and linking emails have a
//! local home.

use serde::{Deserialize, Serialize};

use crate::identity::{IdentityRecord, SourceKind};

/// A row in the local account store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    /// Identity as known locally. For shadows, `record.source` is the owning
    /// external source.
    pub record: IdentityRecord,

    /// Argon2 PHC hash. Always `None` for shadows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    /// Whether the shadow is authoritative for resolution. Native accounts are
    /// always authoritative regardless of this flag.
    #[serde(default)]
    pub authoritative: bool,
}

impl LocalAccount {
    /// Creates a native local account.
    #[must_use]
    pub fn native(mut record: IdentityRecord, password_hash: impl Into<String>) -> Self {
        record.source = SourceKind::Local;
        Self {
            record,
            password_hash: Some(password_hash.into()),
            authoritative: true,
        }
    }

    /// Creates a non-authoritative shadow of an external identity.
    ///
    /// Contact channels are not copied; they are only set through explicit
    /// trust-on-login.
    #[must_use]
    pub fn shadow(record: &IdentityRecord) -> Self {
        let mut shadow = IdentityRecord::new(record.username.clone(), record.source);
        shadow.enabled = record.enabled;
        shadow.locked = record.locked;
        shadow.credentials_expired = record.credentials_expired;
        shadow.account_expired = record.account_expired;
        shadow.roles = record.roles.clone();
        Self {
            record: shadow,
            password_hash: None,
            authoritative: false,
        }
    }

    /// The external source this row shadows, if any.
    #[must_use]
    pub fn shadow_of(&self) -> Option<SourceKind> {
        self.record
            .source
            .is_external()
            .then_some(self.record.source)
    }

    /// Returns `true` for native local accounts.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.shadow_of().is_none()
    }

    /// Returns `true` if resolution should stop at this row.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.is_native() || self.authoritative
    }
}
