//! Whether a login needs a second factor.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::AuthResult;
use crate::config::StepUpConfig;
use crate::error::AuthError;

/// Step-up requirement rules.
///
/// A trusted origin network exempts every login. Otherwise a second factor is
/// required when the identity holds any configured MFA role.
#[derive(Debug, Clone, Default)]
pub struct StepUpPolicy {
    mfa_roles: BTreeSet<String>,
    trusted_networks: Vec<IpNetwork>,
}

impl StepUpPolicy {
    #[must_use]
    pub fn new(
        mfa_roles: impl IntoIterator<Item = String>,
        trusted_networks: Vec<IpNetwork>,
    ) -> Self {
        Self {
            mfa_roles: mfa_roles.into_iter().collect(),
            trusted_networks,
        }
    }

    /// Builds the policy from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a trusted network is not valid CIDR.
    pub fn from_config(config: &StepUpConfig) -> AuthResult<Self> {
        let trusted_networks = config
            .trusted_networks
            .iter()
            .map(|network| {
                network.parse::<IpNetwork>().map_err(|e| {
                    AuthError::configuration(format!(
                        "Invalid trusted network '{}': {}",
                        network, e
                    ))
                })
            })
            .collect::<AuthResult<Vec<_>>>()?;

        Ok(Self::new(config.mfa_roles.iter().cloned(), trusted_networks))
    }

    /// Returns `true` if the origin lies inside a trusted network.
    #[must_use]
    pub fn is_trusted(&self, origin: IpAddr) -> bool {
        self.trusted_networks
            .iter()
            .any(|network| network.contains(origin))
    }

    /// Returns `true` if a login with these roles from `origin` needs a
    /// second factor. An unknown origin is never trusted.
    #[must_use]
    pub fn is_required(&self, roles: &BTreeSet<String>, origin: Option<IpAddr>) -> bool {
        if origin.is_some_and(|ip| self.is_trusted(ip)) {
            return false;
        }
        !self.mfa_roles.is_disjoint(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> StepUpPolicy {
        StepUpPolicy::from_config(&StepUpConfig {
            mfa_roles: vec!["admin".to_string(), "supervisor".to_string()],
            trusted_networks: vec!["10.0.0.0/8".to_string(), "fd00::/8".to_string()],
            ..StepUpConfig::default()
        })
        .unwrap()
    }

    fn roles(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_role_intersection_requires_step_up() {
        let policy = policy();
        let outside: IpAddr = "203.0.113.7".parse().unwrap();
        assert!(policy.is_required(&roles(&["caseworker", "admin"]), Some(outside)));
        assert!(!policy.is_required(&roles(&["caseworker"]), Some(outside)));
        assert!(policy.is_required(&roles(&["supervisor"]), None));
    }

    #[test]
    fn test_trusted_network_exempts_any_role() {
        let policy = policy();
        assert!(!policy.is_required(&roles(&["admin"]), Some("10.20.30.40".parse().unwrap())));
        assert!(!policy.is_required(&roles(&["admin"]), Some("fd12::1".parse().unwrap())));
    }

    #[test]
    fn test_invalid_network_rejected() {
        let config = StepUpConfig {
            trusted_networks: vec!["10.0.0.0/33".to_string()],
            ..StepUpConfig::default()
        };
        assert!(StepUpPolicy::from_config(&config).is_err());
    }
}
