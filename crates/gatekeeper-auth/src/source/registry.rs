//! Dispatch table from [`SourceKind`] to [`IdentitySource`].
//!
//! Every outbound call goes through the registry so it carries the
//! source-specific timeout from [`SourceConfig`]. Timeouts and transport
//! failures surface as [`AuthError::SourceUnavailable`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::AuthResult;
use crate::config::SourceConfig;
use crate::error::AuthError;
use crate::identity::{IdentityRecord, SourceKind, Username};
use crate::source::IdentitySource;

/// Registered identity sources.
#[derive(Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceKind, Arc<dyn IdentitySource>>,
    config: SourceConfig,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: SourceConfig) -> Self {
        Self {
            sources: BTreeMap::new(),
            config,
        }
    }

    /// Registers a source under its own kind, replacing any previous one.
    #[must_use]
    pub fn register(mut self, source: Arc<dyn IdentitySource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    /// Returns `true` if a source is registered for `kind`.
    #[must_use]
    pub fn is_registered(&self, kind: SourceKind) -> bool {
        self.sources.contains_key(&kind)
    }

    /// Registered kinds in resolution priority order.
    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.sources.keys().copied()
    }

    /// Returns the source registered for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `SourceNotRegistered` if no source is registered.
    pub fn get(&self, kind: SourceKind) -> AuthResult<&Arc<dyn IdentitySource>> {
        self.sources
            .get(&kind)
            .ok_or(AuthError::SourceNotRegistered { source_kind: kind })
    }

    /// Verifies a password at `kind`.
    pub async fn verify_password(
        &self,
        kind: SourceKind,
        username: &Username,
        password: &str,
    ) -> AuthResult<bool> {
        let source = self.get(kind)?;
        self.call(kind, "verify_password", source.verify_password(username, password))
            .await
    }

    /// Fetches an identity from `kind`.
    pub async fn fetch_identity(
        &self,
        kind: SourceKind,
        username: &Username,
    ) -> AuthResult<Option<IdentityRecord>> {
        let source = self.get(kind)?;
        self.call(kind, "fetch_identity", source.fetch_identity(username))
            .await
    }

    /// Locks an account at `kind`.
    pub async fn lock(&self, kind: SourceKind, username: &Username) -> AuthResult<()> {
        let source = self.get(kind)?;
        self.call(kind, "lock", source.lock(username)).await
    }

    /// Changes a password at `kind`.
    pub async fn change_password(
        &self,
        kind: SourceKind,
        username: &Username,
        new_password: &str,
    ) -> AuthResult<()> {
        let source = self.get(kind)?;
        self.call(kind, "change_password", source.change_password(username, new_password))
            .await
    }

    /// Lists usernames at `kind` with a matching verified email.
    pub async fn find_by_email(&self, kind: SourceKind, email: &str) -> AuthResult<Vec<Username>> {
        let source = self.get(kind)?;
        self.call(kind, "find_by_email", source.find_by_email(email))
            .await
    }

    async fn call<T>(
        &self,
        kind: SourceKind,
        operation: &'static str,
        fut: impl Future<Output = AuthResult<T>>,
    ) -> AuthResult<T> {
        let limit = self.config.timeout_for(kind);
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(kind, e)),
            Err(_) => {
                tracing::warn!(
                    source = %kind,
                    operation,
                    timeout_ms = limit.as_millis() as u64,
                    "Identity source call timed out"
                );
                Err(AuthError::source_unavailable(
                    kind,
                    format!("{} timed out after {:?}", operation, limit),
                ))
            }
        }
    }
}

/// Errors describing the request pass through; everything else is a
/// transport or backend fault of the source.
fn classify(kind: SourceKind, error: AuthError) -> AuthError {
    match error {
        AuthError::SourceUnavailable { .. }
        | AuthError::UnsupportedOperation { .. }
        | AuthError::UnknownAccount { .. } => error,
        other => AuthError::source_unavailable(kind, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowSource {
        kind: SourceKind,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl IdentitySource for SlowSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn verify_password(&self, _username: &Username, password: &str) -> AuthResult<bool> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AuthError::storage("connection reset"));
            }
            Ok(password == "secret")
        }

        async fn fetch_identity(&self, username: &Username) -> AuthResult<Option<IdentityRecord>> {
            Ok(Some(IdentityRecord::new(username.clone(), self.kind)))
        }

        async fn lock(&self, username: &Username) -> AuthResult<()> {
            Err(AuthError::unknown_account(self.kind, username.as_str()))
        }

        async fn change_password(&self, _username: &Username, _new: &str) -> AuthResult<()> {
            Err(AuthError::unsupported(self.kind, "change_password"))
        }

        async fn find_by_email(&self, _email: &str) -> AuthResult<Vec<Username>> {
            Ok(Vec::new())
        }
    }

    fn registry_with(source: SlowSource, timeout: Duration) -> SourceRegistry {
        let mut config = SourceConfig::default();
        config.timeouts.insert(source.kind, timeout.into());
        SourceRegistry::new(config).register(Arc::new(source))
    }

    fn bob() -> Username {
        Username::parse("bob").unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_by_kind() {
        let registry = registry_with(
            SlowSource {
                kind: SourceKind::DirectoryA,
                delay: Duration::ZERO,
                fail: false,
            },
            Duration::from_secs(1),
        );

        assert!(registry.is_registered(SourceKind::DirectoryA));
        assert!(!registry.is_registered(SourceKind::DirectoryB));
        assert!(
            registry
                .verify_password(SourceKind::DirectoryA, &bob(), "secret")
                .await
                .unwrap()
        );
        assert!(matches!(
            registry.verify_password(SourceKind::DirectoryB, &bob(), "secret").await,
            Err(AuthError::SourceNotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_source_unavailable() {
        let registry = registry_with(
            SlowSource {
                kind: SourceKind::DirectoryB,
                delay: Duration::from_secs(5),
                fail: false,
            },
            Duration::from_millis(20),
        );

        let err = registry
            .verify_password(SourceKind::DirectoryB, &bob(), "secret")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::SourceUnavailable {
                source_kind: SourceKind::DirectoryB,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_backend_error_is_source_unavailable() {
        let registry = registry_with(
            SlowSource {
                kind: SourceKind::DirectoryA,
                delay: Duration::ZERO,
                fail: true,
            },
            Duration::from_secs(1),
        );

        let err = registry
            .verify_password(SourceKind::DirectoryA, &bob(), "secret")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_request_errors_pass_through() {
        let registry = registry_with(
            SlowSource {
                kind: SourceKind::Federated,
                delay: Duration::ZERO,
                fail: false,
            },
            Duration::from_secs(1),
        );

        assert!(matches!(
            registry.lock(SourceKind::Federated, &bob()).await,
            Err(AuthError::UnknownAccount { .. })
        ));
        assert!(matches!(
            registry
                .change_password(SourceKind::Federated, &bob(), "new")
                .await,
            Err(AuthError::UnsupportedOperation { .. })
        ));
    }
}
