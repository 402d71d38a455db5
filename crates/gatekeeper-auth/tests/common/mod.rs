//! Shared fixtures for the integration tests.
//!
//! Wires the full authentication stack over in-memory stores, two scripted
//! directories, a recording notifier and a recording audit sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gatekeeper_auth::audit::{AuditAction, AuditEvent, AuditLogger, AuditSink};
use gatekeeper_auth::config::{AuditConfig, LockoutConfig, SourceConfig, StepUpConfig};
use gatekeeper_auth::error::AuthError;
use gatekeeper_auth::identity::{ContactChannel, IdentityRecord, SourceKind, Username};
use gatekeeper_auth::lockout::RetryLockoutTracker;
use gatekeeper_auth::orchestrator::{AuthContext, AuthRequest, AuthenticationOrchestrator};
use gatekeeper_auth::password::hash_password;
use gatekeeper_auth::resolver::AccountResolver;
use gatekeeper_auth::source::{
    FederatedShadowSource, IdentitySource, LocalCredentialSource, SourceRegistry,
};
use gatekeeper_auth::step_up::{NotificationSender, StepUpChallenge};
use gatekeeper_auth::storage::{
    InMemoryLocalAccountStore, InMemoryRetryCounterStore, InMemoryStepUpTokenStore,
    LocalAccountStore,
};
use gatekeeper_auth::types::{GrantType, LocalAccount};
use gatekeeper_auth::AuthResult;

pub const THRESHOLD: u32 = 3;
pub const MFA_ROLE: &str = "clinician";
pub const TRUSTED_NETWORK: &str = "10.0.0.0/8";
pub const CLIENT_ID: &str = "portal";

pub fn name(raw: &str) -> Username {
    Username::parse(raw).unwrap()
}

pub fn context() -> AuthContext {
    AuthContext::new(CLIENT_ID, GrantType::Password)
}

pub fn request(username: &str, password: &str) -> AuthRequest {
    AuthRequest::new(username, password, context())
}

// ============================================================================
// Scripted directory
// ============================================================================

/// A legacy directory holding identities and plain-text passwords in memory.
pub struct ScriptedDirectory {
    kind: SourceKind,
    entries: Mutex<HashMap<Username, (IdentityRecord, String)>>,
    reachable: AtomicBool,
}

impl ScriptedDirectory {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn add(&self, mut record: IdentityRecord, password: &str) {
        record.source = self.kind;
        self.entries
            .lock()
            .unwrap()
            .insert(record.username.clone(), (record, password.to_string()));
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_locked(&self, username: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(&name(username))
            .is_some_and(|(record, _)| record.locked)
    }

    pub fn unlock(&self, username: &str) {
        if let Some((record, _)) = self.entries.lock().unwrap().get_mut(&name(username)) {
            record.locked = false;
        }
    }

    fn ensure_reachable(&self) -> AuthResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::source_unavailable(self.kind, "connection refused"))
        }
    }
}

#[async_trait]
impl IdentitySource for ScriptedDirectory {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn verify_password(&self, username: &Username, password: &str) -> AuthResult<bool> {
        self.ensure_reachable()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(username)
            .is_some_and(|(_, stored)| stored == password))
    }

    async fn fetch_identity(&self, username: &Username) -> AuthResult<Option<IdentityRecord>> {
        self.ensure_reachable()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(username)
            .map(|(record, _)| record.clone()))
    }

    async fn lock(&self, username: &Username) -> AuthResult<()> {
        self.ensure_reachable()?;
        match self.entries.lock().unwrap().get_mut(username) {
            Some((record, _)) => {
                record.locked = true;
                Ok(())
            }
            None => Err(AuthError::unknown_account(self.kind, username.as_str())),
        }
    }

    async fn change_password(&self, username: &Username, new_password: &str) -> AuthResult<()> {
        self.ensure_reachable()?;
        match self.entries.lock().unwrap().get_mut(username) {
            Some((_, stored)) => {
                *stored = new_password.to_string();
                Ok(())
            }
            None => Err(AuthError::unknown_account(self.kind, username.as_str())),
        }
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Vec<Username>> {
        self.ensure_reachable()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|(record, _)| {
                record
                    .contacts
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|(record, _)| record.username.clone())
            .collect())
    }
}

// ============================================================================
// Recording collaborators
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentCode {
    pub channel: ContactChannel,
    pub recipient: String,
    pub template_id: String,
    pub code: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentCode>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|sent| sent.code.clone())
            .unwrap()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        channel: ContactChannel,
        recipient: &str,
        template_id: &str,
        parameters: &HashMap<String, String>,
    ) -> AuthResult<()> {
        self.sent.lock().unwrap().push(SentCode {
            channel,
            recipient: recipient.to_string(),
            template_id: template_id.to_string(),
            code: parameters.get("code").cloned().unwrap_or_default(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    pub fn actions(&self) -> Vec<AuditAction> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.action)
            .collect()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub accounts: Arc<InMemoryLocalAccountStore>,
    pub counters: Arc<InMemoryRetryCounterStore>,
    pub tokens: Arc<InMemoryStepUpTokenStore>,
    pub directory_a: Arc<ScriptedDirectory>,
    pub directory_b: Arc<ScriptedDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<RecordingSink>,
    pub resolver: Arc<AccountResolver>,
    pub tracker: Arc<RetryLockoutTracker>,
    pub step_up: Arc<StepUpChallenge>,
    pub orchestrator: AuthenticationOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        let accounts = Arc::new(InMemoryLocalAccountStore::new());
        let counters = Arc::new(InMemoryRetryCounterStore::new());
        let tokens = Arc::new(InMemoryStepUpTokenStore::new());
        let directory_a = Arc::new(ScriptedDirectory::new(SourceKind::DirectoryA));
        let directory_b = Arc::new(ScriptedDirectory::new(SourceKind::DirectoryB));
        let notifier = Arc::new(RecordingNotifier::default());
        let sink = Arc::new(RecordingSink::default());
        let audit = AuditLogger::new(sink.clone(), AuditConfig::default());

        let registry = Arc::new(
            SourceRegistry::new(SourceConfig::default())
                .register(Arc::new(LocalCredentialSource::new(accounts.clone())))
                .register(directory_a.clone())
                .register(directory_b.clone())
                .register(Arc::new(FederatedShadowSource::new(accounts.clone()))),
        );

        let resolver = Arc::new(AccountResolver::new(accounts.clone(), registry.clone()));
        let tracker = Arc::new(
            RetryLockoutTracker::new(
                counters.clone(),
                accounts.clone(),
                registry,
                &LockoutConfig {
                    threshold: THRESHOLD,
                },
            )
            .with_audit(audit.clone()),
        );
        let step_up = Arc::new(
            StepUpChallenge::new(
                tokens.clone(),
                notifier.clone(),
                tracker.clone(),
                &StepUpConfig {
                    mfa_roles: vec![MFA_ROLE.to_string()],
                    trusted_networks: vec![TRUSTED_NETWORK.to_string()],
                    ..StepUpConfig::default()
                },
            )
            .unwrap(),
        );
        let orchestrator =
            AuthenticationOrchestrator::new(resolver.clone(), tracker.clone(), step_up.clone())
                .with_audit(audit);

        Self {
            accounts,
            counters,
            tokens,
            directory_a,
            directory_b,
            notifier,
            audit: sink,
            resolver,
            tracker,
            step_up,
            orchestrator,
        }
    }

    /// Creates a native local account.
    pub async fn add_local(&self, record: IdentityRecord, password: &str) {
        let hash = hash_password(password).unwrap();
        self.accounts
            .create(&LocalAccount::native(record, hash))
            .await
            .unwrap();
    }

    pub async fn local_user(&self, username: &str, password: &str) {
        self.add_local(IdentityRecord::new(name(username), SourceKind::Local), password)
            .await;
    }

    pub async fn retries(&self, username: &str) -> u32 {
        self.tracker.current(&name(username)).await.unwrap()
    }
}
