//! End-to-end authentication flows through the orchestrator.

mod common;

use std::net::IpAddr;

use common::{CLIENT_ID, Harness, MFA_ROLE, THRESHOLD, context, name, request};
use gatekeeper_auth::audit::AuditAction;
use gatekeeper_auth::identity::{ContactChannel, IdentityRecord, SourceKind};
use gatekeeper_auth::linker::{CrossSourceAccountLinker, LinkedAccount};
use gatekeeper_auth::orchestrator::{AuthContext, AuthRequest};
use gatekeeper_auth::outcome::{AuthFailure, AuthOutcome, LockReason};
use gatekeeper_auth::storage::LocalAccountStore;
use gatekeeper_auth::step_up::{RetryableReason, StepUpValidation, TerminalReason};
use gatekeeper_auth::types::GrantType;

const PASSWORD: &str = "correct horse battery staple";

fn failure(outcome: AuthOutcome) -> AuthFailure {
    match outcome {
        AuthOutcome::Failure(failure) => failure,
        other => panic!("expected failure, got {:?}", other),
    }
}

// =============================================================================
// Lockout
// =============================================================================

#[tokio::test]
async fn test_bob_locks_after_threshold_and_stays_locked() {
    let harness = Harness::new();
    harness.local_user("BOB", PASSWORD).await;
    assert_eq!(THRESHOLD, 3);

    for expected_count in 1..THRESHOLD {
        let outcome = harness
            .orchestrator
            .authenticate(&request("BOB", "wrong"))
            .await
            .unwrap();
        assert_eq!(failure(outcome), AuthFailure::BadCredentials);
        assert_eq!(harness.retries("BOB").await, expected_count);
    }

    let outcome = harness
        .orchestrator
        .authenticate(&request("BOB", "wrong"))
        .await
        .unwrap();
    assert_eq!(
        failure(outcome),
        AuthFailure::locked(LockReason::ThresholdReached)
    );
    assert_eq!(harness.retries("BOB").await, 0);

    // Lock persists even with the right password.
    let outcome = harness
        .orchestrator
        .authenticate(&request("bob", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::locked(LockReason::AccountLocked));
    assert_eq!(harness.retries("BOB").await, 0);

    // Until unlocked at the source.
    harness.accounts.set_locked(&name("bob"), false).await.unwrap();
    let outcome = harness
        .orchestrator
        .authenticate(&request("bob", PASSWORD))
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_success_resets_counter() {
    let harness = Harness::new();
    harness.local_user("carol", PASSWORD).await;

    for _ in 0..THRESHOLD - 1 {
        harness
            .orchestrator
            .authenticate(&request("carol", "wrong"))
            .await
            .unwrap();
    }
    assert_eq!(harness.retries("carol").await, THRESHOLD - 1);

    let outcome = harness
        .orchestrator
        .authenticate(&request("carol", PASSWORD))
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(harness.retries("carol").await, 0);

    let outcome = harness
        .orchestrator
        .authenticate(&request("carol", "wrong"))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::BadCredentials);
    assert_eq!(harness.retries("carol").await, 1);
}

#[tokio::test]
async fn test_disabled_account_never_touches_counter() {
    let harness = Harness::new();
    harness.local_user("dave", PASSWORD).await;
    harness
        .orchestrator
        .authenticate(&request("dave", "wrong"))
        .await
        .unwrap();
    harness.accounts.set_enabled(&name("dave"), false).await.unwrap();

    let before = harness.retries("dave").await;
    assert_eq!(before, 1);

    for password in [PASSWORD, "wrong", "also wrong", "still wrong"] {
        let outcome = harness
            .orchestrator
            .authenticate(&request("dave", password))
            .await
            .unwrap();
        assert_eq!(failure(outcome), AuthFailure::AccountDisabled);
    }
    assert_eq!(harness.retries("dave").await, before);
    assert!(
        !harness
            .accounts
            .find(&name("dave"))
            .await
            .unwrap()
            .unwrap()
            .record
            .locked
    );
}

#[tokio::test]
async fn test_pre_checks_short_circuit_in_order() {
    let harness = Harness::new();
    let record = IdentityRecord::builder(name("erin"), SourceKind::Local)
        .locked(true)
        .enabled(false)
        .account_expired(true)
        .build();
    harness.add_local(record, PASSWORD).await;

    let outcome = harness
        .orchestrator
        .authenticate(&request("erin", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::locked(LockReason::AccountLocked));

    harness.accounts.set_locked(&name("erin"), false).await.unwrap();
    let outcome = harness
        .orchestrator
        .authenticate(&request("erin", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::AccountDisabled);

    harness.accounts.set_enabled(&name("erin"), true).await.unwrap();
    let outcome = harness
        .orchestrator
        .authenticate(&request("erin", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::AccountExpired);
    assert_eq!(harness.retries("erin").await, 0);
}

#[tokio::test]
async fn test_blank_credentials_and_unknown_accounts() {
    let harness = Harness::new();
    harness.local_user("frank", PASSWORD).await;

    for (username, password) in [
        ("", PASSWORD),
        ("   ", PASSWORD),
        ("frank", ""),
        ("frank", "  "),
    ] {
        let outcome = harness
            .orchestrator
            .authenticate(&request(username, password))
            .await
            .unwrap();
        assert_eq!(failure(outcome), AuthFailure::MissingCredentials);
    }
    assert_eq!(harness.retries("frank").await, 0);

    let outcome = harness
        .orchestrator
        .authenticate(&request("nobody", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::AccountNotFound);
}

#[tokio::test]
async fn test_expired_credentials_reported_after_correct_password() {
    let harness = Harness::new();
    let record = IdentityRecord::builder(name("gail"), SourceKind::Local)
        .credentials_expired(true)
        .build();
    harness.add_local(record, PASSWORD).await;

    let outcome = harness
        .orchestrator
        .authenticate(&request("gail", "wrong"))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::BadCredentials);

    let outcome = harness
        .orchestrator
        .authenticate(&request("gail", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::CredentialsExpired);
    assert_eq!(harness.retries("gail").await, 0);
}

// =============================================================================
// Directories
// =============================================================================

#[tokio::test]
async fn test_directory_lockout_applies_at_directory() {
    let harness = Harness::new();
    harness
        .directory_a
        .add(IdentityRecord::new(name("hank"), SourceKind::DirectoryA), PASSWORD);

    for _ in 0..THRESHOLD {
        harness
            .orchestrator
            .authenticate(&request("hank", "wrong"))
            .await
            .unwrap();
    }
    assert!(harness.directory_a.is_locked("hank"));

    let outcome = harness
        .orchestrator
        .authenticate(&request("hank", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::locked(LockReason::AccountLocked));

    harness.directory_a.unlock("hank");
    let outcome = harness
        .orchestrator
        .authenticate(&request("hank", PASSWORD))
        .await
        .unwrap();
    match outcome {
        AuthOutcome::Success(record) => assert_eq!(record.source, SourceKind::DirectoryA),
        other => panic!("expected success, got {:?}", other),
    }

    // Shadow kept for bookkeeping, never authoritative.
    let shadow = harness.accounts.find(&name("hank")).await.unwrap().unwrap();
    assert_eq!(shadow.shadow_of(), Some(SourceKind::DirectoryA));
    assert!(!shadow.is_authoritative());
    assert!(shadow.record.last_login_at.is_some());
}

#[tokio::test]
async fn test_authoritative_directory_shadow_stays_locked() {
    let harness = Harness::new();
    harness
        .directory_b
        .add(IdentityRecord::new(name("bob"), SourceKind::DirectoryB), PASSWORD);

    let outcome = harness
        .orchestrator
        .authenticate(&request("bob", PASSWORD))
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert!(
        harness
            .accounts
            .set_authoritative(&name("bob"), true)
            .await
            .unwrap()
    );

    for _ in 0..THRESHOLD {
        harness
            .orchestrator
            .authenticate(&request("bob", "wrong"))
            .await
            .unwrap();
    }
    assert!(harness.directory_b.is_locked("bob"));
    let shadow = harness.accounts.find(&name("bob")).await.unwrap().unwrap();
    assert!(shadow.record.locked);

    let outcome = harness
        .orchestrator
        .authenticate(&request("bob", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::locked(LockReason::AccountLocked));
    assert_eq!(harness.retries("bob").await, 0);
}

#[tokio::test]
async fn test_unreachable_source_is_not_counted() {
    let harness = Harness::new();
    harness
        .directory_a
        .add(IdentityRecord::new(name("ivy"), SourceKind::DirectoryA), PASSWORD);
    harness.directory_a.set_reachable(false);

    for _ in 0..THRESHOLD + 1 {
        let outcome = harness
            .orchestrator
            .authenticate(&request("ivy", "wrong"))
            .await
            .unwrap();
        let failure = failure(outcome);
        assert_eq!(failure, AuthFailure::source_unavailable(SourceKind::DirectoryA));
        assert!(failure.is_transient());
    }
    assert_eq!(harness.retries("ivy").await, 0);

    harness.directory_a.set_reachable(true);
    let outcome = harness
        .orchestrator
        .authenticate(&request("ivy", PASSWORD))
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_directory_b_login_trusts_verified_email() {
    let harness = Harness::new();
    let record = IdentityRecord::builder(name("jo"), SourceKind::DirectoryB)
        .email("jo@example.com")
        .build();
    harness.directory_b.add(record, PASSWORD);
    harness
        .local_user("jo.local", PASSWORD)
        .await;
    harness
        .accounts
        .set_verified_email(&name("jo.local"), "JO@example.com")
        .await
        .unwrap();

    let outcome = harness
        .orchestrator
        .authenticate(&request("jo", PASSWORD))
        .await
        .unwrap();
    let identity = match outcome {
        AuthOutcome::Success(identity) => identity,
        other => panic!("expected success, got {:?}", other),
    };

    let shadow = harness.accounts.find(&name("jo")).await.unwrap().unwrap();
    assert_eq!(shadow.shadow_of(), Some(SourceKind::DirectoryB));
    assert_eq!(shadow.record.contacts.email.as_deref(), Some("jo@example.com"));

    let linker = CrossSourceAccountLinker::new(harness.resolver.clone());
    let linked = linker.discover(&identity).await.unwrap();
    assert_eq!(
        linked,
        vec![
            LinkedAccount {
                source: SourceKind::Local,
                username: name("jo.local"),
            },
            LinkedAccount {
                source: SourceKind::DirectoryB,
                username: name("jo"),
            },
        ]
    );
}

// =============================================================================
// Federated
// =============================================================================

#[tokio::test]
async fn test_federated_login_materializes_shadow() {
    let harness = Harness::new();
    let identity = IdentityRecord::new(name("kim@sso"), SourceKind::Federated);

    let outcome = harness
        .orchestrator
        .complete_federated_login(identity.clone(), &context())
        .await
        .unwrap();
    assert!(outcome.is_success());

    // Idempotent.
    let outcome = harness
        .orchestrator
        .complete_federated_login(identity.clone(), &context())
        .await
        .unwrap();
    assert!(outcome.is_success());
    let shadow = harness.accounts.find(&name("kim@sso")).await.unwrap().unwrap();
    assert_eq!(shadow.shadow_of(), Some(SourceKind::Federated));

    // Password logins never succeed for federated identities and count as
    // bad credentials; the lock lands on the shadow.
    for _ in 0..THRESHOLD {
        harness
            .orchestrator
            .authenticate(&request("kim@sso", PASSWORD))
            .await
            .unwrap();
    }
    let outcome = harness
        .orchestrator
        .complete_federated_login(identity, &context())
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::locked(LockReason::AccountLocked));
}

#[tokio::test]
async fn test_federated_login_cannot_take_over_native_account() {
    let harness = Harness::new();
    harness.local_user("lee", PASSWORD).await;

    let outcome = harness
        .orchestrator
        .complete_federated_login(
            IdentityRecord::new(name("lee"), SourceKind::Federated),
            &context(),
        )
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::AccountNotFound);

    let account = harness.accounts.find(&name("lee")).await.unwrap().unwrap();
    assert!(account.is_native());
}

// =============================================================================
// Step-up
// =============================================================================

async fn mfa_user(harness: &Harness, username: &str) {
    let record = IdentityRecord::builder(name(username), SourceKind::Local)
        .role(MFA_ROLE)
        .email(format!("{}@example.com", username))
        .build();
    harness.add_local(record, PASSWORD).await;
}

async fn start_step_up(harness: &Harness, username: &str) -> String {
    match harness
        .orchestrator
        .authenticate(&request(username, PASSWORD))
        .await
        .unwrap()
    {
        AuthOutcome::NeedsStepUp(ticket) => ticket.token,
        other => panic!("expected step-up, got {:?}", other),
    }
}

#[tokio::test]
async fn test_email_only_step_up_consumes_code() {
    let harness = Harness::new();
    mfa_user(&harness, "mia").await;

    let outcome = harness
        .orchestrator
        .authenticate(&request("mia", PASSWORD))
        .await
        .unwrap();
    let ticket = match outcome {
        AuthOutcome::NeedsStepUp(ticket) => ticket,
        other => panic!("expected step-up, got {:?}", other),
    };
    assert_eq!(ticket.channel, ContactChannel::Email);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "mia@example.com");
    assert_eq!(sent[0].template_id, "mfa-code-email");
    assert_eq!(sent[0].code.len(), 6);

    let code = harness.notifier.last_code();
    let result = harness
        .orchestrator
        .complete_step_up(&ticket.token, &code, &context())
        .await
        .unwrap();
    match result {
        StepUpValidation::Success(identity) => assert_eq!(identity.username, name("mia")),
        other => panic!("expected success, got {:?}", other),
    }

    let again = harness
        .orchestrator
        .complete_step_up(&ticket.token, &code, &context())
        .await
        .unwrap();
    assert_eq!(again, StepUpValidation::Terminal(TerminalReason::TokenNotFound));

    assert!(harness.audit.actions().contains(&AuditAction::StepUpIssued));
    assert!(harness.audit.actions().contains(&AuditAction::UserLogin));
}

#[tokio::test]
async fn test_new_challenge_invalidates_previous_code() {
    let harness = Harness::new();
    mfa_user(&harness, "noah").await;

    let first_token = start_step_up(&harness, "noah").await;
    let first_code = harness.notifier.last_code();
    let second_token = start_step_up(&harness, "noah").await;
    let second_code = harness.notifier.last_code();

    assert_eq!(first_token, second_token);
    assert_ne!(first_code, second_code);

    let stale = harness
        .orchestrator
        .complete_step_up(&first_token, &first_code, &context())
        .await
        .unwrap();
    assert_eq!(stale, StepUpValidation::Retryable(RetryableReason::InvalidCode));

    let fresh = harness
        .orchestrator
        .complete_step_up(&second_token, &second_code, &context())
        .await
        .unwrap();
    assert!(fresh.is_success());
    assert_eq!(harness.retries("noah").await, 0);
}

#[tokio::test]
async fn test_bad_codes_lock_like_bad_passwords() {
    let harness = Harness::new();
    mfa_user(&harness, "olga").await;
    let token = start_step_up(&harness, "olga").await;
    let code = harness.notifier.last_code();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for _ in 0..THRESHOLD - 1 {
        let result = harness
            .orchestrator
            .complete_step_up(&token, wrong, &context())
            .await
            .unwrap();
        assert_eq!(result, StepUpValidation::Retryable(RetryableReason::InvalidCode));
    }
    let result = harness
        .orchestrator
        .complete_step_up(&token, wrong, &context())
        .await
        .unwrap();
    assert_eq!(
        result,
        StepUpValidation::Terminal(TerminalReason::Locked {
            username: name("olga")
        })
    );

    let locked_event = harness
        .audit
        .events()
        .into_iter()
        .rev()
        .find(|event| event.action == AuditAction::UserLoginFailed)
        .unwrap();
    assert_eq!(locked_event.username, Some(name("olga")));

    // Token and code were dropped together.
    let result = harness
        .orchestrator
        .complete_step_up(&token, &code, &context())
        .await
        .unwrap();
    assert_eq!(result, StepUpValidation::Terminal(TerminalReason::TokenNotFound));

    let outcome = harness
        .orchestrator
        .authenticate(&request("olga", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::locked(LockReason::AccountLocked));
}

#[tokio::test]
async fn test_step_up_rechecks_account_state() {
    let harness = Harness::new();
    mfa_user(&harness, "pia").await;
    let token = start_step_up(&harness, "pia").await;
    let code = harness.notifier.last_code();

    harness.accounts.set_enabled(&name("pia"), false).await.unwrap();

    let result = harness
        .orchestrator
        .complete_step_up(&token, &code, &context())
        .await
        .unwrap();
    assert_eq!(
        result,
        StepUpValidation::Terminal(TerminalReason::Rejected {
            failure: AuthFailure::AccountDisabled,
        })
    );
}

#[tokio::test]
async fn test_code_expires_at_exact_instant_and_resend_keeps_token() {
    let harness = Harness::new();
    mfa_user(&harness, "quinn").await;
    let identity = harness
        .resolver
        .local_record(&name("quinn"))
        .await
        .unwrap()
        .unwrap();

    let issued_at = time::OffsetDateTime::now_utc() - time::Duration::hours(1);
    let ticket = harness
        .step_up
        .create_challenge_at(&identity, issued_at)
        .await
        .unwrap()
        .unwrap();
    let code = harness.notifier.last_code();

    let at_expiry = harness
        .step_up
        .validate_at(&ticket.token, &code, ticket.expires_at)
        .await
        .unwrap();
    assert_eq!(at_expiry, StepUpValidation::Retryable(RetryableReason::Expired));
    assert_eq!(harness.retries("quinn").await, 0);

    let resent = match harness
        .orchestrator
        .resend_step_up(&ticket.token)
        .await
        .unwrap()
    {
        StepUpValidation::Success(resent) => resent,
        other => panic!("expected resend, got {:?}", other),
    };
    assert_eq!(resent.token, ticket.token);
    assert_ne!(resent.expires_at, ticket.expires_at);

    let new_code = harness.notifier.last_code();
    let result = harness
        .orchestrator
        .complete_step_up(&ticket.token, &new_code, &context())
        .await
        .unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_resend_unknown_token() {
    let harness = Harness::new();
    let result = harness.orchestrator.resend_step_up("missing").await.unwrap();
    assert_eq!(result, StepUpValidation::Terminal(TerminalReason::TokenNotFound));
}

#[tokio::test]
async fn test_trusted_network_skips_step_up() {
    let harness = Harness::new();
    mfa_user(&harness, "rae").await;

    let origin: IpAddr = "10.20.30.40".parse().unwrap();
    let request = AuthRequest::new("rae", PASSWORD, context().with_origin(origin));
    let outcome = harness.orchestrator.authenticate(&request).await.unwrap();
    assert!(outcome.is_success());
    assert!(harness.notifier.sent().is_empty());

    let outside: IpAddr = "192.0.2.7".parse().unwrap();
    let request = AuthRequest::new("rae", PASSWORD, context().with_origin(outside));
    let outcome = harness.orchestrator.authenticate(&request).await.unwrap();
    assert!(matches!(outcome, AuthOutcome::NeedsStepUp(_)));
}

#[tokio::test]
async fn test_step_up_without_channel_is_unavailable() {
    let harness = Harness::new();
    let record = IdentityRecord::builder(name("sam"), SourceKind::Local)
        .role(MFA_ROLE)
        .build();
    harness.add_local(record, PASSWORD).await;

    let outcome = harness
        .orchestrator
        .authenticate(&request("sam", PASSWORD))
        .await
        .unwrap();
    assert_eq!(failure(outcome), AuthFailure::MfaUnavailable);
}

#[tokio::test]
async fn test_text_channel_used_when_no_email() {
    let harness = Harness::new();
    let record = IdentityRecord::builder(name("tess"), SourceKind::Local)
        .role(MFA_ROLE)
        .mobile("+15550100")
        .build();
    harness.add_local(record, PASSWORD).await;

    start_step_up(&harness, "tess").await;
    let sent = harness.notifier.sent();
    assert_eq!(sent[0].channel, ContactChannel::Text);
    assert_eq!(sent[0].template_id, "mfa-code-text");
}

// =============================================================================
// Audit
// =============================================================================

#[tokio::test]
async fn test_audit_records_login_with_client() {
    let harness = Harness::new();
    harness.local_user("uma", PASSWORD).await;

    harness
        .orchestrator
        .authenticate(&request("uma", "wrong"))
        .await
        .unwrap();
    harness
        .orchestrator
        .authenticate(&request("uma", PASSWORD))
        .await
        .unwrap();

    let events = harness.audit.events();
    assert_eq!(
        harness.audit.actions(),
        vec![AuditAction::UserLoginFailed, AuditAction::UserLogin]
    );
    let login = &events[1];
    assert_eq!(login.username, Some(name("uma")));
    assert_eq!(login.client_id.as_deref(), Some(CLIENT_ID));
    assert_eq!(login.source, Some(SourceKind::Local));
    assert_eq!(events[0].detail.as_deref(), Some("bad_credentials"));
}

#[tokio::test]
async fn test_machine_to_machine_grant_is_not_audited() {
    let harness = Harness::new();
    harness.local_user("svc", PASSWORD).await;

    let context = AuthContext::new("batch-job", GrantType::ClientCredentials);
    harness
        .orchestrator
        .authenticate(&AuthRequest::new("svc", "wrong", context.clone()))
        .await
        .unwrap();
    let outcome = harness
        .orchestrator
        .authenticate(&AuthRequest::new("svc", PASSWORD, context))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert!(harness.audit.events().is_empty());
}
