mod common;

use common::{FakeIdentity, FakeSubject};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use warden_rbac::{FixtureId, RbacError, RoleSwitchCoordinator};

fn coordinator(identity: &Arc<FakeIdentity>) -> RoleSwitchCoordinator {
    RoleSwitchCoordinator::new(identity.clone(), "admin", "member")
}

fn fixture(name: &'static str) -> FixtureId {
    FixtureId::new(module_path!(), name)
}

#[tokio::test]
async fn switch_replaces_held_roles_with_exactly_one() {
    let identity = Arc::new(FakeIdentity::new(
        &["admin", "member", "reader"],
        &["widget"],
        &["admin", "reader"],
    ));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);
    let fixture = fixture("SwitchTest");

    coordinator
        .switch_role(&subject, &fixture, true)
        .await
        .expect("switch to test role");

    assert_eq!(identity.held_role_names(), vec!["member".to_string()]);
    // Both previously held roles were revoked, one grant issued.
    assert_eq!(identity.revokes.load(Ordering::Relaxed), 2);
    assert_eq!(identity.grants.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn switch_is_a_noop_when_role_already_held() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["member"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);

    coordinator
        .switch_role(&subject, &fixture("NoopTest"), true)
        .await
        .expect("switch");

    assert_eq!(identity.grants.load(Ordering::Relaxed), 0);
    assert_eq!(identity.revokes.load(Ordering::Relaxed), 0);
    // Auth is still flushed and re-established.
    assert!(subject.token_generation() > 1);
}

#[tokio::test]
async fn double_switch_with_same_role_fails_setup() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);
    let fixture = fixture("DoubleSwitchTest");

    coordinator
        .switch_role(&subject, &fixture, true)
        .await
        .expect("first switch");
    let err = coordinator
        .switch_role(&subject, &fixture, true)
        .await
        .expect_err("second switch with the same role");
    assert!(matches!(err, RbacError::SetupFailed(_)));
}

#[tokio::test]
async fn alternating_switches_are_fine() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);
    let fixture = fixture("AlternatingTest");

    for _ in 0..3 {
        coordinator
            .switch_role(&subject, &fixture, true)
            .await
            .expect("switch to test role");
        coordinator
            .switch_role(&subject, &fixture, false)
            .await
            .expect("switch back to admin");
    }
    assert_eq!(identity.held_role_names(), vec!["admin".to_string()]);
}

#[tokio::test]
async fn fixtures_have_independent_ledgers() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);

    coordinator
        .switch_role(&subject, &fixture("LedgerA"), true)
        .await
        .expect("switch fixture a");
    // A different fixture requesting the same flag is not a misuse.
    coordinator
        .switch_role(&subject, &fixture("LedgerB"), true)
        .await
        .expect("switch fixture b");
}

#[tokio::test]
async fn missing_test_role_fails_setup() {
    let identity = Arc::new(FakeIdentity::new(&["admin"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);

    let err = coordinator
        .switch_role(&subject, &fixture("MissingRoleTest"), true)
        .await
        .expect_err("test role absent");
    match err {
        RbacError::SetupFailed(message) => assert!(message.contains("member")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn override_role_restores_admin_on_success() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);
    let fixture = fixture("OverrideOkTest");

    let seen = coordinator
        .override_role(&subject, &fixture, || async {
            Ok(identity.held_role_names())
        })
        .await
        .expect("override role");

    assert_eq!(seen, vec!["member".to_string()]);
    assert_eq!(identity.held_role_names(), vec!["admin".to_string()]);
}

#[tokio::test]
async fn override_role_restores_admin_when_body_fails() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);
    let fixture = fixture("OverrideErrTest");

    let err = coordinator
        .override_role(&subject, &fixture, || async {
            Err::<(), _>(RbacError::SetupFailed("body exploded".to_string()))
        })
        .await
        .expect_err("body error propagates");
    assert!(matches!(err, RbacError::SetupFailed(_)));
    assert_eq!(identity.held_role_names(), vec!["admin".to_string()]);
}

#[tokio::test]
async fn repeated_override_role_is_idempotent() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);
    let fixture = fixture("OverrideRepeatTest");

    let before = identity.held_role_names();
    for _ in 0..3 {
        coordinator
            .override_role(&subject, &fixture, || async { Ok(()) })
            .await
            .expect("override role");
    }
    assert_eq!(identity.held_role_names(), before);
}

#[tokio::test]
async fn switch_reauthenticates_the_subject() {
    let identity = Arc::new(FakeIdentity::new(&["admin", "member"], &["widget"], &["admin"]));
    let subject = FakeSubject::new();
    let coordinator = coordinator(&identity);

    let before = subject.token_generation();
    coordinator
        .switch_role(&subject, &fixture("ReauthTest"), true)
        .await
        .expect("switch");
    assert_eq!(subject.token_generation(), before + 1);
}
