#![cfg(feature = "inmem-store")]

use std::time::Duration;

use classlink::auth::Role;
use classlink::models::{NewProfile, UserProfile};
use classlink::repo::{inmem::InMemRepo, AccountRepo};
use classlink::session::{until_signed_out, ProfileState, SessionHub, SessionState};
use serial_test::serial;
use tokio::time::timeout;

fn repo() -> InMemRepo {
    std::env::set_var("CLASSLINK_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

async fn account(r: &InMemRepo, email: &str) -> UserProfile {
    r.create_account(
        NewProfile {
            email: email.into(),
            name: "Sam Ortiz".into(),
            role: Role::Parent,
            phone: String::new(),
            school: String::new(),
            grade: String::new(),
            subjects: vec![],
        },
        "hash".into(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn unknown_session_is_unresolved() {
    let hub = SessionHub::new();
    assert_eq!(hub.state("never-seen"), SessionState::Unresolved);
}

#[tokio::test]
#[serial]
async fn sign_in_loads_profile_asynchronously() {
    let r = repo();
    let profile = account(&r, "sam@example.com").await;
    let hub = SessionHub::new();

    let epoch = hub.signed_in("s1", &profile.id);
    // signed in immediately, profile still pending
    assert_eq!(
        hub.state("s1"),
        SessionState::SignedIn { user_id: profile.id.clone(), profile: ProfileState::Loading }
    );

    hub.resolve_profile("s1", epoch, &r, &profile.id).await;
    match hub.state("s1") {
        SessionState::SignedIn { profile: ProfileState::Loaded(p), .. } => {
            assert_eq!(p, profile)
        }
        other => panic!("expected loaded profile, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn stale_profile_commit_is_discarded() {
    let r = repo();
    let first = account(&r, "first@example.com").await;
    let second = account(&r, "second@example.com").await;
    let hub = SessionHub::new();

    let old_epoch = hub.signed_in("s1", &first.id);
    // a second sign-in on the same session id supersedes the first
    let new_epoch = hub.signed_in("s1", &second.id);
    assert!(new_epoch > old_epoch);

    // the slow fetch from the first sign-in must not land
    assert!(!hub.commit_profile("s1", old_epoch, Ok(first)));
    assert_eq!(
        hub.state("s1"),
        SessionState::SignedIn { user_id: second.id.clone(), profile: ProfileState::Loading }
    );

    assert!(hub.commit_profile("s1", new_epoch, Ok(second.clone())));
    assert_eq!(
        hub.state("s1"),
        SessionState::SignedIn { user_id: second.id.clone(), profile: ProfileState::Loaded(second) }
    );
}

#[tokio::test]
#[serial]
async fn sign_out_wins_over_late_profile() {
    let r = repo();
    let profile = account(&r, "late@example.com").await;
    let hub = SessionHub::new();

    let epoch = hub.signed_in("s1", &profile.id);
    hub.signed_out("s1");

    assert!(!hub.commit_profile("s1", epoch, Ok(profile)));
    assert_eq!(hub.state("s1"), SessionState::SignedOut);
}

#[tokio::test]
#[serial]
async fn failed_profile_fetch_keeps_session_usable() {
    let r = repo();
    let hub = SessionHub::new();

    // no such profile document
    let epoch = hub.signed_in("s1", "ghost");
    hub.resolve_profile("s1", epoch, &r, "ghost").await;

    assert_eq!(
        hub.state("s1"),
        SessionState::SignedIn { user_id: "ghost".into(), profile: ProfileState::Failed }
    );
}

#[tokio::test]
async fn watch_registers_sessions_unseen_by_this_process() {
    let hub = SessionHub::new();
    let rx = hub.watch("from-before-restart", "u9");
    assert_eq!(
        *rx.borrow(),
        SessionState::SignedIn { user_id: "u9".into(), profile: ProfileState::Loading }
    );
    assert!(matches!(hub.state("from-before-restart"), SessionState::SignedIn { .. }));
}

#[tokio::test]
async fn until_signed_out_cuts_off_exactly_on_signout() {
    let hub = SessionHub::new();
    let rx = hub.watch("s1", "u1");
    let mut cutoff = Box::pin(until_signed_out(rx));

    // pending while the session is live
    assert!(timeout(Duration::from_millis(50), &mut cutoff).await.is_err());

    hub.signed_out("s1");
    timeout(Duration::from_secs(1), &mut cutoff)
        .await
        .expect("cutoff resolves after sign-out");

    // already-signed-out sessions resolve immediately
    let rx = hub.watch("s1", "u1");
    timeout(Duration::from_secs(1), until_signed_out(rx))
        .await
        .expect("resolves without waiting");
}
