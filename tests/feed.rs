#![cfg(feature = "inmem-store")]

use std::time::Duration;

use classlink::feed::Subscription;
use classlink::models::{NewAnnouncement, NewMessage};
use classlink::repo::inmem::InMemRepo;
use classlink::repo::{AnnouncementRepo, MessageRepo};
use futures_util::StreamExt;
use serial_test::serial;
use tokio::time::timeout;

fn repo() -> InMemRepo {
    std::env::set_var("CLASSLINK_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

fn announcement(title: &str) -> NewAnnouncement {
    NewAnnouncement { title: title.into(), content: "…".into(), priority: "medium".into() }
}

fn message(to: &str, content: &str) -> NewMessage {
    NewMessage {
        receiver_id: to.into(),
        receiver_name: to.into(),
        content: content.into(),
        subject: None,
        message_type: None,
        student_name: None,
    }
}

/// Writes that land before the subscription only show up in the initial
/// snapshot; each write after it delivers exactly one fresh snapshot.
#[tokio::test]
#[serial]
async fn announcement_feed_initial_then_per_insert() {
    let r = repo();
    r.create_announcement(announcement("before"), "t1", "Ms. Rivera").await.unwrap();

    let mut sub = r.subscribe_announcements();
    let initial = sub.next().await.unwrap();
    assert_eq!(initial.docs.len(), 1);
    assert_eq!(initial.docs[0].title, "before");

    r.create_announcement(announcement("first"), "t1", "Ms. Rivera").await.unwrap();
    let snap = sub.next().await.unwrap();
    assert_eq!(snap.docs.len(), 2);
    assert_eq!(snap.docs[0].title, "first"); // newest first

    r.create_announcement(announcement("second"), "t1", "Ms. Rivera").await.unwrap();
    let snap = sub.next().await.unwrap();
    assert_eq!(snap.docs.len(), 3);
    assert_eq!(snap.docs[0].title, "second");

    // nothing pending once the feed is drained
    assert!(timeout(Duration::from_millis(100), sub.next()).await.is_err());
}

/// A tick whose re-query produces the same result set is swallowed, so a
/// conversation feed never surfaces traffic between other user pairs.
#[tokio::test]
#[serial]
async fn conversation_feed_ignores_other_pairs() {
    let r = repo();
    let mut sub = r.subscribe_conversation("a", "b");
    assert!(sub.next().await.unwrap().docs.is_empty());

    // same collection, different pair: tick fires, snapshot is unchanged
    r.send_message(message("d", "noise"), "c", "c").await.unwrap();
    assert!(timeout(Duration::from_millis(100), sub.next()).await.is_err());

    r.send_message(message("b", "hello"), "a", "a").await.unwrap();
    let snap = sub.next().await.unwrap();
    assert_eq!(snap.docs.len(), 1);
    assert_eq!(snap.docs[0].content, "hello");
}

/// Flipping the read flag changes the result set, so subscribers see the
/// update even though no document was added.
#[tokio::test]
#[serial]
async fn read_flag_change_redelivers_snapshot() {
    let r = repo();
    let msg = r.send_message(message("b", "hi"), "a", "a").await.unwrap();

    let mut sub = r.subscribe_conversation("a", "b");
    let initial = sub.next().await.unwrap();
    assert!(!initial.docs[0].read);

    r.mark_message_read(&msg.id).await.unwrap();
    let snap = sub.next().await.unwrap();
    assert_eq!(snap.docs.len(), 1);
    assert!(snap.docs[0].read);
}

/// A subscriber that falls behind the tick buffer catches up with a single
/// re-query instead of replaying every missed tick.
#[tokio::test]
#[serial]
async fn lagged_subscriber_coalesces_into_one_snapshot() {
    let r = repo();
    let mut sub = r.subscribe_announcements();
    assert!(sub.next().await.unwrap().docs.is_empty());

    // more writes than the tick buffer holds
    for i in 0..70 {
        r.create_announcement(announcement(&format!("a{i}")), "t1", "Ms. Rivera")
            .await
            .unwrap();
    }

    let snap = sub.next().await.unwrap();
    assert_eq!(snap.docs.len(), 70);

    // residual buffered ticks re-query to the same set and are swallowed
    assert!(timeout(Duration::from_millis(200), sub.next()).await.is_err());
}

#[tokio::test]
#[serial]
async fn stream_adapter_delivers_snapshots_in_order() {
    let r = repo();
    r.create_announcement(announcement("one"), "t1", "Ms. Rivera").await.unwrap();

    let mut stream = Box::pin(r.subscribe_announcements().into_stream());
    let initial = stream.next().await.unwrap();
    assert_eq!(initial.docs.len(), 1);

    r.create_announcement(announcement("two"), "t1", "Ms. Rivera").await.unwrap();
    let snap = stream.next().await.unwrap();
    assert_eq!(snap.docs.len(), 2);
}

/// The feed ends (returns None) only when every sender side is gone.
#[tokio::test]
async fn subscription_ends_when_hub_closes() {
    let (tx, rx) = tokio::sync::broadcast::channel::<()>(4);
    let mut sub: Subscription<i32> =
        Subscription::new(rx, Box::new(|| Box::pin(async { Ok(vec![1, 2, 3]) })));

    let initial = sub.next().await.unwrap();
    assert_eq!(initial.docs, vec![1, 2, 3]);

    drop(tx);
    assert!(sub.next().await.is_none());
}
