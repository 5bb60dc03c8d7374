mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{eventually, next_matching, test_config, tone, Harness};
use murmur_client::ViewEvent;
use murmur_shared::provider::MessageRepository;
use murmur_shared::{ConversationKey, MessageId, MurmurError};

#[tokio::test]
async fn test_hi_reaches_open_view_once_and_is_marked_read() {
    let h = Harness::new();
    let ann = h.messenger("ann").await;
    let bob = h.messenger("bob").await;
    bob.select_peer(h.ann.id).await.unwrap();
    ann.select_peer(h.bob.id).await.unwrap();

    let mut bob_events = bob.events();
    ann.set_draft("hi");
    let sent = ann.send_draft().await.unwrap();
    assert_eq!(ann.draft(), "");

    let appended = next_matching(&mut bob_events, |e| match e {
        ViewEvent::MessageAppended { message } => Some(message.clone()),
        _ => None,
    })
    .await;
    assert_eq!(appended.id, sent.id);
    assert!(!appended.read);

    let read = next_matching(&mut bob_events, |e| match e {
        ViewEvent::MessageRead { id } => Some(*id),
        _ => None,
    })
    .await;
    assert_eq!(read, sent.id);

    let his: Vec<_> = bob.messages().into_iter().filter(|m| m.content == "hi").collect();
    assert_eq!(his.len(), 1);
    assert!(his[0].read);

    // The sender's own echo is merged with the confirmed record.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ann.messages().len(), 1);

    let key = ConversationKey::new(h.ann.id, h.bob.id).unwrap();
    let stored = h.session("ann").query_messages(&key).await.unwrap();
    assert!(stored[0].read);
}

#[tokio::test]
async fn test_load_is_ordered_idempotent_and_marks_read() {
    let h = Harness::new();
    let bob = h.messenger("bob").await;
    bob.select_peer(h.ann.id).await.unwrap();
    for text in ["one", "two", "three"] {
        bob.set_draft(text);
        bob.send_draft().await.unwrap();
    }

    let ann = h.messenger("ann").await;
    ann.select_peer(h.bob.id).await.unwrap();
    let first: Vec<MessageId> = ann.messages().iter().map(|m| m.id).collect();
    let texts: Vec<String> = ann.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    assert!(ann.messages().iter().all(|m| m.read));
    assert_eq!(ann.store().unread_count(), 0);

    ann.select_peer(h.bob.id).await.unwrap();
    let second: Vec<MessageId> = ann.messages().iter().map(|m| m.id).collect();
    assert_eq!(first, second);

    // Bob's own copies reflect the receipt.
    let key = ConversationKey::new(h.ann.id, h.bob.id).unwrap();
    let stored = h.session("bob").query_messages(&key).await.unwrap();
    assert!(stored.iter().all(|m| m.read));
}

#[tokio::test]
async fn test_load_by_peer_opens_and_reloads() {
    let h = Harness::new();
    let bob = h.messenger("bob").await;
    bob.select_peer(h.ann.id).await.unwrap();
    bob.set_draft("first");
    bob.send_draft().await.unwrap();

    let ann = h.messenger("ann").await;
    let store = ann.store();
    assert_eq!(store.load_peer(h.bob.id).await.unwrap(), 1);
    assert_eq!(store.active_peer(), Some(h.bob.id));

    let before = store.ticket().unwrap();
    assert_eq!(store.load_peer(h.bob.id).await.unwrap(), 1);
    assert_eq!(store.ticket(), Some(before));
    assert!(store.snapshot()[0].read);
}

#[tokio::test]
async fn test_history_survives_failed_read_receipt() {
    let h = Harness::new();
    let bob = h.messenger("bob").await;
    bob.select_peer(h.ann.id).await.unwrap();
    bob.set_draft("ping");
    bob.send_draft().await.unwrap();

    let gated = h.gated("ann");
    gated.fail_read_updates.store(true, Ordering::SeqCst);
    let ann = h
        .messenger_with(gated.clone(), test_config(), tone())
        .await;
    ann.select_peer(h.bob.id).await.unwrap();

    let messages = ann.messages();
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].read);
}

#[tokio::test]
async fn test_stale_history_is_discarded_after_peer_switch() {
    let h = Harness::new();
    let bob = h.messenger("bob").await;
    bob.select_peer(h.ann.id).await.unwrap();
    bob.set_draft("from bob");
    bob.send_draft().await.unwrap();

    let cid = h.messenger("cid").await;
    cid.select_peer(h.ann.id).await.unwrap();
    cid.set_draft("from cid");
    cid.send_draft().await.unwrap();

    let gated = h.gated("ann");
    let ann_bob = ConversationKey::new(h.ann.id, h.bob.id).unwrap();
    gated.hold(ann_bob);
    let ann = Arc::new(
        h.messenger_with(gated.clone(), test_config(), tone())
            .await,
    );

    let pending = tokio::spawn({
        let ann = ann.clone();
        let bob_id = h.bob.id;
        async move { ann.select_peer(bob_id).await }
    });
    gated.entered.notified().await;

    ann.select_peer(h.cid.id).await.unwrap();
    gated.release(&ann_bob);
    pending.await.unwrap().unwrap();

    let texts: Vec<String> = ann.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(texts, vec!["from cid"]);
    assert_eq!(ann.store().active_peer(), Some(h.cid.id));
    assert_eq!(
        ann.active_subscription().await,
        Some(ConversationKey::new(h.ann.id, h.cid.id).unwrap())
    );
}

#[tokio::test]
async fn test_send_to_earlier_ticket_skips_current_view() {
    let h = Harness::new();
    let ann = h.messenger("ann").await;
    ann.select_peer(h.bob.id).await.unwrap();
    let store = ann.store();
    let for_bob = store.ticket().unwrap();

    ann.select_peer(h.cid.id).await.unwrap();
    let sent = store.send_to(&for_bob, " late ", None).await.unwrap();
    assert_eq!(sent.receiver_id, h.bob.id);
    assert_eq!(sent.content, "late");
    assert!(ann.messages().is_empty());

    ann.select_peer(h.bob.id).await.unwrap();
    let texts: Vec<String> = ann.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(texts, vec!["late"]);
}

#[tokio::test]
async fn test_failed_send_keeps_draft() {
    let h = Harness::new();
    let gated = h.gated("ann");
    let ann = h
        .messenger_with(gated.clone(), test_config(), tone())
        .await;
    ann.select_peer(h.bob.id).await.unwrap();

    gated.fail_inserts.store(true, Ordering::SeqCst);
    ann.set_draft("  important  ");
    assert!(matches!(
        ann.send_draft().await,
        Err(MurmurError::Backend(_))
    ));
    assert_eq!(ann.draft(), "  important  ");
    assert!(ann.messages().is_empty());

    gated.fail_inserts.store(false, Ordering::SeqCst);
    let sent = ann.send_draft().await.unwrap();
    assert_eq!(sent.content, "important");
    assert_eq!(ann.draft(), "");
}

#[tokio::test]
async fn test_blank_draft_is_rejected_locally() {
    let h = Harness::new();
    let gated = h.gated("ann");
    let ann = h
        .messenger_with(gated.clone(), test_config(), tone())
        .await;
    ann.select_peer(h.bob.id).await.unwrap();

    // Any remote call would fail.
    gated.fail_inserts.store(true, Ordering::SeqCst);
    ann.set_draft("   \n");
    assert!(matches!(
        ann.send_draft().await,
        Err(MurmurError::Validation(_))
    ));
    assert_eq!(ann.draft(), "   \n");
}

#[tokio::test]
async fn test_send_requires_selected_peer() {
    let h = Harness::new();
    let ann = h.messenger("ann").await;
    ann.set_draft("hello?");
    assert!(matches!(
        ann.send_draft().await,
        Err(MurmurError::Validation(_))
    ));
    assert!(matches!(
        ann.select_peer(h.ann.id).await,
        Err(MurmurError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_only_sender_can_delete() {
    let h = Harness::new();
    let ann = h.messenger("ann").await;
    let bob = h.messenger("bob").await;
    ann.select_peer(h.bob.id).await.unwrap();
    ann.set_draft("mine");
    let sent = ann.send_draft().await.unwrap();

    // With the message on screen the client refuses outright.
    bob.select_peer(h.ann.id).await.unwrap();
    assert!(matches!(
        bob.delete(&sent.id).await,
        Err(MurmurError::Forbidden(_))
    ));
    assert_eq!(bob.messages().len(), 1);

    // Without a local copy the provider constraint still holds.
    let stranger = h.messenger("bob").await;
    assert!(!stranger.delete(&sent.id).await.unwrap());

    let key = ConversationKey::new(h.ann.id, h.bob.id).unwrap();
    assert_eq!(h.session("ann").query_messages(&key).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_propagates_to_peer() {
    let h = Harness::new();
    let ann = h.messenger("ann").await;
    let bob = h.messenger("bob").await;
    ann.select_peer(h.bob.id).await.unwrap();
    ann.set_draft("oops");
    let sent = ann.send_draft().await.unwrap();
    bob.select_peer(h.ann.id).await.unwrap();
    assert_eq!(bob.messages().len(), 1);

    assert!(ann.delete(&sent.id).await.unwrap());
    assert!(ann.messages().is_empty());
    eventually("peer removal", || bob.messages().is_empty()).await;
}

#[tokio::test]
async fn test_unauthenticated_view_does_not_mount() {
    let h = Harness::new();
    let anonymous = Arc::new(h.backend.connect());
    let ctx = murmur_client::ClientContext::new(anonymous, test_config());
    assert!(matches!(
        murmur_client::Messenger::open(&ctx, tone()).await,
        Err(MurmurError::Unauthenticated)
    ));
}
