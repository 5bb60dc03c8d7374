mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{eventually, next_matching, test_config, tone, Harness};
use murmur_client::ViewEvent;
use murmur_shared::ConversationKey;

#[tokio::test]
async fn test_each_subscribe_is_released_once() {
    let h = Harness::new();
    let gated = h.gated("ann");
    let ann = h
        .messenger_with(gated.clone(), test_config(), tone())
        .await;

    ann.select_peer(h.bob.id).await.unwrap();
    assert_eq!(gated.subscribe_count(), 1);

    // Reselecting the same peer reloads without resubscribing.
    ann.select_peer(h.bob.id).await.unwrap();
    assert_eq!(gated.subscribe_count(), 1);
    assert_eq!(gated.unsubscribe_count(), 0);

    ann.select_peer(h.cid.id).await.unwrap();
    assert_eq!(gated.subscribe_count(), 2);
    assert_eq!(gated.unsubscribe_count(), 1);
    assert_eq!(h.backend.feed().subscriber_count(), 1);

    ann.close().await;
    ann.close().await;
    assert_eq!(gated.unsubscribe_count(), 2);
    assert_eq!(h.backend.feed().subscriber_count(), 0);
    assert_eq!(ann.active_subscription().await, None);
}

#[tokio::test]
async fn test_dropping_the_view_releases_the_subscription() {
    let h = Harness::new();
    let gated = h.gated("ann");
    let ann = h
        .messenger_with(gated.clone(), test_config(), tone())
        .await;
    ann.select_peer(h.bob.id).await.unwrap();

    drop(ann);
    eventually("unsubscribe on drop", || gated.unsubscribe_count() == 1).await;
    assert_eq!(h.backend.feed().subscriber_count(), 0);
}

#[tokio::test]
async fn test_previous_pair_no_longer_delivers() {
    let h = Harness::new();
    let ann = h.messenger("ann").await;
    let bob = h.messenger("bob").await;
    ann.select_peer(h.bob.id).await.unwrap();
    ann.select_peer(h.cid.id).await.unwrap();

    bob.select_peer(h.ann.id).await.unwrap();
    bob.set_draft("are you there?");
    bob.send_draft().await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ann.messages().is_empty());
    assert_eq!(
        ann.active_subscription().await,
        Some(ConversationKey::new(h.ann.id, h.cid.id).unwrap())
    );
}

#[tokio::test]
async fn test_failed_receipt_leaves_message_unread() {
    let h = Harness::new();
    let gated = h.gated("bob");
    let bob = h
        .messenger_with(gated.clone(), test_config(), tone())
        .await;
    bob.select_peer(h.ann.id).await.unwrap();
    gated.fail_read_updates.store(true, Ordering::SeqCst);

    let mut events = bob.events();
    let ann = h.messenger("ann").await;
    ann.select_peer(h.bob.id).await.unwrap();
    ann.set_draft("hi");
    let sent = ann.send_draft().await.unwrap();

    let appended = next_matching(&mut events, |e| match e {
        ViewEvent::MessageAppended { message } => Some(message.id),
        _ => None,
    })
    .await;
    assert_eq!(appended, sent.id);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let messages = bob.messages();
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].read);
}

#[tokio::test]
async fn test_realtime_insert_before_history_is_kept() {
    let h = Harness::new();
    let bob = h.messenger("bob").await;
    bob.select_peer(h.ann.id).await.unwrap();
    bob.set_draft("old");
    bob.send_draft().await.unwrap();

    let gated = h.gated("ann");
    let key = ConversationKey::new(h.ann.id, h.bob.id).unwrap();
    gated.hold(key);
    let ann = std::sync::Arc::new(
        h.messenger_with(gated.clone(), test_config(), tone())
            .await,
    );
    let selecting = tokio::spawn({
        let ann = ann.clone();
        let bob_id = h.bob.id;
        async move { ann.select_peer(bob_id).await }
    });

    // The feed is attached before the history query starts.
    gated.entered.notified().await;
    bob.set_draft("new");
    bob.send_draft().await.unwrap();
    eventually("realtime insert", || ann.messages().len() == 1).await;

    gated.release(&key);
    selecting.await.unwrap().unwrap();

    let texts: Vec<String> = ann.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(texts, vec!["old", "new"]);
}
