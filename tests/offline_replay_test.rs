use likesync::cfg::SyncConfig;
use likesync::core::types::{is_pending_reaction_id, LikeRequest};
use likesync::storage::FileDurableStore;
use likesync::sync::{ChannelOfflineQueue, Connectivity, ReplayStats};
use likesync::test_helper::{FakeTransport, AUTHOR_FOR_TEST};
use likesync::Repository;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Setup {
    repo: Arc<Repository>,
    transport: Arc<FakeTransport>,
    online: Arc<AtomicBool>,
}

async fn setup(
    store_path: &std::path::Path,
    queue: ChannelOfflineQueue,
    online: bool,
) -> Setup {
    let transport = Arc::new(FakeTransport::new());
    let online = Arc::new(AtomicBool::new(online));
    let store = Arc::new(FileDurableStore::open(store_path, 16).await.unwrap());

    let connectivity: Arc<dyn Connectivity> = online.clone();
    let repo = Repository::builder(SyncConfig::default())
        .transport(transport.clone())
        .store(store)
        .offline_queue(Arc::new(queue))
        .connectivity(connectivity)
        .build()
        .unwrap();
    repo.initialize().await.unwrap();

    Setup {
        repo: Arc::new(repo),
        transport,
        online,
    }
}

#[tokio::test]
async fn test_offline_likes_replay_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (queue, mut replayer) = ChannelOfflineQueue::new();
    let s = setup(&dir.path().join("likes.json"), queue, false).await;

    let placeholder = s
        .repo
        .like_event(LikeRequest::new("t1", AUTHOR_FOR_TEST))
        .await
        .unwrap();
    s.repo
        .like_event(LikeRequest::new("t2", AUTHOR_FOR_TEST))
        .await
        .unwrap();
    s.repo.unlike_event("t2").await.unwrap();
    assert!(is_pending_reaction_id(&placeholder));

    // Still offline: nothing is replayed.
    let stats = replayer.replay_pending(&s.repo).await;
    assert_eq!(
        stats,
        ReplayStats {
            replayed: 0,
            skipped: 0,
            remaining: 3
        }
    );

    s.online.store(true, Ordering::SeqCst);
    let stats = replayer.replay_pending(&s.repo).await;
    assert_eq!(stats.replayed, 3);
    assert_eq!(stats.remaining, 0);

    assert_eq!(s.transport.send_like_calls(), 1);
    assert_eq!(s.transport.delete_calls(), 0);
    let record = s.repo.like_record("t1").await.unwrap();
    assert!(!record.is_pending());
    assert_eq!(s.repo.ordered_liked_event_ids(), vec!["t1"]);

    s.repo.dispose().await;
}

#[tokio::test]
async fn test_failed_replay_keeps_action_queued() {
    let dir = tempfile::tempdir().unwrap();
    let (queue, mut replayer) = ChannelOfflineQueue::new();
    let s = setup(&dir.path().join("likes.json"), queue, false).await;

    s.repo
        .like_event(LikeRequest::new("t1", AUTHOR_FOR_TEST))
        .await
        .unwrap();
    s.online.store(true, Ordering::SeqCst);
    s.transport.set_reject_publish(true);

    let stats = replayer.replay_pending(&s.repo).await;
    assert_eq!(stats.replayed, 0);
    assert_eq!(stats.remaining, 1);
    assert!(s.repo.like_record("t1").await.unwrap().is_pending());

    s.transport.set_reject_publish(false);
    let stats = replayer.replay_pending(&s.repo).await;
    assert_eq!(stats.replayed, 1);
    assert!(!s.repo.like_record("t1").await.unwrap().is_pending());
}

#[tokio::test]
async fn test_placeholder_survives_restart_and_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("likes.json");

    let (queue, _replayer) = ChannelOfflineQueue::new();
    let first = setup(&path, queue, false).await;
    first
        .repo
        .like_event(LikeRequest::new("t1", AUTHOR_FOR_TEST))
        .await
        .unwrap();
    first.repo.dispose().await;
    drop(first);

    let (queue, _replayer) = ChannelOfflineQueue::new();
    let second = setup(&path, queue, true).await;
    assert!(second.repo.is_liked("t1"));

    let result = second.repo.sync_user_reactions().await.unwrap();
    assert!(result.is_empty());
    assert!(second.repo.is_liked("t1"));
    second.repo.dispose().await;
}

#[tokio::test]
async fn test_background_replayer_publishes_when_online() {
    let dir = tempfile::tempdir().unwrap();
    let (queue, replayer) = ChannelOfflineQueue::new();
    let s = setup(&dir.path().join("likes.json"), queue, false).await;

    s.repo
        .like_event(LikeRequest::new("t1", AUTHOR_FOR_TEST))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(replayer.run(
        s.repo.clone(),
        Duration::from_millis(10),
        shutdown_rx,
    ));

    s.online.store(true, Ordering::SeqCst);
    for _ in 0..100 {
        if s.transport.send_like_calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(s.transport.send_like_calls(), 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
    s.repo.dispose().await;
}
