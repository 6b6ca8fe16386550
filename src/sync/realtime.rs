//! Live ingestion of the identity's own reactions.
//!
//! Only like reactions are applied, and only when strictly newer than the
//! local record for the same target. Deletions are not handled here; the
//! next full reconciliation applies them.

use super::state::LocalLikes;
use crate::core::error::StoreError;
use crate::core::types::{Event, Kind, LikeRecord};
use crate::transport::EventStream;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

/// What happened to a live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeOutcome {
    Applied,
    Stale,
    Ignored,
}

pub struct RealtimeProcessor {
    local: Arc<LocalLikes>,
}

impl RealtimeProcessor {
    pub fn new(local: Arc<LocalLikes>) -> Self {
        Self { local }
    }

    pub async fn process_event(&self, event: &Event) -> Result<RealtimeOutcome, StoreError> {
        if event.kind != Kind::REACTION || !event.reaction_content().is_like() {
            return Ok(RealtimeOutcome::Ignored);
        }
        let Some(record) = LikeRecord::from_reaction(event) else {
            return Ok(RealtimeOutcome::Ignored);
        };

        if self.local.apply_if_newer(record).await? {
            debug!(
                target_event_id = event.reaction_target(),
                reaction_event_id = %event.id,
                "Applied live like"
            );
            Ok(RealtimeOutcome::Applied)
        } else {
            trace!(reaction_event_id = %event.id, "Discarded stale live like");
            Ok(RealtimeOutcome::Stale)
        }
    }

    /// Consume `events` until the stream ends or shutdown is signalled.
    pub async fn run(self, mut events: EventStream, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Starting real-time like processor");

        let mut applied: u64 = 0;
        let mut stale: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(applied, stale, "Real-time like processor received shutdown signal");
                    break;
                }

                next = events.next() => {
                    let Some(event) = next else {
                        info!(applied, stale, "Live event stream closed, processor stopping");
                        break;
                    };
                    match self.process_event(&event).await {
                        Ok(RealtimeOutcome::Applied) => applied += 1,
                        Ok(RealtimeOutcome::Stale) => stale += 1,
                        Ok(RealtimeOutcome::Ignored) => {}
                        Err(e) => error!(reaction_event_id = %event.id, "Failed to store live like: {}", e),
                    }
                }
            }
        }
    }

    /// Run on a background task.
    pub fn spawn(self, events: EventStream) -> RealtimeHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(self.run(events, shutdown_rx));
        RealtimeHandle { shutdown_tx, task }
    }
}

/// Owner of a running processor task.
pub struct RealtimeHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl RealtimeHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Real-time like processor task panicked: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDurableStore;
    use crate::test_helper::{deletion, like, reaction};
    use futures::stream;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn processor() -> (RealtimeProcessor, Arc<LocalLikes>) {
        let local = Arc::new(LocalLikes::new(Arc::new(MemoryDurableStore::new())));
        (RealtimeProcessor::new(local.clone()), local)
    }

    #[tokio::test]
    async fn test_applies_new_like() {
        let (processor, local) = processor();
        let outcome = processor.process_event(&like("r1", "t1", 10)).await.unwrap();

        assert_eq!(outcome, RealtimeOutcome::Applied);
        assert_eq!(local.index().reaction_id("t1"), Some("r1".to_string()));
        assert!(local.store().like_record("t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_discards_stale_like() {
        let (processor, local) = processor();
        local.insert(LikeRecord::new("t1", "r-new", 20)).await.unwrap();

        let older = processor.process_event(&like("r-old", "t1", 10)).await.unwrap();
        let same = processor.process_event(&like("r-same", "t1", 20)).await.unwrap();

        assert_eq!(older, RealtimeOutcome::Stale);
        assert_eq!(same, RealtimeOutcome::Stale);
        assert_eq!(local.index().reaction_id("t1"), Some("r-new".to_string()));
    }

    #[tokio::test]
    async fn test_replaces_with_newer_like() {
        let (processor, local) = processor();
        local.insert(LikeRecord::new("t1", "r-old", 10)).await.unwrap();

        let outcome = processor.process_event(&like("r-new", "t1", 20)).await.unwrap();
        assert_eq!(outcome, RealtimeOutcome::Applied);
        assert_eq!(local.index().reaction_id("t1"), Some("r-new".to_string()));
    }

    #[tokio::test]
    async fn test_ignores_other_content_and_deletions() {
        let (processor, local) = processor();
        local.insert(LikeRecord::new("t1", "r1", 10)).await.unwrap();

        let dislike = processor
            .process_event(&reaction("r2", "t2", 20, "-"))
            .await
            .unwrap();
        let delete = processor
            .process_event(&deletion("d1", &["r1"], 30))
            .await
            .unwrap();

        assert_eq!(dislike, RealtimeOutcome::Ignored);
        assert_eq!(delete, RealtimeOutcome::Ignored);
        assert!(local.index().is_liked("t1"));
        assert!(!local.index().is_liked("t2"));
    }

    #[tokio::test]
    async fn test_run_stops_when_stream_ends() {
        let (processor, local) = processor();
        let events = stream::iter(vec![like("r1", "t1", 10), like("r2", "t2", 11)]).boxed();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        processor.run(events, shutdown_rx).await;
        assert_eq!(local.index().ordered_ids(), vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn test_handle_shutdown_stops_open_stream() {
        let (processor, local) = processor();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = processor.spawn(UnboundedReceiverStream::new(rx).boxed());

        tx.send(like("r1", "t1", 10)).unwrap();
        for _ in 0..50 {
            if local.index().is_liked("t1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(local.index().is_liked("t1"));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
    }
}
