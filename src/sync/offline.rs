//! Like/unlike intents recorded while disconnected, and their replay.

use crate::core::types::{is_pending_reaction_id, LikeRequest};
use crate::repository::Repository;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// A like or unlike made while offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineAction {
    pub is_like: bool,
    pub target_event_id: String,
    pub author_pubkey: Option<String>,
    pub addressable_id: Option<String>,
    pub target_kind: Option<u16>,
    /// For unlikes: the reaction that was removed locally.
    pub reaction_event_id: Option<String>,
}

impl OfflineAction {
    pub fn like(request: &LikeRequest) -> Self {
        Self {
            is_like: true,
            target_event_id: request.event_id.clone(),
            author_pubkey: Some(request.author_pubkey.clone()),
            addressable_id: request.addressable_id.clone(),
            target_kind: request.target_kind,
            reaction_event_id: None,
        }
    }

    pub fn unlike(target_event_id: impl Into<String>, reaction_event_id: Option<String>) -> Self {
        Self {
            is_like: false,
            target_event_id: target_event_id.into(),
            author_pubkey: None,
            addressable_id: None,
            target_kind: None,
            reaction_event_id,
        }
    }

    pub fn like_request(&self) -> LikeRequest {
        LikeRequest {
            event_id: self.target_event_id.clone(),
            author_pubkey: self.author_pubkey.clone().unwrap_or_default(),
            addressable_id: self.addressable_id.clone(),
            target_kind: self.target_kind,
        }
    }

    /// The published reaction this unlike has to delete, if any.
    pub fn published_reaction_id(&self) -> Option<&str> {
        self.reaction_event_id
            .as_deref()
            .filter(|id| !is_pending_reaction_id(id))
    }
}

/// Sink for offline intents. Called exactly once per offline like or unlike.
pub trait OfflineActionQueue: Send + Sync {
    fn enqueue(&self, action: OfflineAction);
}

impl<F> OfflineActionQueue for F
where
    F: Fn(OfflineAction) + Send + Sync,
{
    fn enqueue(&self, action: OfflineAction) {
        self(action)
    }
}

/// Network reachability, consulted before every like and unlike.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

impl<F> Connectivity for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_online(&self) -> bool {
        self()
    }
}

impl Connectivity for AtomicBool {
    fn is_online(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Queue backed by an unbounded channel. The receiving half lives in the
/// paired [`OfflineReplayer`].
#[derive(Clone)]
pub struct ChannelOfflineQueue {
    tx: mpsc::UnboundedSender<OfflineAction>,
}

impl ChannelOfflineQueue {
    pub fn new() -> (Self, OfflineReplayer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, OfflineReplayer::new(rx))
    }
}

impl OfflineActionQueue for ChannelOfflineQueue {
    fn enqueue(&self, action: OfflineAction) {
        debug!(
            target_event_id = %action.target_event_id,
            is_like = action.is_like,
            "Queued offline action"
        );
        if self.tx.send(action).is_err() {
            warn!("Offline replayer is gone, dropping offline action");
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub replayed: usize,
    /// Actions the current local state already satisfied.
    pub skipped: usize,
    /// Actions still waiting after this pass.
    pub remaining: usize,
}

/// Replays queued actions in the order they were made. A transport failure
/// stops the pass and keeps the failed action at the head of the queue.
pub struct OfflineReplayer {
    rx: mpsc::UnboundedReceiver<OfflineAction>,
    pending: VecDeque<OfflineAction>,
}

impl OfflineReplayer {
    fn new(rx: mpsc::UnboundedReceiver<OfflineAction>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
        }
    }

    /// Move everything sent so far into the pending queue.
    pub fn drain(&mut self) -> usize {
        let mut received = 0;
        while let Ok(action) = self.rx.try_recv() {
            self.pending.push_back(action);
            received += 1;
        }
        received
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &OfflineAction> {
        self.pending.iter()
    }

    pub async fn replay_pending(&mut self, repository: &Repository) -> ReplayStats {
        self.drain();
        let mut stats = ReplayStats::default();

        if !repository.is_online() {
            stats.remaining = self.pending.len();
            return stats;
        }

        while let Some(action) = self.pending.pop_front() {
            match repository.replay_offline_action(&action).await {
                Ok(()) => stats.replayed += 1,
                Err(e) if e.is_recoverable() => {
                    debug!(
                        target_event_id = %action.target_event_id,
                        "Offline action already applied: {}", e
                    );
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        target_event_id = %action.target_event_id,
                        code = e.code(),
                        "Offline replay failed, will retry: {}", e
                    );
                    self.pending.push_front(action);
                    break;
                }
            }
        }

        stats.remaining = self.pending.len();
        if stats.replayed > 0 || stats.skipped > 0 {
            info!(
                replayed = stats.replayed,
                skipped = stats.skipped,
                remaining = stats.remaining,
                "Replayed offline actions"
            );
        }
        stats
    }

    /// Replay whenever a new action arrives and every `retry_interval`, until
    /// shutdown or until every queue handle is dropped.
    pub async fn run(
        mut self,
        repository: Arc<Repository>,
        retry_interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Starting offline replayer");
        let mut ticker = tokio::time::interval(retry_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(pending = self.pending.len(), "Offline replayer received shutdown signal");
                    break;
                }

                action = self.rx.recv() => {
                    match action {
                        Some(action) => {
                            self.pending.push_back(action);
                            self.replay_pending(&repository).await;
                        }
                        None => {
                            let stats = self.replay_pending(&repository).await;
                            if stats.remaining > 0 {
                                error!(remaining = stats.remaining, "Offline queue closed with unreplayed actions");
                            }
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if !self.pending.is_empty() {
                        self.replay_pending(&repository).await;
                    }
                }
            }
        }
    }
}
