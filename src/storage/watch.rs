use futures::{future, stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::LikedIdsStream;

/// Closable broadcast of liked-id snapshots.
pub(crate) struct LikedIdsBroadcast {
    tx: Mutex<Option<broadcast::Sender<HashSet<String>>>>,
}

impl LikedIdsBroadcast {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// No-op once closed or when nobody listens.
    pub(crate) fn send(&self, ids: HashSet<String>) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(ids);
        }
    }

    /// Subscribe, optionally seeding the stream with a current snapshot.
    pub(crate) fn subscribe(&self, initial: Option<HashSet<String>>) -> LikedIdsStream {
        let rx = match self.tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => return stream::empty().boxed(),
        };
        // A lagged receiver skips to the newest snapshot, which supersedes
        // everything it missed.
        let updates = BroadcastStream::new(rx).filter_map(|item| future::ready(item.ok()));
        match initial {
            Some(ids) => stream::once(future::ready(ids)).chain(updates).boxed(),
            None => updates.boxed(),
        }
    }

    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}
