pub mod counts;
pub mod guard;
pub mod index;
pub mod offline;
pub mod realtime;
pub mod reconcile;
pub mod state;


pub use counts::CountAggregator;
pub use guard::TargetLocks;
pub use index::InMemoryIndex;
pub use offline::{
    ChannelOfflineQueue, Connectivity, OfflineAction, OfflineActionQueue, OfflineReplayer,
    ReplayStats,
};
pub use realtime::{RealtimeHandle, RealtimeOutcome, RealtimeProcessor};
pub use reconcile::ReconciliationEngine;
pub use state::LocalLikes;
