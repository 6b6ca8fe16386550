pub mod error;
pub mod types;
pub mod util;

pub use error::{LikeError, StoreError, TransportError};
pub use types::{
    CountResult, Event, Filter, Kind, LikeRecord, LikeRequest, ReactionContent,
    ReconciliationResult, Tag,
};
