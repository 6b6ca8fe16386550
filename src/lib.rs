pub mod cfg;
pub mod core;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod test_helper;
pub mod transport;
pub mod utils;


pub use crate::core::error::{LikeError, StoreError, TransportError};
pub use crate::core::types::{LikeRecord, LikeRequest, ReconciliationResult};
pub use repository::{Repository, RepositoryBuilder};
