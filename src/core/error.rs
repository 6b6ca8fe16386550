use thiserror::Error;

/// Failures reported by the event transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected by relays: {0}")]
    Rejected(String),

    #[error("No signing keys available")]
    NoKeys,

    #[error("Subscription closed")]
    SubscriptionClosed,
}

/// Failures reported by a durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors surfaced by the like repository.
#[derive(Error, Debug)]
pub enum LikeError {
    #[error("Event {0} is already liked")]
    AlreadyLiked(String),

    #[error("Event {0} is not liked")]
    NotLiked(String),

    #[error("Failed to like {target_event_id}: {reason}")]
    LikeFailed {
        target_event_id: String,
        reason: String,
    },

    #[error("Failed to unlike {target_event_id}: {reason}")]
    UnlikeFailed {
        target_event_id: String,
        reason: String,
    },

    #[error("Failed to sync reactions: {0}")]
    SyncFailed(String),

    #[error("Failed to fetch likes of {pubkey}: {reason}")]
    FetchLikesFailed { pubkey: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LikeError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LikeError::AlreadyLiked(_) => "like.already_liked",
            LikeError::NotLiked(_) => "like.not_liked",
            LikeError::LikeFailed { .. } => "like.publish_failed",
            LikeError::UnlikeFailed { .. } => "unlike.publish_failed",
            LikeError::SyncFailed(_) => "sync.failed",
            LikeError::FetchLikesFailed { .. } => "fetch_likes.failed",
            LikeError::Storage(_) => "db.internal_error",
        }
    }

    /// Recoverable errors mean the local state already matches what the
    /// caller asked for; callers may treat them as success.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LikeError::AlreadyLiked(_) | LikeError::NotLiked(_))
    }

    pub(crate) fn like_failed(target_event_id: &str, reason: impl ToString) -> Self {
        LikeError::LikeFailed {
            target_event_id: target_event_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unlike_failed(target_event_id: &str, reason: impl ToString) -> Self {
        LikeError::UnlikeFailed {
            target_event_id: target_event_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LikeError::AlreadyLiked("x".into()).code(),
            "like.already_liked"
        );
        assert_eq!(
            LikeError::like_failed("x", "rejected").code(),
            "like.publish_failed"
        );
        assert_eq!(
            LikeError::Storage(StoreError::Storage("disk full".into())).code(),
            "db.internal_error"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(LikeError::AlreadyLiked("x".into()).is_recoverable());
        assert!(LikeError::NotLiked("x".into()).is_recoverable());
        assert!(!LikeError::SyncFailed("boom".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = LikeError::unlike_failed("abc", TransportError::Network("timeout".into()));
        assert_eq!(
            err.to_string(),
            "Failed to unlike abc: Network error: timeout"
        );
    }
}
