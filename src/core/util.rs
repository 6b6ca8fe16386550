use crate::core::types::PENDING_REACTION_PREFIX;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Fresh placeholder reaction id: `pending_like_<16 hex chars>`.
pub fn pending_reaction_id() -> String {
    let suffix: [u8; 8] = rand::random();
    format!("{}{}", PENDING_REACTION_PREFIX, hex::encode(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::is_pending_reaction_id;

    #[test]
    fn test_pending_reaction_id() {
        let a = pending_reaction_id();
        let b = pending_reaction_id();
        assert!(is_pending_reaction_id(&a));
        assert_eq!(a.len(), PENDING_REACTION_PREFIX.len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2023-11-14
        assert!(unix_now() > 1_700_000_000);
    }
}
