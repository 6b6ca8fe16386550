//! Full reconciliation of the current identity's likes against the network.
//!
//! # Algorithm
//!
//! 1. Query reaction events authored by the identity.
//! 2. Query deletion events authored by the identity.
//! 3. Collect every `e`-referenced id of every deletion into a deletion set.
//! 4. Keep like reactions only.
//! 5. Drop reactions whose id is in the deletion set.
//! 6. Keep the newest reaction per target.
//! 7. Order targets newest first.
//! 8. Write the winners to local state and drop local records the network no
//!    longer has. A local record survives only if it is a placeholder (not
//!    published yet) or is newer than every fetched reaction and not deleted
//!    (published after the query was answered).
//!
//! If the network query fails, whatever is stored locally is returned instead.

use super::state::LocalLikes;
use crate::core::error::LikeError;
use crate::core::types::{Event, Filter, Kind, LikeRecord, ReconciliationResult};
use crate::transport::EventTransport;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ids of every event referenced by the given deletion events.
pub fn deletion_set(deletions: &[Event]) -> HashSet<String> {
    deletions
        .iter()
        .filter(|event| event.kind == Kind::DELETION)
        .flat_map(|event| event.referenced_event_ids())
        .map(str::to_string)
        .collect()
}

/// Newest like per target, newest first. Reactions with other content,
/// without a target, or listed in `deleted` are skipped.
pub fn latest_likes(reactions: &[Event], deleted: &HashSet<String>) -> Vec<LikeRecord> {
    let mut latest: HashMap<String, LikeRecord> = HashMap::new();
    for event in reactions {
        if !event.is_like() || deleted.contains(&event.id) {
            continue;
        }
        let Some(record) = LikeRecord::from_reaction(event) else {
            continue;
        };
        match latest.get(&record.target_event_id) {
            Some(existing) if !prefer(&record, existing) => {}
            _ => {
                latest.insert(record.target_event_id.clone(), record);
            }
        }
    }

    let mut records: Vec<LikeRecord> = latest.into_values().collect();
    records.sort_by(newest_first);
    records
}

/// Newest first, ties by target id.
pub fn newest_first(a: &LikeRecord, b: &LikeRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.target_event_id.cmp(&b.target_event_id))
}

// Equal timestamps fall back to the reaction id so the winner does not depend
// on the order relays returned the events in.
fn prefer(candidate: &LikeRecord, existing: &LikeRecord) -> bool {
    candidate.created_at > existing.created_at
        || (candidate.created_at == existing.created_at
            && candidate.reaction_event_id > existing.reaction_event_id)
}

/// Steps 3-7 over already fetched events.
pub fn reconcile(reactions: &[Event], deletions: &[Event]) -> Vec<LikeRecord> {
    let deleted = deletion_set(deletions);
    latest_likes(reactions, &deleted)
}

pub struct ReconciliationEngine {
    transport: Arc<dyn EventTransport>,
    local: Arc<LocalLikes>,
    history_limit: usize,
}

impl ReconciliationEngine {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        local: Arc<LocalLikes>,
        history_limit: usize,
    ) -> Self {
        Self {
            transport,
            local,
            history_limit,
        }
    }

    /// Run a full reconciliation for the current identity.
    pub async fn sync_user_reactions(&self) -> Result<ReconciliationResult, LikeError> {
        if !self.transport.has_keys() {
            debug!("No signing keys, returning local likes without syncing");
            return Ok(ReconciliationResult::from_records(
                &self.local.index().ordered_records(),
            ));
        }

        let pubkey = self.transport.public_key();
        let (reactions, deletions) = match self.fetch(&pubkey).await {
            Ok(events) => events,
            Err(reason) => return self.fallback(reason).await,
        };

        let deleted = deletion_set(&deletions);
        let records = latest_likes(&reactions, &deleted);
        info!(
            reactions = reactions.len(),
            deletions = deletions.len(),
            liked = records.len(),
            "Reconciled reactions"
        );

        let newest_fetched = reactions.iter().map(|event| event.created_at).max();
        self.apply(&records, &deleted, newest_fetched).await?;
        Ok(ReconciliationResult::from_records(&records))
    }

    async fn fetch(&self, pubkey: &str) -> Result<(Vec<Event>, Vec<Event>), String> {
        let reactions = Filter::new()
            .author(pubkey)
            .kind(Kind::REACTION)
            .limit(self.history_limit);
        let deletions = Filter::new()
            .author(pubkey)
            .kind(Kind::DELETION)
            .limit(self.history_limit);

        futures::try_join!(
            self.transport.query_events(vec![reactions]),
            self.transport.query_events(vec![deletions]),
        )
        .map_err(|e| e.to_string())
    }

    async fn apply(
        &self,
        records: &[LikeRecord],
        deleted: &HashSet<String>,
        newest_fetched: Option<u64>,
    ) -> Result<(), LikeError> {
        let confirmed: HashSet<&str> = records
            .iter()
            .map(|r| r.target_event_id.as_str())
            .collect();
        let survives = |local: &LikeRecord| {
            local.is_pending()
                || (!deleted.contains(&local.reaction_event_id)
                    && newest_fetched.is_some_and(|newest| local.created_at > newest))
        };

        let mut updates = Vec::new();
        for winner in records {
            let current = self.local.lookup(&winner.target_event_id).await?;
            let keep_local = current.is_some_and(|local| {
                local.reaction_event_id == winner.reaction_event_id || survives(&local)
            });
            if !keep_local {
                updates.push(winner.clone());
            }
        }

        let written = self.local.replace_batch(updates).await?;
        let removed = self
            .local
            .remove_where(|r| !confirmed.contains(r.target_event_id.as_str()) && !survives(r))
            .await?;

        debug!(written, removed = removed.len(), "Applied reconciliation to local state");
        Ok(())
    }

    async fn fallback(&self, reason: String) -> Result<ReconciliationResult, LikeError> {
        let stored = match self.local.store().all_like_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to read stored likes during sync fallback: {}", e);
                Vec::new()
            }
        };
        let mut records = if stored.is_empty() {
            self.local.index().ordered_records()
        } else {
            stored
        };

        if records.is_empty() {
            return Err(LikeError::SyncFailed(reason));
        }

        records.sort_by(newest_first);
        warn!(
            local = records.len(),
            "Reaction query failed, using local likes: {}", reason
        );
        Ok(ReconciliationResult::from_records(&records))
    }
}
