//! Like counts across the two addressing schemes.
//!
//! A logical item can be referenced by its immutable event id (`#e`) or by its
//! addressable coordinate (`#a`), depending on the client that reacted. The
//! two counts overlap by an unknown amount, so the larger one is reported.
//!
//! Both forms count every reaction event (kind 7) that references the item,
//! whatever its content, because relays can only count by tag. The batch form
//! matches tags the same way a relay does, so it agrees with the single form.

use crate::core::types::{Event, Filter, Kind};
use crate::transport::EventTransport;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CountAggregator {
    transport: Arc<dyn EventTransport>,
}

impl CountAggregator {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }

    /// Likes of a single item: max of the relay's `#e` and `#a` counts of
    /// reaction events.
    pub async fn like_count(&self, target_event_id: &str, addressable_id: Option<&str>) -> u64 {
        let by_event = self.count(
            Filter::new()
                .kind(Kind::REACTION)
                .event_refs([target_event_id]),
        );

        let count = match addressable_id.filter(|id| !id.is_empty()) {
            Some(coordinate) => {
                let by_address =
                    self.count(Filter::new().kind(Kind::REACTION).address_refs([coordinate]));
                let (e_count, a_count) = futures::join!(by_event, by_address);
                e_count.max(a_count)
            }
            None => by_event.await,
        };

        debug!(target_event_id, count, "Fetched like count");
        count
    }

    /// Likes of many items. `addressable_ids` maps target event ids to their
    /// coordinates. Every requested id gets an entry. Reaction events are
    /// fetched and counted locally with the same rule as [`Self::like_count`].
    pub async fn like_counts(
        &self,
        target_event_ids: &[String],
        addressable_ids: &HashMap<String, String>,
    ) -> HashMap<String, u64> {
        if target_event_ids.is_empty() {
            return HashMap::new();
        }

        let targets: Vec<&String> = target_event_ids.iter().unique().collect();
        let mut targets_by_coordinate: HashMap<&str, Vec<&str>> = HashMap::new();
        for target in &targets {
            if let Some(coordinate) = addressable_ids.get(*target).filter(|c| !c.is_empty()) {
                targets_by_coordinate
                    .entry(coordinate.as_str())
                    .or_default()
                    .push(target.as_str());
            }
        }

        let by_event = self.query_reactions(
            Filter::new()
                .kind(Kind::REACTION)
                .event_refs(targets.iter().map(|t| t.as_str())),
            "#e",
        );
        let by_address = async {
            if targets_by_coordinate.is_empty() {
                return Vec::new();
            }
            self.query_reactions(
                Filter::new()
                    .kind(Kind::REACTION)
                    .address_refs(targets_by_coordinate.keys().copied()),
                "#a",
            )
            .await
        };
        let (event_reactions, address_reactions) = futures::join!(by_event, by_address);

        let mut e_counts: HashMap<&str, u64> = HashMap::new();
        for event in &event_reactions {
            for target in event.tag_values("e").unique() {
                *e_counts.entry(target).or_default() += 1;
            }
        }

        let mut a_counts: HashMap<&str, u64> = HashMap::new();
        for event in &address_reactions {
            for coordinate in event.tag_values("a").unique() {
                for target in targets_by_coordinate.get(coordinate).into_iter().flatten() {
                    *a_counts.entry(*target).or_default() += 1;
                }
            }
        }

        targets
            .into_iter()
            .map(|target| {
                let e = e_counts.get(target.as_str()).copied().unwrap_or(0);
                let a = a_counts.get(target.as_str()).copied().unwrap_or(0);
                (target.clone(), e.max(a))
            })
            .collect()
    }

    async fn count(&self, filter: Filter) -> u64 {
        match self.transport.count_events(filter).await {
            Ok(result) => result.count,
            Err(e) => {
                warn!("Like count query failed, counting as 0: {}", e);
                0
            }
        }
    }

    /// Reaction events matching `filter`, deduplicated by event id.
    async fn query_reactions(&self, filter: Filter, scheme: &str) -> Vec<Event> {
        match self.transport.query_events(vec![filter]).await {
            Ok(events) => {
                let mut seen = HashSet::new();
                events
                    .into_iter()
                    .filter(|event| event.kind == Kind::REACTION && seen.insert(event.id.clone()))
                    .collect()
            }
            Err(e) => {
                warn!(scheme, "Batch like query failed, counting as 0: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helper::{addressable_like, like, reaction, FakeTransport, TransportCall};

    const COORD: &str = "30023:f00d:article";

    fn aggregator(transport: &Arc<FakeTransport>) -> CountAggregator {
        CountAggregator::new(transport.clone())
    }

    #[tokio::test]
    async fn test_count_is_max_not_sum() {
        let transport = Arc::new(FakeTransport::new());
        transport.script_count('e', "t1", 20);
        transport.script_count('a', COORD, 5);
        assert_eq!(aggregator(&transport).like_count("t1", Some(COORD)).await, 20);

        transport.script_count('e', "t1", 10);
        transport.script_count('a', COORD, 15);
        assert_eq!(aggregator(&transport).like_count("t1", Some(COORD)).await, 15);
    }

    #[tokio::test]
    async fn test_empty_addressable_id_skips_a_query() {
        let transport = Arc::new(FakeTransport::new());
        transport.script_count('e', "t1", 3);

        assert_eq!(aggregator(&transport).like_count("t1", Some("")).await, 3);
        assert_eq!(aggregator(&transport).like_count("t1", None).await, 3);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_count_failure_counts_as_zero() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_fail_count(true);
        assert_eq!(aggregator(&transport).like_count("t1", Some(COORD)).await, 0);
    }

    #[tokio::test]
    async fn test_batch_empty_input_makes_no_calls() {
        let transport = Arc::new(FakeTransport::new());
        let counts = aggregator(&transport)
            .like_counts(&[], &HashMap::new())
            .await;
        assert!(counts.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_batch_merges_schemes_with_max() {
        let transport = Arc::new(FakeTransport::new());
        transport.seed(vec![
            // t1: three by event id, one by coordinate only
            like("e1", "t1", 1),
            like("e2", "t1", 2),
            like("e3", "t1", 3),
            addressable_like("a1", "old-revision", COORD, 4),
            // t2: a like and a dislike, both reactions
            like("e4", "t2", 5),
            reaction("e5", "t2", 6, "-"),
        ]);
        let addressable = HashMap::from([("t1".to_string(), COORD.to_string())]);

        let counts = aggregator(&transport)
            .like_counts(
                &["t1".to_string(), "t2".to_string(), "t3".to_string()],
                &addressable,
            )
            .await;

        assert_eq!(counts["t1"], 3);
        assert_eq!(counts["t2"], 2);
        assert_eq!(counts["t3"], 0);
    }

    #[tokio::test]
    async fn test_single_and_batch_counts_agree() {
        let transport = Arc::new(FakeTransport::new());
        transport.seed(vec![
            like("e1", "t1", 1),
            reaction("e2", "t1", 2, "-"),
            reaction("e3", "t1", 3, "🔥"),
            addressable_like("a1", "rev1", COORD, 4),
            like("e4", "t2", 5),
            reaction("e5", "t2", 6, "-"),
        ]);
        let addressable = HashMap::from([("t1".to_string(), COORD.to_string())]);
        let targets = ["t1".to_string(), "t2".to_string()];

        let batch = aggregator(&transport)
            .like_counts(&targets, &addressable)
            .await;

        for target in &targets {
            let single = aggregator(&transport)
                .like_count(target, addressable.get(target).map(String::as_str))
                .await;
            assert_eq!(batch[target], single, "count of {target}");
        }
        assert_eq!(batch["t1"], 3);
        assert_eq!(batch["t2"], 2);
    }

    #[tokio::test]
    async fn test_batch_address_scheme_can_win() {
        let transport = Arc::new(FakeTransport::new());
        transport.seed(vec![
            like("e1", "t1", 1),
            addressable_like("a1", "rev1", COORD, 2),
            addressable_like("a2", "rev2", COORD, 3),
        ]);
        let addressable = HashMap::from([("t1".to_string(), COORD.to_string())]);

        let counts = aggregator(&transport)
            .like_counts(&["t1".to_string()], &addressable)
            .await;
        assert_eq!(counts["t1"], 2);
    }

    #[tokio::test]
    async fn test_batch_without_coordinates_runs_one_query() {
        let transport = Arc::new(FakeTransport::new());
        transport.seed(vec![like("e1", "t1", 1)]);

        let counts = aggregator(&transport)
            .like_counts(&["t1".to_string(), "t1".to_string()], &HashMap::new())
            .await;

        assert_eq!(counts.len(), 1);
        assert_eq!(counts["t1"], 1);
        let queries = transport
            .calls()
            .into_iter()
            .filter(|c| matches!(c, TransportCall::Query { .. }))
            .count();
        assert_eq!(queries, 1);
    }
}
