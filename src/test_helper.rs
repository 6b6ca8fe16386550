//! Scriptable in-process transport and event builders for tests.

use crate::core::error::{StoreError, TransportError};
use crate::core::types::{CountResult, Event, Filter, Kind, LikeRecord, ReactionContent, Tag};
use crate::storage::{DurableStore, LikedIdsStream, MemoryDurableStore};
use crate::transport::{EventStream, EventTransport};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const PUBKEY_FOR_TEST: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
pub const AUTHOR_FOR_TEST: &str = "f00df00df00df00df00df00df00df00df00df00df00df00df00df00df00df00d";

/// First timestamp handed out by [`FakeTransport`].
pub const BASE_TIME: u64 = 1_700_000_000;

pub fn reaction(id: &str, target: &str, created_at: u64, content: &str) -> Event {
    Event {
        id: id.to_string(),
        pubkey: PUBKEY_FOR_TEST.to_string(),
        kind: Kind::REACTION,
        created_at,
        tags: vec![Tag::event(target), Tag::pubkey(AUTHOR_FOR_TEST)],
        content: content.to_string(),
    }
}

pub fn like(id: &str, target: &str, created_at: u64) -> Event {
    reaction(id, target, created_at, "+")
}

pub fn addressable_like(id: &str, target: &str, coordinate: &str, created_at: u64) -> Event {
    let mut event = like(id, target, created_at);
    event.tags.push(Tag::address(coordinate));
    event
}

pub fn deletion(id: &str, reaction_ids: &[&str], created_at: u64) -> Event {
    Event {
        id: id.to_string(),
        pubkey: PUBKEY_FOR_TEST.to_string(),
        kind: Kind::DELETION,
        created_at,
        tags: reaction_ids.iter().map(|r| Tag::event(*r)).collect(),
        content: String::new(),
    }
}

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    SendLike { target_id: String },
    DeleteEvent { reaction_event_id: String },
    Query { filters: Vec<Filter> },
    Count { filter: Filter },
    Subscribe { subscription_id: String },
}

/// In-memory relay. Published events become queryable; counts can be
/// scripted per tag value.
pub struct FakeTransport {
    pubkey: String,
    has_keys: AtomicBool,
    events: Mutex<Vec<Event>>,
    scripted_counts: Mutex<HashMap<(char, String), u64>>,
    calls: Mutex<Vec<TransportCall>>,
    live: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    clock: AtomicU64,
    next_id: AtomicU64,
    queries_open: watch::Sender<bool>,
    pub reject_publish: AtomicBool,
    pub reject_delete: AtomicBool,
    pub fail_query: AtomicBool,
    pub fail_count: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::with_pubkey(PUBKEY_FOR_TEST)
    }

    pub fn with_pubkey(pubkey: &str) -> Self {
        Self {
            pubkey: pubkey.to_string(),
            has_keys: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
            scripted_counts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            live: Mutex::new(None),
            clock: AtomicU64::new(BASE_TIME),
            next_id: AtomicU64::new(1),
            queries_open: watch::Sender::new(true),
            reject_publish: AtomicBool::new(false),
            reject_delete: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            fail_count: AtomicBool::new(false),
        }
    }

    /// A transport without signing keys.
    pub fn read_only() -> Self {
        let transport = Self::new();
        transport.has_keys.store(false, Ordering::SeqCst);
        transport
    }

    pub fn seed(&self, events: Vec<Event>) {
        self.events.lock().extend(events);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Script the count returned for a single-valued `#e` (`'e'`) or `#a`
    /// (`'a'`) filter.
    pub fn script_count(&self, tag: char, value: &str, count: u64) {
        self.scripted_counts
            .lock()
            .insert((tag, value.to_string()), count);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::DeleteEvent { .. }))
            .count()
    }

    pub fn send_like_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::SendLike { .. }))
            .count()
    }

    pub fn set_fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_publish(&self, reject: bool) {
        self.reject_publish.store(reject, Ordering::SeqCst);
    }

    pub fn set_reject_delete(&self, reject: bool) {
        self.reject_delete.store(reject, Ordering::SeqCst);
    }

    pub fn set_fail_count(&self, fail: bool) {
        self.fail_count.store(fail, Ordering::SeqCst);
    }

    /// Make `query_events` wait until [`FakeTransport::release_queries`].
    /// Calls are still recorded when they start.
    pub fn hold_queries(&self) {
        self.queries_open.send_replace(false);
    }

    pub fn release_queries(&self) {
        self.queries_open.send_replace(true);
    }

    pub fn query_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, TransportCall::Query { .. }))
            .count()
    }

    /// Push an event to the open live subscription. Returns false when no
    /// subscription is open.
    pub fn push_live(&self, event: Event) -> bool {
        match self.live.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.live
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Strictly increasing timestamps.
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    fn next_event_id(&self, prefix: &str) -> String {
        format!("{}{:04}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    fn scripted_count(&self, filter: &Filter) -> Option<u64> {
        let scripted = self.scripted_counts.lock();
        match (filter.event_refs.as_slice(), filter.address_refs.as_slice()) {
            ([id], []) => scripted.get(&('e', id.clone())).copied(),
            ([], [coord]) => scripted.get(&('a', coord.clone())).copied(),
            _ => None,
        }
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventTransport for FakeTransport {
    async fn send_like(
        &self,
        target_id: &str,
        content: ReactionContent,
        addressable_id: Option<&str>,
        target_author_pubkey: &str,
        target_kind: Option<u16>,
    ) -> Result<Option<Event>, TransportError> {
        self.record(TransportCall::SendLike {
            target_id: target_id.to_string(),
        });
        if self.reject_publish.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut tags = vec![Tag::event(target_id), Tag::pubkey(target_author_pubkey)];
        if let Some(coord) = addressable_id {
            tags.push(Tag::address(coord));
        }
        if let Some(kind) = target_kind {
            tags.push(Tag::kind(kind));
        }
        let event = Event {
            id: self.next_event_id("reaction"),
            pubkey: self.pubkey.clone(),
            kind: Kind::REACTION,
            created_at: self.tick(),
            tags,
            content: content.to_string(),
        };
        self.events.lock().push(event.clone());
        Ok(Some(event))
    }

    async fn delete_event(
        &self,
        reaction_event_id: &str,
    ) -> Result<Option<Event>, TransportError> {
        self.record(TransportCall::DeleteEvent {
            reaction_event_id: reaction_event_id.to_string(),
        });
        if self.reject_delete.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let event = Event {
            id: self.next_event_id("deletion"),
            pubkey: self.pubkey.clone(),
            kind: Kind::DELETION,
            created_at: self.tick(),
            tags: vec![Tag::event(reaction_event_id)],
            content: String::new(),
        };
        self.events.lock().push(event.clone());
        Ok(Some(event))
    }

    async fn query_events(&self, filters: Vec<Filter>) -> Result<Vec<Event>, TransportError> {
        self.record(TransportCall::Query {
            filters: filters.clone(),
        });
        let mut open = self.queries_open.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::SubscriptionClosed);
        }
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(TransportError::Network("relay unreachable".to_string()));
        }
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|event| filters.iter().any(|f| f.matches(event)))
            .cloned()
            .collect())
    }

    async fn count_events(&self, filter: Filter) -> Result<CountResult, TransportError> {
        self.record(TransportCall::Count {
            filter: filter.clone(),
        });
        if self.fail_count.load(Ordering::SeqCst) {
            return Err(TransportError::Network("count unsupported".to_string()));
        }
        if let Some(count) = self.scripted_count(&filter) {
            return Ok(CountResult { count });
        }
        let count = self
            .events
            .lock()
            .iter()
            .filter(|event| filter.matches(event))
            .count() as u64;
        Ok(CountResult { count })
    }

    async fn subscribe(
        &self,
        _filters: Vec<Filter>,
        subscription_id: &str,
    ) -> Result<EventStream, TransportError> {
        self.record(TransportCall::Subscribe {
            subscription_id: subscription_id.to_string(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn has_keys(&self) -> bool {
        self.has_keys.load(Ordering::SeqCst)
    }

    fn public_key(&self) -> String {
        self.pubkey.clone()
    }
}

/// Memory store whose writes can be made to fail.
pub struct FailingStore {
    inner: MemoryDurableStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryDurableStore::new(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk full".to_string()));
        }
        Ok(())
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for FailingStore {
    async fn all_like_records(&self) -> Result<Vec<LikeRecord>, StoreError> {
        self.inner.all_like_records().await
    }

    async fn like_record(&self, target_event_id: &str) -> Result<Option<LikeRecord>, StoreError> {
        self.inner.like_record(target_event_id).await
    }

    async fn save_like_record(&self, record: &LikeRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.save_like_record(record).await
    }

    async fn save_like_records_batch(&self, records: &[LikeRecord]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.save_like_records_batch(records).await
    }

    async fn delete_like_record(&self, target_event_id: &str) -> Result<bool, StoreError> {
        self.check_writable()?;
        self.inner.delete_like_record(target_event_id).await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.clear_all().await
    }

    fn watch_liked_event_ids(&self) -> LikedIdsStream {
        self.inner.watch_liked_event_ids()
    }

    fn notify_liked_ids(&self, ids: &HashSet<String>) {
        self.inner.notify_liked_ids(ids)
    }

    fn close(&self) {
        self.inner.close()
    }
}
