//! Boundary to the relay client.
//!
//! The transport signs and publishes events, answers historical queries and
//! counts, and streams live events. Signature verification, relay selection
//! and timeouts all live behind this trait.

use crate::core::error::TransportError;
use crate::core::types::{CountResult, Event, Filter, ReactionContent};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of live events for an open subscription.
pub type EventStream = BoxStream<'static, Event>;

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Publish a reaction to `target_id`. `Ok(None)` means every relay
    /// rejected the event.
    async fn send_like(
        &self,
        target_id: &str,
        content: ReactionContent,
        addressable_id: Option<&str>,
        target_author_pubkey: &str,
        target_kind: Option<u16>,
    ) -> Result<Option<Event>, TransportError>;

    /// Publish a deletion of `reaction_event_id`. `Ok(None)` means every relay
    /// rejected the event.
    async fn delete_event(&self, reaction_event_id: &str)
        -> Result<Option<Event>, TransportError>;

    async fn query_events(&self, filters: Vec<Filter>) -> Result<Vec<Event>, TransportError>;

    async fn count_events(&self, filter: Filter) -> Result<CountResult, TransportError>;

    /// Open a live subscription. The stream ends when the subscription closes.
    async fn subscribe(
        &self,
        filters: Vec<Filter>,
        subscription_id: &str,
    ) -> Result<EventStream, TransportError>;

    /// Whether the current identity can sign events.
    fn has_keys(&self) -> bool;

    /// Hex public key of the current identity.
    fn public_key(&self) -> String;
}
