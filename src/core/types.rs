use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Prefix of locally synthesized reaction ids for likes not yet published.
pub const PENDING_REACTION_PREFIX: &str = "pending_like_";

/// Content marker of a like reaction.
pub const LIKE_CONTENT: &str = "+";

/// Event kind number on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(pub u16);

impl Kind {
    pub const DELETION: Kind = Kind(5);
    pub const REACTION: Kind = Kind(7);

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single event tag, e.g. `["e", "<event id>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(fields.into_iter().map(Into::into).collect())
    }

    /// Reference to an immutable event id.
    pub fn event(id: impl Into<String>) -> Self {
        Tag(vec!["e".to_string(), id.into()])
    }

    /// Reference to an addressable coordinate (`<kind>:<pubkey>:<d-tag>`).
    pub fn address(coordinate: impl Into<String>) -> Self {
        Tag(vec!["a".to_string(), coordinate.into()])
    }

    pub fn pubkey(pubkey: impl Into<String>) -> Self {
        Tag(vec!["p".to_string(), pubkey.into()])
    }

    pub fn kind(kind: u16) -> Self {
        Tag(vec!["k".to_string(), kind.to_string()])
    }

    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// A signed network event. Signature checks happen in the transport, so the
/// signature itself is not carried here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub kind: Kind,
    pub created_at: u64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
}

impl Event {
    /// Values of all tags with the given name, in tag order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.name() == Some(name))
            .filter_map(Tag::value)
    }

    /// The reacted-to event id. When a reaction carries several `e` tags the
    /// last one is the target.
    pub fn reaction_target(&self) -> Option<&str> {
        self.tag_values("e").last()
    }

    /// The reacted-to addressable coordinate, if any.
    pub fn addressable_target(&self) -> Option<&str> {
        self.tag_values("a").last()
    }

    /// Every event id referenced through an `e` tag.
    pub fn referenced_event_ids(&self) -> impl Iterator<Item = &str> {
        self.tag_values("e")
    }

    pub fn reaction_content(&self) -> ReactionContent {
        ReactionContent::from(self.content.as_str())
    }

    pub fn is_like(&self) -> bool {
        self.kind == Kind::REACTION && self.reaction_content().is_like()
    }
}

/// Content of a reaction event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionContent {
    Like,
    Other(String),
}

impl ReactionContent {
    pub fn is_like(&self) -> bool {
        matches!(self, ReactionContent::Like)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReactionContent::Like => LIKE_CONTENT,
            ReactionContent::Other(content) => content,
        }
    }
}

impl From<&str> for ReactionContent {
    fn from(content: &str) -> Self {
        if content == LIKE_CONTENT {
            ReactionContent::Like
        } else {
            ReactionContent::Other(content.to_string())
        }
    }
}

impl fmt::Display for ReactionContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true for reaction ids synthesized while offline.
pub fn is_pending_reaction_id(reaction_event_id: &str) -> bool {
    reaction_event_id.starts_with(PENDING_REACTION_PREFIX)
}

/// "I liked item X": at most one per target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub target_event_id: String,
    pub reaction_event_id: String,
    pub created_at: u64,
}

impl LikeRecord {
    pub fn new(
        target_event_id: impl Into<String>,
        reaction_event_id: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            target_event_id: target_event_id.into(),
            reaction_event_id: reaction_event_id.into(),
            created_at,
        }
    }

    /// Build a record from a published like reaction. Returns None when the
    /// event has no `e` target.
    pub fn from_reaction(event: &Event) -> Option<Self> {
        let target = event.reaction_target()?;
        Some(Self::new(target, event.id.clone(), event.created_at))
    }

    pub fn is_pending(&self) -> bool {
        is_pending_reaction_id(&self.reaction_event_id)
    }

    /// Newest-wins rule shared by every mutation path.
    pub fn supersedes(&self, existing: &LikeRecord) -> bool {
        self.created_at > existing.created_at
    }
}

/// Parameters of a like action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LikeRequest {
    pub event_id: String,
    pub author_pubkey: String,
    pub addressable_id: Option<String>,
    pub target_kind: Option<u16>,
}

impl LikeRequest {
    pub fn new(event_id: impl Into<String>, author_pubkey: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            author_pubkey: author_pubkey.into(),
            ..Default::default()
        }
    }

    pub fn with_addressable_id(mut self, addressable_id: impl Into<String>) -> Self {
        self.addressable_id = Some(addressable_id.into());
        self
    }

    pub fn with_target_kind(mut self, kind: u16) -> Self {
        self.target_kind = Some(kind);
        self
    }
}

/// Query filter understood by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<Kind>,
    #[serde(rename = "#e", default, skip_serializing_if = "Vec::is_empty")]
    pub event_refs: Vec<String>,
    #[serde(rename = "#a", default, skip_serializing_if = "Vec::is_empty")]
    pub address_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn event_refs<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_refs.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn address_refs<I, S>(mut self, coordinates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.address_refs
            .extend(coordinates.into_iter().map(Into::into));
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// A limit of zero means unbounded.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Whether `event` satisfies every populated field of this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&event.id) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.event_refs.is_empty()
            && !event
                .tag_values("e")
                .any(|id| self.event_refs.iter().any(|r| r == id))
        {
            return false;
        }
        if !self.address_refs.is_empty()
            && !event
                .tag_values("a")
                .any(|coord| self.address_refs.iter().any(|r| r == coord))
        {
            return false;
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        true
    }
}

/// Result of a count query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResult {
    pub count: u64,
}

/// Canonical like set produced by a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// Most recent first, deduplicated.
    pub ordered_target_ids: Vec<String>,
    pub target_to_reaction: HashMap<String, String>,
}

impl ReconciliationResult {
    /// Build from records already sorted newest first.
    pub fn from_records(records: &[LikeRecord]) -> Self {
        Self {
            ordered_target_ids: records
                .iter()
                .map(|r| r.target_event_id.clone())
                .collect(),
            target_to_reaction: records
                .iter()
                .map(|r| (r.target_event_id.clone(), r.reaction_event_id.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ordered_target_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_target_ids.is_empty()
    }
}
