//! Interest-set matching and event filtering.
//!
//! A [`SubscribeRequest`] names the topics a subscriber cares about and, per
//! topic, the keys within it. The wildcard key [`ALL_KEYS`] matches every
//! key of its topic; an entry under the wildcard topic [`ALL_TOPICS`]
//! applies its keys to events of any topic.
//!
//! [`filter_events`] is deliberately two-pass: it counts matches first so
//! the common cases — nothing matches, or everything matches — allocate
//! nothing and, for a full match, return the input batch by identity.
//! Aliasing the input is safe because events are immutable once published.

use std::sync::Arc;

use fxhash::FxHashMap;

use super::event::{Event, ALL_KEYS, ALL_TOPICS};

/// The topic/key interest set of one subscription.
///
/// Built with the consuming [`topic`](SubscribeRequest::topic) builder:
///
/// ```rust
/// use weir_core::stream::{SubscribeRequest, ALL_KEYS};
///
/// let req = SubscribeRequest::new()
///     .topic("jobs", [ALL_KEYS])
///     .topic("nodes", ["node-1", "node-2"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscribeRequest {
    topics: FxHashMap<String, Vec<String>>,
}

impl SubscribeRequest {
    /// Creates an empty interest set, which matches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds interest in `keys` of `topic`, replacing any previous entry for
    /// that topic. Use [`ALL_KEYS`] to match every key, and [`ALL_TOPICS`]
    /// as the topic to apply the keys to every topic.
    #[must_use]
    pub fn topic<I, S>(mut self, topic: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics
            .insert(topic.into(), keys.into_iter().map(Into::into).collect());
        self
    }

    /// Returns `true` if an event with `topic` and `key` is of interest.
    #[must_use]
    pub fn matches(&self, topic: &str, key: &str) -> bool {
        self.topics
            .get(topic)
            .into_iter()
            .chain(self.topics.get(ALL_TOPICS))
            .any(|keys| keys.iter().any(|k| k == key || k == ALL_KEYS))
    }
}

/// Filters a published batch down to the events a request is interested in.
///
/// Order is preserved. Returns the input batch itself (no copy) when every
/// event matches, and an empty batch when none do; only a partial match
/// allocates, sized exactly to the match count.
#[must_use]
pub fn filter_events<T: Clone>(req: &SubscribeRequest, events: &Arc<[Event<T>]>) -> Arc<[Event<T>]> {
    if events.is_empty() {
        return Arc::clone(events);
    }

    let count = events
        .iter()
        .filter(|e| req.matches(&e.topic, &e.key))
        .count();
    if count == 0 {
        return Vec::new().into();
    }
    if count == events.len() {
        return Arc::clone(events);
    }

    let mut matched = Vec::with_capacity(count);
    for event in events.iter() {
        if req.matches(&event.topic, &event.key) {
            matched.push(event.clone());
        }
    }
    matched.into()
}
