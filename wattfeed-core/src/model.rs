//! Domain data structures for upstream sources, events, and published datasets.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};

/// Upstream sources known to wattfeed.
pub enum Sources {
    /// Authenticated Octopus Energy GraphQL API.
    Octopus,
    /// Public community-maintained JSON feed.
    Community,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Identifier for an upstream source.
pub struct SourceId(pub String);

impl fmt::Display for Sources {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slug = match self {
            Sources::Octopus => "octopus",
            Sources::Community => "community",
        };
        write!(formatter, "{slug}")
    }
}

impl From<Sources> for SourceId {
    fn from(source: Sources) -> Self {
        SourceId(source.to_string())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
/// Metadata describing an upstream source and its human-friendly name.
pub struct SourceMeta {
    /// Unique identifier, logged as the `source` field.
    pub id: SourceId,
    /// Display name used in logs.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Business key of an event: its start and end instant.
///
/// Ordering is by start first, then end.
pub struct EventKey {
    /// Start of the event window.
    pub start: DateTime<Utc>,
    /// End of the event window.
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A free electricity window.
pub struct Event {
    /// Start of the window, millisecond precision.
    pub start: DateTime<Utc>,
    /// End of the window, millisecond precision.
    pub end: DateTime<Utc>,
    /// Display code, reassigned on every publish.
    pub code: String,
    /// Marks announcements flagged as tests upstream.
    pub is_test: Option<bool>,
}

impl Event {
    /// Build an event, truncating both instants to millisecond precision.
    #[must_use]
    pub fn new<C: Into<String>>(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        code: C,
        is_test: Option<bool>,
    ) -> Self {
        Self {
            start: start.trunc_subsecs(3),
            end: end.trunc_subsecs(3),
            code: code.into(),
            is_test,
        }
    }

    /// Key identifying this event regardless of code or flags.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            start: self.start,
            end: self.end,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Events ordered ascending by start time.
pub struct Dataset {
    events: Vec<Event>,
}

impl Dataset {
    /// Build a dataset from events in any order.
    ///
    /// Duplicate keys are kept; they collapse on the next [`Dataset::merge`].
    #[must_use]
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by_key(Event::key);
        Self { events }
    }

    /// Events in start order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Consume the dataset, returning its events in start order.
    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the dataset holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct keys present in the dataset.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<EventKey> {
        self.events.iter().map(Event::key).collect()
    }

    /// Union `incoming` into the dataset by key.
    ///
    /// On a duplicate key the incoming copy replaces the current one, so the source merged last
    /// wins.
    pub fn merge<I: IntoIterator<Item = Event>>(&mut self, incoming: I) {
        let mut by_key: BTreeMap<EventKey, Event> = std::mem::take(&mut self.events)
            .into_iter()
            .map(|event| (event.key(), event))
            .collect();

        for event in incoming {
            by_key.insert(event.key(), event);
        }

        self.events = by_key.into_values().collect();
    }

    /// Whether both datasets hold the same number of events and the same set of keys.
    ///
    /// Codes and flags are ignored.
    #[must_use]
    pub fn same_events(&self, other: &Dataset) -> bool {
        self.len() == other.len() && self.keys() == other.keys()
    }

    /// Re-sort by start and number the events `"1"`, `"2"`, ... in that order.
    pub fn assign_codes(&mut self) {
        self.events.sort_by_key(Event::key);
        for (position, event) in self.events.iter_mut().enumerate() {
            event.code = (position + 1).to_string();
        }
    }
}
