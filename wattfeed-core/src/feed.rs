//! JSON shape of the published event file.
//!
//! The community feed serves the same document, so both the store and the community provider
//! decode through these types.

use chrono::{DateTime, NaiveDateTime, ParseError as ChronoParseError, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Error as JsonError, Value};

use crate::model::Event;

/// Timestamp layout used on the wire, e.g. `2025-01-05T12:00:00.000Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// Accepts any fraction length (or none) so slightly off upstream stamps still parse.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// Top-level document: `{"data": [...]}`.
pub struct FeedDocument {
    /// Entries in publication order.
    pub data: Vec<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Single event as serialized in the feed.
pub struct FeedEntry {
    /// Start timestamp in [`TIMESTAMP_FORMAT`].
    #[serde(default, deserialize_with = "null_as_empty")]
    pub start: String,
    /// End timestamp in [`TIMESTAMP_FORMAT`].
    #[serde(default, deserialize_with = "null_as_empty")]
    pub end: String,
    /// Display code.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub code: String,
    /// Only rendered when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_test: Option<bool>,
}

// Entries stay undecoded until each one is converted on its own.
#[derive(Debug, Deserialize)]
struct LooseDocument {
    data: Vec<Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl FeedEntry {
    /// Render an event in wire form.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            start: format_timestamp(event.start),
            end: format_timestamp(event.end),
            code: event.code.clone(),
            is_test: event.is_test,
        }
    }

    /// Parse the entry back into an event.
    ///
    /// # Errors
    ///
    /// Returns a [`ChronoParseError`] when either timestamp does not match the wire layout.
    pub fn to_event(&self) -> Result<Event, ChronoParseError> {
        let start = parse_timestamp(&self.start)?;
        let end = parse_timestamp(&self.end)?;
        Ok(Event::new(start, end, self.code.clone(), self.is_test))
    }
}

impl FeedDocument {
    /// Build a document from events, keeping their order.
    #[must_use]
    pub fn from_events(events: &[Event]) -> Self {
        Self {
            data: events.iter().map(FeedEntry::from_event).collect(),
        }
    }

    /// Convert every entry, failing on the first malformed one.
    ///
    /// # Errors
    ///
    /// Returns a [`ChronoParseError`] for the first entry with an invalid timestamp.
    pub fn to_events(&self) -> Result<Vec<Event>, ChronoParseError> {
        self.data.iter().map(FeedEntry::to_event).collect()
    }

    /// Decode a feed body, dropping entries that do not form a valid event.
    ///
    /// Missing or `null` fields decode as empty strings, so such an entry fails on its timestamps
    /// and is skipped alone. Returns the events and the number of skipped entries.
    ///
    /// # Errors
    ///
    /// Returns a [`JsonError`] when the body is not a `{"data": [...]}` document.
    pub fn decode_lenient(body: &[u8]) -> Result<(Vec<Event>, usize), JsonError> {
        let doc: LooseDocument = serde_json::from_slice(body)?;
        let total = doc.data.len();
        let events: Vec<Event> = doc
            .data
            .into_iter()
            .filter_map(|value| serde_json::from_value::<FeedEntry>(value).ok())
            .filter_map(|entry| entry.to_event().ok())
            .collect();
        let skipped = total.saturating_sub(events.len());
        Ok((events, skipped))
    }
}

/// Format an instant in the wire layout.
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a wire timestamp as UTC.
///
/// # Errors
///
/// Returns a [`ChronoParseError`] when the text is not a `Z`-suffixed ISO 8601 timestamp.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ChronoParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_PARSE_FORMAT).map(|naive| naive.and_utc())
}
