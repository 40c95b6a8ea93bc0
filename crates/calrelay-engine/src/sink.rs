//! The boundary to whatever creates scheduled events on the messaging side.
//!
//! Resolved events are mapped to [`EventDraft`]s under a [`SinkPolicy`]
//! (description length limit, fallback location) and pushed into an
//! [`EventSink`] in order.

use std::io::Write;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resolver::ResolvedEvent;

const ELLIPSIS: &str = "...";

/// Formatting rules a sink applies before creating an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkPolicy {
    /// Longest description the platform accepts, in characters.
    pub max_description_len: usize,
    /// Used when an event has no location or an empty one.
    pub default_location: String,
}

impl Default for SinkPolicy {
    fn default() -> Self {
        Self {
            max_description_len: 1000,
            default_location: "Unknown".to_string(),
        }
    }
}

/// A scheduled event as the platform will receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub name: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl EventDraft {
    pub fn from_resolved(event: &ResolvedEvent, policy: &SinkPolicy) -> Self {
        let location = match event.location.as_deref() {
            Some(location) if !location.is_empty() => location.to_string(),
            _ => policy.default_location.clone(),
        };

        Self {
            name: event.name.clone(),
            description: truncate_description(&event.description, policy.max_description_len),
            location,
            start: event.start,
            end: event.end,
        }
    }
}

/// Cut `text` to at most `max_len` characters, ending in `...` when cut.
///
/// Limits too short to hold the ellipsis get a plain cut.
pub fn truncate_description(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    if max_len < ELLIPSIS.len() {
        return text.chars().take(max_len).collect();
    }

    let keep = max_len - ELLIPSIS.len();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// Anything that can accept event drafts.
pub trait EventSink {
    /// # Errors
    /// Implementations report their own delivery failures.
    fn create(&mut self, draft: &EventDraft) -> Result<()>;
}

impl EventSink for Vec<EventDraft> {
    fn create(&mut self, draft: &EventDraft) -> Result<()> {
        self.push(draft.clone());
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn create(&mut self, draft: &EventDraft) -> Result<()> {
        serde_json::to_writer(&mut self.writer, draft)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Push every event into `sink` in order, returning how many were created.
///
/// Stops at the first sink failure.
///
/// # Errors
/// Propagates the sink's error.
pub fn relay<S: EventSink + ?Sized>(
    events: &[ResolvedEvent],
    policy: &SinkPolicy,
    sink: &mut S,
) -> Result<usize> {
    for (index, event) in events.iter().enumerate() {
        let draft = EventDraft::from_resolved(event, policy);
        sink.create(&draft).inspect_err(|e| {
            tracing::warn!(index, name = %draft.name, error = %e, "sink rejected event");
        })?;
        tracing::trace!(name = %draft.name, start = %draft.start, "event relayed");
    }
    Ok(events.len())
}
