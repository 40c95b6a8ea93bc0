//! Calendar components as handed over by the parser.
//!
//! A component is either a one-off entry or a recurring template. Templates
//! carry their repetition rule, the dates whose occurrences are suppressed, and
//! the dates whose occurrences were individually edited.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::rule::RepetitionRule;

/// Calendar-date key joining exceptions and overrides to an occurrence.
///
/// Time of day and UTC offset are deliberately not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// The key of `instant` as seen in `reference`.
    pub fn of<Z: TimeZone>(instant: &DateTime<Z>, reference: FixedOffset) -> Self {
        Self(instant.with_timezone(&reference).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// iCalendar component type. Only `Event` is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentKind {
    #[default]
    Event,
    Todo,
    Journal,
    Other,
}

impl ComponentKind {
    /// Map an iCalendar component name (`VEVENT`, `VTODO`, ...).
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "VEVENT" => ComponentKind::Event,
            "VTODO" => ComponentKind::Todo,
            "VJOURNAL" => ComponentKind::Journal,
            _ => ComponentKind::Other,
        }
    }
}

/// A single parsed calendar entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarComponent {
    pub kind: ComponentKind,
    pub uid: Option<String>,
    pub summary: String,
    pub description: String,
    pub location: Option<String>,
    /// Start with the UTC offset it was declared in. For a recurring template
    /// this offset is the series' reference offset.
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// IANA zone the start was declared in, when known. Generated occurrences
    /// take their own offset from it.
    pub zone: Option<Tz>,
    pub rule: Option<RepetitionRule>,
    pub exceptions: BTreeSet<DateKey>,
    pub overrides: BTreeMap<DateKey, CalendarComponent>,
}

impl CalendarComponent {
    /// A one-off event with empty description and no location.
    pub fn event(
        summary: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            kind: ComponentKind::Event,
            uid: None,
            summary: summary.into(),
            description: String::new(),
            location: None,
            start,
            end,
            zone: None,
            rule: None,
            exceptions: BTreeSet::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_rule(mut self, rule: RepetitionRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_exception(mut self, key: impl Into<DateKey>) -> Self {
        self.exceptions.insert(key.into());
        self
    }

    /// Attach a replacement for the occurrence originally scheduled on `key`.
    pub fn with_override(
        mut self,
        key: impl Into<DateKey>,
        replacement: CalendarComponent,
    ) -> Self {
        self.overrides.insert(key.into(), replacement);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    /// `end - start`. Negative when the entry ends before it starts.
    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    /// The offset every occurrence of this series is normalized against.
    pub fn reference_offset(&self) -> FixedOffset {
        *self.start.offset()
    }

    /// The rule's terminal bound as an absolute instant, if it has one.
    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.rule
            .as_ref()
            .and_then(|rule| rule.until())
            .map(|until| until.resolve(self.reference_offset()))
    }
}
