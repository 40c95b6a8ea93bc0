//! iCalendar text to [`CalendarComponent`]s, using the `icalendar` crate's parser.
//!
//! Handles the date-time forms feeds actually use for DTSTART, DTEND, EXDATE
//! and RECURRENCE-ID:
//! - UTC: `DTSTART:20240108T100000Z`
//! - TZID parameter: `DTSTART;TZID=America/New_York:20240108T100000`
//! - Floating: `DTSTART:20240108T100000` (read as UTC)
//! - VALUE=DATE: `DTSTART;VALUE=DATE:20240108` (midnight UTC)
//!
//! RECURRENCE-ID components are folded into the recurring master with the same
//! UID as overrides. A cancelled override becomes an exception instead.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component, Property};

use crate::component::{CalendarComponent, ComponentKind, DateKey};
use crate::dst::{localize, DstPolicy};
use crate::error::{RelayError, Result};
use crate::rule::RepetitionRule;

/// Options for reading a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub dst_policy: DstPolicy,
}

/// A date-time value as written in the feed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcsTime {
    Date(NaiveDate),
    Instant {
        at: DateTime<FixedOffset>,
        zone: Option<Tz>,
    },
}

impl IcsTime {
    fn instant(self) -> DateTime<FixedOffset> {
        match self {
            IcsTime::Date(date) => date.and_time(NaiveTime::default()).and_utc().fixed_offset(),
            IcsTime::Instant { at, .. } => at,
        }
    }

    fn zone(self) -> Option<Tz> {
        match self {
            IcsTime::Date(_) => None,
            IcsTime::Instant { zone, .. } => zone,
        }
    }

    /// The wall date this value names in its series.
    ///
    /// A zoned value keeps its own wall date. Other instants are read in the
    /// series zone when there is one, else in the series' reference offset.
    fn date_key(self, reference: FixedOffset, series_zone: Option<Tz>) -> DateKey {
        match self {
            IcsTime::Date(date) => DateKey::from(date),
            IcsTime::Instant { at, zone } => match zone.or(series_zone) {
                Some(zone) => DateKey::from(at.with_timezone(&zone).date_naive()),
                None => DateKey::of(&at, reference),
            },
        }
    }
}

struct ParsedComponent {
    component: CalendarComponent,
    recurrence_id: Option<IcsTime>,
    cancelled: bool,
}

/// Parse a VCALENDAR document with default options.
///
/// # Errors
/// Returns `RelayError::Parse` if the text is not iCalendar, and
/// `RelayError::InvalidRule` if an RRULE carries a malformed UNTIL.
pub fn parse_calendar(text: &str) -> Result<Vec<CalendarComponent>> {
    parse_calendar_with(text, &ParseOptions::default())
}

/// Parse a VCALENDAR document.
///
/// Components come back in document order, except that RECURRENCE-ID
/// components whose master is missing from the feed are appended at the end
/// as standalone entries.
///
/// # Errors
/// Returns `RelayError::Parse` if the text is not iCalendar, and
/// `RelayError::InvalidRule` if an RRULE carries a malformed UNTIL.
pub fn parse_calendar_with(text: &str, options: &ParseOptions) -> Result<Vec<CalendarComponent>> {
    let unfolded = unfold(text);
    let calendar = read_calendar(&unfolded).map_err(|e| RelayError::Parse(e.to_string()))?;

    let mut components = Vec::new();
    let mut masters: HashMap<String, usize> = HashMap::new();
    let mut overrides = Vec::new();

    for raw in &calendar.components {
        let Some(parsed) = parse_component(raw, options)? else {
            continue;
        };

        if parsed.recurrence_id.is_some() {
            overrides.push(parsed);
            continue;
        }
        if parsed.cancelled {
            tracing::debug!(summary = %parsed.component.summary, "dropping cancelled component");
            continue;
        }

        if let (Some(uid), true) = (&parsed.component.uid, parsed.component.is_recurring()) {
            masters.insert(uid.clone(), components.len());
        }
        components.push(parsed.component);
    }

    for parsed in overrides {
        let master = parsed
            .component
            .uid
            .as_ref()
            .and_then(|uid| masters.get(uid).copied());

        match (master, parsed.recurrence_id) {
            (Some(index), Some(recurrence_id)) => {
                let master = &mut components[index];
                let key = recurrence_id.date_key(master.reference_offset(), master.zone);
                if parsed.cancelled {
                    master.exceptions.insert(key);
                } else {
                    master.overrides.insert(key, parsed.component);
                }
            }
            _ if parsed.cancelled => {}
            _ => {
                tracing::debug!(
                    summary = %parsed.component.summary,
                    "override without master, keeping as standalone event"
                );
                components.push(parsed.component);
            }
        }
    }

    tracing::debug!(components = components.len(), "parsed calendar");
    Ok(components)
}

fn parse_component(raw: &Component, options: &ParseOptions) -> Result<Option<ParsedComponent>> {
    let name: &str = raw.name.as_ref();
    let kind = ComponentKind::from_name(name);
    if kind == ComponentKind::Other {
        return Ok(None);
    }

    let Some(start) = raw
        .find_prop("DTSTART")
        .and_then(|p| property_times(p, options).into_iter().next())
    else {
        tracing::debug!(component = name, "skipping component without usable DTSTART");
        return Ok(None);
    };

    let end = raw
        .find_prop("DTEND")
        .or_else(|| raw.find_prop("DUE"))
        .and_then(|p| property_times(p, options).into_iter().next())
        .map(IcsTime::instant)
        .or_else(|| {
            raw.find_prop("DURATION")
                .and_then(|p| parse_duration(p.val.as_ref()))
                .map(|duration| start.instant() + duration)
        })
        .unwrap_or_else(|| match start {
            IcsTime::Date(_) => start.instant() + Duration::days(1),
            IcsTime::Instant { at, .. } => at,
        });

    let reference = *start.instant().offset();
    let series_zone = start.zone();

    let rule = raw
        .find_prop("RRULE")
        .map(|p| p.val.as_ref().parse::<RepetitionRule>())
        .transpose()?;

    let exceptions = raw
        .properties
        .iter()
        .filter(|p| p.name.as_ref() == "EXDATE")
        .flat_map(|p| property_times(p, options))
        .map(|time| time.date_key(reference, series_zone))
        .collect();

    let recurrence_id = raw
        .find_prop("RECURRENCE-ID")
        .and_then(|p| property_times(p, options).into_iter().next());

    let cancelled = raw
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"));

    let component = CalendarComponent {
        kind,
        uid: raw.find_prop("UID").map(|p| p.val.as_ref().to_string()),
        summary: text_prop(raw, "SUMMARY").unwrap_or_default(),
        description: text_prop(raw, "DESCRIPTION").unwrap_or_default(),
        location: text_prop(raw, "LOCATION"),
        start: start.instant(),
        end,
        zone: series_zone,
        rule,
        exceptions,
        overrides: Default::default(),
    };

    Ok(Some(ParsedComponent {
        component,
        recurrence_id,
        cancelled,
    }))
}

fn text_prop(raw: &Component, name: &str) -> Option<String> {
    raw.find_prop(name).map(|p| unescape_text(p.val.as_ref()))
}

/// Undo RFC 5545 TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn param<'a>(prop: &'a Property, key: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|p| p.key.as_ref() == key)
        .and_then(|p| p.val.as_ref().map(|v| v.as_ref()))
}

/// Read every date-time value of a property (EXDATE may list several).
fn property_times(prop: &Property, options: &ParseOptions) -> Vec<IcsTime> {
    let zone = param(prop, "TZID").and_then(|tzid| {
        let tzid = tzid.trim_matches('"');
        match tzid.parse::<Tz>() {
            Ok(zone) => Some(zone),
            Err(_) => {
                tracing::warn!(tzid, "unknown TZID, reading time as floating");
                None
            }
        }
    });
    let is_date = param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| parse_time(s, zone, is_date, options.dst_policy))
        .collect()
}

fn parse_time(value: &str, zone: Option<Tz>, is_date: bool, policy: DstPolicy) -> Option<IcsTime> {
    if is_date || value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(IcsTime::Date);
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?;
        return Some(IcsTime::Instant {
            at: naive.and_utc().fixed_offset(),
            zone: None,
        });
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    match zone {
        Some(zone) => localize(zone, naive, policy).map(|at| IcsTime::Instant {
            at,
            zone: Some(zone),
        }),
        None => Some(IcsTime::Instant {
            at: naive.and_utc().fixed_offset(),
            zone: None,
        }),
    }
}

/// Parse an RFC 5545 DURATION (`PT1H30M`, `P1D`, `-PT15M`, `P2W`).
fn parse_duration(value: &str) -> Option<Duration> {
    let negative = value.starts_with('-');
    let unsigned = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(unsigned).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let duration = Duration::from_std(std_duration).ok()?;

    Some(if negative { -duration } else { duration })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_handles_rfc_sequences() {
        assert_eq!(unescape_text(r"a\, b\; c\nd\\e"), "a, b; c\nd\\e");
    }

    #[test]
    fn duration_forms() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P1D"), Some(Duration::days(1)));
        assert_eq!(parse_duration("-PT15M"), Some(Duration::minutes(-15)));
        assert_eq!(parse_duration("P2W"), Some(Duration::weeks(2)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn date_value_is_midnight_utc() {
        let time = parse_time("20240108", None, true, DstPolicy::default()).unwrap();
        assert_eq!(time.instant().to_rfc3339(), "2024-01-08T00:00:00+00:00");
        assert_eq!(time.zone(), None);
    }
}
