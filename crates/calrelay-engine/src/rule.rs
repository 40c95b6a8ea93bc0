//! Repetition rules -- the boundary to the `rrule` crate.
//!
//! A rule is expanded on the series' wall clock at its reference offset, so
//! BYDAY and friends see the dates the calendar author saw. Each raw candidate
//! is then expressed in the offset its own zone has at that instant, which may
//! differ from the reference offset across a DST change. Undoing that drift is
//! the resolver's job, not this module's.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::error::{RelayError, Result};
use crate::window::Window;

const ICAL_DATETIME: &str = "%Y%m%dT%H%M%S";

/// Terminal bound of a rule, as written in its `UNTIL` part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    /// `UNTIL=20240301T000000Z`
    Instant(DateTime<Utc>),
    /// `UNTIL=20240301T000000`, local to the series.
    Floating(NaiveDateTime),
    /// `UNTIL=20240301`; the whole day is included.
    Date(NaiveDate),
}

impl Until {
    /// The bound as an absolute instant for a series anchored at `offset`.
    pub fn resolve(&self, offset: FixedOffset) -> DateTime<Utc> {
        match self {
            Until::Instant(instant) => *instant,
            Until::Floating(naive) => local_to_utc(*naive, offset),
            Until::Date(date) => local_to_utc(last_second_of(*date), offset),
        }
    }

    fn parse(value: &str) -> Result<Self> {
        let invalid = || RelayError::InvalidRule(format!("invalid UNTIL value '{}'", value));

        if value.len() == 8 {
            return NaiveDate::parse_from_str(value, "%Y%m%d")
                .map(Until::Date)
                .map_err(|_| invalid());
        }

        match value.strip_suffix('Z') {
            Some(utc) => NaiveDateTime::parse_from_str(utc, ICAL_DATETIME)
                .map(|naive| Until::Instant(naive.and_utc()))
                .map_err(|_| invalid()),
            None => NaiveDateTime::parse_from_str(value, ICAL_DATETIME)
                .map(Until::Floating)
                .map_err(|_| invalid()),
        }
    }

    fn to_ical(self) -> String {
        match self {
            Until::Instant(instant) => format!("{}Z", instant.format(ICAL_DATETIME)),
            Until::Floating(naive) => naive.format(ICAL_DATETIME).to_string(),
            Until::Date(date) => date.format("%Y%m%d").to_string(),
        }
    }
}

/// An RFC 5545 RRULE value with its `UNTIL` part lifted out.
///
/// `UNTIL` is kept separately because the window filter needs it before any
/// expansion happens, and because it has to be re-expressed on the series'
/// wall clock when the rule is handed to `rrule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepetitionRule {
    body: String,
    until: Option<Until>,
}

impl RepetitionRule {
    /// The rule parts other than `UNTIL`, e.g. `FREQ=WEEKLY;BYDAY=MO`.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn until(&self) -> Option<Until> {
        self.until
    }

    /// Expand the rule into raw candidate starts inside `window`.
    ///
    /// # Arguments
    /// - `reference` -- the template's start; its offset anchors the series
    /// - `zone` -- IANA zone used to give each candidate its own offset
    /// - `window` -- half-open bound; its end is always passed to `rrule`
    /// - `max_instances` -- cap on candidates produced for one call
    ///
    /// # Errors
    /// Returns `RelayError::InvalidRule` if `rrule` rejects the rule.
    pub fn candidates(
        &self,
        reference: DateTime<FixedOffset>,
        zone: Option<Tz>,
        window: &Window,
        max_instances: u16,
    ) -> Result<Vec<DateTime<FixedOffset>>> {
        let offset = *reference.offset();

        // The series is expanded as if its wall clock were UTC, so UNTIL has
        // to be moved onto that same clock.
        let mut rule = self.body.clone();
        if let Some(until) = self.until {
            let local = utc_to_local(until.resolve(offset), offset);
            rule = format!("{};UNTIL={}Z", rule, local.format(ICAL_DATETIME));
        }

        let rrule_text = format!(
            "DTSTART:{}Z\nRRULE:{}",
            reference.naive_local().format(ICAL_DATETIME),
            rule
        );

        let rrule_set: RRuleSet = rrule_text
            .parse()
            .map_err(|e| RelayError::InvalidRule(format!("{}", e)))?;

        // Pad by a second on each side; the exact half-open test happens below.
        let tz: rrule::Tz = Utc.into();
        let after = (utc_to_local(window.start, offset) - Duration::seconds(1))
            .and_utc()
            .with_timezone(&tz);
        let before = (utc_to_local(window.end, offset) + Duration::seconds(1))
            .and_utc()
            .with_timezone(&tz);

        let result = rrule_set.after(after).before(before).all(max_instances);
        if result.limited {
            tracing::warn!(
                rule = %self,
                max_instances,
                "expansion truncated at instance limit"
            );
        }

        let candidates = result
            .dates
            .into_iter()
            .map(|dt| local_to_utc(dt.naive_utc(), offset))
            .filter(|instant| window.contains(instant))
            .map(|instant| match zone {
                Some(zone) => instant.with_timezone(&zone).fixed_offset(),
                None => instant.with_timezone(&offset),
            })
            .collect();

        Ok(candidates)
    }
}

impl FromStr for RepetitionRule {
    type Err = RelayError;

    /// Parse an RRULE value, with or without a leading `RRULE:`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("RRULE:").unwrap_or(s);
        if s.is_empty() {
            return Err(RelayError::InvalidRule("empty RRULE string".to_string()));
        }

        let mut parts = Vec::new();
        let mut until = None;
        for part in s.split(';').filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                    until = Some(Until::parse(value)?);
                }
                _ => parts.push(part),
            }
        }

        Ok(Self {
            body: parts.join(";"),
            until,
        })
    }
}

impl fmt::Display for RepetitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.until {
            Some(until) => write!(f, "{};UNTIL={}", self.body, until.to_ical()),
            None => f.write_str(&self.body),
        }
    }
}

/// 23:59:59 on `date`.
fn last_second_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default()) + Duration::days(1) - Duration::seconds(1)
}

fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    (naive - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

fn utc_to_local(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    instant.with_timezone(&offset).naive_local()
}
