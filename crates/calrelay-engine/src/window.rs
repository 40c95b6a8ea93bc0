//! Query windows and the cheap candidate test run before any expansion.
//!
//! A window is half-open: an instant equal to `end` is outside it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::component::{CalendarComponent, ComponentKind};
use crate::error::{RelayError, Result};

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Build a window, rejecting empty or inverted bounds.
    ///
    /// # Errors
    /// Returns `RelayError::InvalidWindow` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(RelayError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whether `instant` falls inside `[start, end)`.
    pub fn contains<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> bool {
        let instant = instant.with_timezone(&Utc);
        self.start <= instant && instant < self.end
    }
}

/// Decide whether a component can contribute anything to `window`.
///
/// Recurring components have no single end, so their terminal bound is the
/// rule's `until`; a rule without one is left for expansion to decide.
pub fn is_candidate(component: &CalendarComponent, window: &Window) -> bool {
    if component.kind != ComponentKind::Event {
        return false;
    }

    if component.start.with_timezone(&Utc) >= window.end {
        return false;
    }

    match (&component.rule, component.until()) {
        (Some(_), Some(until)) => window.start < until,
        (Some(_), None) => true,
        (None, _) => window.start < component.end.with_timezone(&Utc),
    }
}
