//! # calrelay-engine
//!
//! Resolves a calendar feed into the concrete event instances that fall inside
//! a time window, ready to be created as scheduled events on a messaging
//! platform.
//!
//! Recurring entries are expanded with the `rrule` crate; per-occurrence
//! exceptions and overrides are joined by calendar date, and each occurrence is
//! corrected for UTC-offset drift so it keeps the series' local wall-clock
//! time across DST changes.
//!
//! ## Modules
//!
//! - [`resolver`] -- components + window → resolved events
//! - [`window`] -- half-open windows and the pre-expansion candidate test
//! - [`rule`] -- RRULE values and their expansion into raw candidates
//! - [`component`] -- calendar components, date-keys
//! - [`ics`] -- iCalendar text → components
//! - [`dst`] -- DST gap policies for feed-local times
//! - [`sink`] -- event drafts and the sink boundary
//! - [`error`] -- Error types

pub mod component;
pub mod dst;
pub mod error;
pub mod ics;
pub mod resolver;
pub mod rule;
pub mod sink;
pub mod window;

pub use component::{CalendarComponent, ComponentKind, DateKey};
pub use error::RelayError;
pub use ics::{parse_calendar, parse_calendar_with, ParseOptions};
pub use resolver::{resolve, resolve_with_options, ResolvedEvent, ResolverOptions};
pub use rule::{RepetitionRule, Until};
pub use sink::{relay, EventDraft, EventSink, JsonLinesSink, SinkPolicy};
pub use window::Window;
