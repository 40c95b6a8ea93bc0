//! Recurrence resolution -- components plus a window in, concrete events out.
//!
//! One-off events pass straight through. Recurring templates are expanded by
//! their rule, then each raw candidate is checked against the series'
//! exceptions and overrides (both joined by calendar date) and corrected for
//! the UTC-offset drift between the series' reference start and the candidate.

use std::collections::HashSet;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::component::{CalendarComponent, DateKey};
use crate::error::Result;
use crate::rule::RepetitionRule;
use crate::window::{is_candidate, Window};

/// A concrete event instance ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub name: String,
    pub description: String,
    pub location: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl ResolvedEvent {
    fn from_component(
        component: &CalendarComponent,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: component.summary.clone(),
            description: component.description.clone(),
            location: component.location.clone(),
            start,
            end,
        }
    }
}

/// Tuning for a resolve run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Upper bound on raw candidates expanded per recurring component.
    pub max_instances: u16,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_instances: 1000,
        }
    }
}

/// How a single occurrence of a series is realised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Occurrence<'a> {
    /// Generated by the rule; carries the raw candidate start.
    Template(DateTime<FixedOffset>),
    /// Individually edited; the replacement's own start is authoritative.
    Override(&'a CalendarComponent),
}

/// Resolve `components` into the events that fall inside `window`.
///
/// Components are handled in input order; occurrences of one series keep the
/// chronological order the rule produced them in.
///
/// # Errors
/// Returns `RelayError::InvalidRule` when a recurring component's rule cannot
/// be expanded.
pub fn resolve(components: &[CalendarComponent], window: &Window) -> Result<Vec<ResolvedEvent>> {
    resolve_with_options(components, window, &ResolverOptions::default())
}

/// [`resolve`] with explicit [`ResolverOptions`].
///
/// # Errors
/// Returns `RelayError::InvalidRule` when a recurring component's rule cannot
/// be expanded.
pub fn resolve_with_options(
    components: &[CalendarComponent],
    window: &Window,
    options: &ResolverOptions,
) -> Result<Vec<ResolvedEvent>> {
    tracing::debug!(
        components = components.len(),
        window_start = %window.start,
        window_end = %window.end,
        "resolving components"
    );

    let mut events = Vec::new();
    for component in components {
        events.extend(resolve_component(component, window, options)?);
    }

    tracing::debug!(events = events.len(), "resolved events");
    Ok(events)
}

/// Resolve one component. Non-candidates yield nothing.
///
/// # Errors
/// Returns `RelayError::InvalidRule` when the component's rule cannot be
/// expanded.
pub fn resolve_component(
    component: &CalendarComponent,
    window: &Window,
    options: &ResolverOptions,
) -> Result<Vec<ResolvedEvent>> {
    if !is_candidate(component, window) {
        tracing::trace!(summary = %component.summary, "component outside window");
        return Ok(Vec::new());
    }

    match &component.rule {
        None => Ok(vec![ResolvedEvent::from_component(
            component,
            component.start,
            component.end,
        )]),
        Some(rule) => resolve_series(component, rule, window, options),
    }
}

fn resolve_series(
    template: &CalendarComponent,
    rule: &RepetitionRule,
    window: &Window,
    options: &ResolverOptions,
) -> Result<Vec<ResolvedEvent>> {
    let duration = template.duration();
    let reference = template.reference_offset();

    let candidates = rule.candidates(template.start, template.zone, window, options.max_instances)?;
    tracing::trace!(
        summary = %template.summary,
        candidates = candidates.len(),
        "expanded series"
    );

    let mut consumed = HashSet::new();
    let mut events = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let key = DateKey::of(&candidate, reference);

        if template.exceptions.contains(&key) {
            tracing::trace!(%key, "occurrence excluded");
            continue;
        }

        let occurrence = match template.overrides.get(&key) {
            Some(replacement) if consumed.insert(key) => Occurrence::Override(replacement),
            _ => Occurrence::Template(candidate),
        };

        let (source, start) = match occurrence {
            Occurrence::Template(raw) => (template, correct_offset(raw, reference)),
            Occurrence::Override(replacement) => {
                tracing::trace!(%key, start = %replacement.start, "occurrence overridden");
                (replacement, replacement.start)
            }
        };

        events.push(ResolvedEvent::from_component(source, start, start + duration));
    }

    Ok(events)
}

/// Shift `candidate` by the difference between the series' reference offset
/// and the candidate's own offset.
///
/// A rule anchored at 09:00 in winter time lands on 10:00 once its zone moves
/// to summer time; the shift brings it back to 09:00 local.
pub fn correct_offset(
    candidate: DateTime<FixedOffset>,
    reference: FixedOffset,
) -> DateTime<FixedOffset> {
    let drift = reference.local_minus_utc() - candidate.offset().local_minus_utc();
    candidate + Duration::seconds(i64::from(drift))
}
