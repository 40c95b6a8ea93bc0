//! DST transition policies for local times read from a feed.
//!
//! A `TZID` wall-clock time can be ambiguous (fall back) or not exist at all
//! (spring forward). Ambiguous times always take the earlier instant; the
//! policy decides what happens to times inside a gap.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for local times that fall in a DST gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DstPolicy {
    /// Skip times that fall in the DST gap (e.g., 2:30 AM during spring forward)
    Skip,
    /// Shift to the first valid wall-clock minute after the gap
    ShiftForward,
    /// Read the time with the offset in force before the gap, as RFC 5545
    /// prescribes (2:30 AM EST becomes 3:30 AM EDT)
    #[default]
    WallClock,
}

/// Resolve a wall-clock time in `zone` to an instant, applying `policy` to gaps.
///
/// Returns `None` only for `DstPolicy::Skip` inside a gap.
pub fn localize(
    zone: Tz,
    local: NaiveDateTime,
    policy: DstPolicy,
) -> Option<DateTime<FixedOffset>> {
    if let Some(instant) = zone.from_local_datetime(&local).earliest() {
        return Some(instant.fixed_offset());
    }

    tracing::debug!(%local, zone = %zone, ?policy, "local time falls in a DST gap");

    match policy {
        DstPolicy::Skip => None,
        DstPolicy::ShiftForward => {
            // Gaps are at most a day long (Pacific/Apia, 2011).
            (1..=24 * 60)
                .map(|minutes| local + Duration::minutes(minutes))
                .find_map(|shifted| zone.from_local_datetime(&shifted).earliest())
                .map(|instant| instant.fixed_offset())
        }
        DstPolicy::WallClock => {
            let before = zone
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix();
            let utc = local - Duration::seconds(i64::from(before.local_minus_utc()));
            Some(zone.from_utc_datetime(&utc).fixed_offset())
        }
    }
}
