use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::config::MatchPolicy;
use crate::error::RouteError;
use crate::trip_data::Trip;

/// How the matcher should treat long pauses between samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GapPolicy {
    /// Match the whole trace as one continuous path.
    Ignore,
    /// Let the matcher break the trace where the gap is.
    Split,
}

/// One timestamp per sample, in sample order.
///
/// Samples without an authoritative timestamp get `trip start + index *
/// spacing`. This is only an approximation of when the sample was taken.
pub fn normalize_timestamps(trip: &Trip, policy: &MatchPolicy) -> Result<Vec<i64>, RouteError> {
    trip.samples
        .iter()
        .enumerate()
        .map(|(index, sample)| match (sample.timestamp_sec, trip.start_sec) {
            (Some(ts), _) => Ok(ts),
            (None, Some(start)) => Ok(start + index as i64 * policy.fallback_sample_spacing_sec),
            (None, None) => Err(RouteError::MissingTimestamp {
                cycle_id: trip.cycle_id.clone(),
                index,
            }),
        })
        .collect()
}

/// `Split` as soon as one gap between consecutive timestamps is longer than
/// `threshold_sec`.
pub fn classify_gaps(timestamps: &[i64], threshold_sec: i64) -> GapPolicy {
    if timestamps
        .iter()
        .tuple_windows()
        .any(|(prev, next)| next - prev > threshold_sec)
    {
        GapPolicy::Split
    } else {
        GapPolicy::Ignore
    }
}
