use itertools::Itertools;
use serde::Serialize;

use crate::reconcile::Reconciliation;

/// Accuracy of matched distances against the odometer over many trips.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub trips: usize,
    pub mean_abs_km: f64,
    pub median_abs_km: f64,
    pub mean_relative: f64,
    pub median_relative: f64,
    pub p25_abs_km: f64,
    pub p75_abs_km: f64,
    /// Percentage (0-100) of trips within 1 km of the odometer.
    pub pct_abs_within_1km: f64,
    /// Percentage (0-100) of trips within 5% of the odometer.
    pub pct_relative_within_5pct: f64,
}

// linear interpolation between closest ranks, same as numpy's default
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] * (1. - weight) + sorted[upper] * weight
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn share_at_most(values: &[f64], limit: f64) -> f64 {
    values.iter().filter(|v| **v <= limit).count() as f64 / values.len() as f64 * 100.
}

impl EvaluationSummary {
    /// Trips without a positive odometer delta are left out. `None` if no trip
    /// remains.
    pub fn from_reconciliations(reconciliations: &[Reconciliation]) -> Option<Self> {
        let usable: Vec<&Reconciliation> = reconciliations
            .iter()
            .filter(|r| r.has_ground_truth())
            .collect();
        if usable.is_empty() {
            return None;
        }
        let absolute: Vec<f64> = usable
            .iter()
            .map(|r| r.absolute_difference_km())
            .sorted_by(f64::total_cmp)
            .collect();
        let relative: Vec<f64> = usable
            .iter()
            .filter_map(|r| r.relative_difference())
            .sorted_by(f64::total_cmp)
            .collect();

        Some(EvaluationSummary {
            trips: usable.len(),
            mean_abs_km: mean(&absolute),
            median_abs_km: percentile(&absolute, 0.5),
            mean_relative: mean(&relative),
            median_relative: percentile(&relative, 0.5),
            p25_abs_km: percentile(&absolute, 0.25),
            p75_abs_km: percentile(&absolute, 0.75),
            pct_abs_within_1km: share_at_most(&absolute, 1.),
            pct_relative_within_5pct: share_at_most(&relative, 0.05),
        })
    }
}

/// Counts of `values` in `bins` equal-width bins over `[low, high]`. Values
/// outside the range are dropped; `high` itself falls in the last bin.
pub fn histogram(values: &[f64], bins: usize, low: f64, high: f64) -> Vec<usize> {
    let mut counts = vec![0; bins];
    if bins == 0 || high <= low {
        return counts;
    }
    let width = (high - low) / bins as f64;
    for value in values {
        if *value < low || *value > high {
            continue;
        }
        let index = (((value - low) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    counts
}
