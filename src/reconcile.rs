use serde::{Deserialize, Serialize};

use crate::radius_refiner::is_within_tolerance;

/// Matched distance against the odometer delta, both in km.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub matched_km: f64,
    pub odometer_km: f64,
    pub within_tolerance: bool,
}

impl Reconciliation {
    pub fn new(matched_km: f64, odometer_km: f64, relative_tolerance: f64) -> Self {
        let reconciliation = Reconciliation {
            matched_km,
            odometer_km,
            within_tolerance: is_within_tolerance(matched_km, odometer_km, relative_tolerance),
        };
        if let Some(message) = reconciliation.warning(relative_tolerance) {
            warn!("{}", message);
        }
        reconciliation
    }

    /// A zero or negative odometer delta cannot validate anything.
    pub fn has_ground_truth(&self) -> bool {
        self.odometer_km > 0.
    }

    pub fn absolute_difference_km(&self) -> f64 {
        (self.matched_km - self.odometer_km).abs()
    }

    pub fn relative_difference(&self) -> Option<f64> {
        if self.has_ground_truth() {
            Some(self.absolute_difference_km() / self.odometer_km)
        } else {
            None
        }
    }

    /// The message shown to the analyst when the route looks wrong.
    pub fn warning(&self, relative_tolerance: f64) -> Option<String> {
        if self.has_ground_truth() && !self.within_tolerance {
            Some(format!(
                "Warning: predicted route distance ({:.2} km) is not within {}% of odometer distance ({:.2} km).",
                self.matched_km,
                relative_tolerance * 100.,
                self.odometer_km
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within() {
        let r = Reconciliation::new(10.3, 10., 0.05);
        assert!(r.within_tolerance);
        assert_eq!(r.warning(0.05), None);
        assert!((r.relative_difference().unwrap() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn outside() {
        let r = Reconciliation::new(11., 10., 0.05);
        assert!(!r.within_tolerance);
        assert_eq!(
            r.warning(0.05).unwrap(),
            "Warning: predicted route distance (11.00 km) is not within 5% of odometer distance (10.00 km)."
        );
    }

    #[test]
    fn no_ground_truth() {
        let r = Reconciliation::new(3., 0., 0.05);
        assert!(!r.within_tolerance);
        assert!(!r.has_ground_truth());
        assert_eq!(r.warning(0.05), None);
        assert_eq!(r.relative_difference(), None);
    }
}
