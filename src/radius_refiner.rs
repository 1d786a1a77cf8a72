//! Widens the per-point search radius until the matched distance agrees with
//! the odometer.
//!
//! Tight radii give faithful matches but fail more often when GPS noise or a
//! low sampling rate pushes points away from the road. The loop starts tight
//! and grows the radii geometrically, capped, for a bounded number of
//! attempts:
//!
//! ```text
//! 20 -> 30 -> 45 -> 67.5          (cap never reached)
//! 80 -> 100 -> 100 -> 100         (cap clamps the growth)
//! ```

use crate::config::MatchPolicy;
use crate::error::RouteError;
use crate::osrm::{MatchRequest, MatchedRoute, RoutingService};

/// A match together with how it was obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct RefinedMatch {
    pub route: MatchedRoute,
    /// Radii of the request that produced `route`.
    pub radiuses: Vec<f64>,
    /// Total calls made to the service, the initial one included.
    pub requests_issued: usize,
    /// Radius of the first point for every request made, in order.
    pub radius_history: Vec<f64>,
    pub odometer_km: Option<f64>,
}

impl RefinedMatch {
    pub fn matched_km(&self) -> f64 {
        self.route.distance_km()
    }

    pub fn refinement_attempts(&self) -> usize {
        self.requests_issued.saturating_sub(1)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Refinement {
    WithinTolerance(RefinedMatch),
    /// Still off by more than the tolerance after every attempt. A warning for
    /// the analyst, the route is still usable.
    OutsideTolerance(RefinedMatch),
    /// An odometer reading is missing, so the initial match was kept
    /// unchecked.
    Unvalidated(RefinedMatch),
}

impl Refinement {
    pub fn refined_match(&self) -> &RefinedMatch {
        match self {
            Refinement::WithinTolerance(m)
            | Refinement::OutsideTolerance(m)
            | Refinement::Unvalidated(m) => m,
        }
    }

    pub fn into_refined_match(self) -> RefinedMatch {
        match self {
            Refinement::WithinTolerance(m)
            | Refinement::OutsideTolerance(m)
            | Refinement::Unvalidated(m) => m,
        }
    }

    pub fn is_within_tolerance(&self) -> bool {
        matches!(self, Refinement::WithinTolerance(_))
    }
}

/// Next radius set: every radius grown by the multiplier, clamped to the cap.
pub fn widen(radiuses: &[f64], policy: &MatchPolicy) -> Vec<f64> {
    radiuses
        .iter()
        .map(|r| (r * policy.radius_multiplier).min(policy.max_radius_m))
        .collect()
}

pub fn is_within_tolerance(matched_km: f64, odometer_km: f64, relative_tolerance: f64) -> bool {
    odometer_km > 0. && (matched_km - odometer_km).abs() <= relative_tolerance * odometer_km
}

// The raw comparison the loop runs on. Unlike `is_within_tolerance` it does
// not require a positive odometer: a zero delta tolerates nothing and a
// negative one is never met.
fn agrees(matched_km: f64, odometer_km: f64, relative_tolerance: f64) -> bool {
    (matched_km - odometer_km).abs() <= relative_tolerance * odometer_km
}

/// Runs the initial match with `initial_radius_m` on every point and refines
/// it against `odometer_km`.
///
/// The radii of `request` are replaced. Any failure from the service ends the
/// loop at once with that error; a radius set is never sent twice. Without an
/// odometer delta there is nothing to compare with and the initial match is
/// returned as is.
pub fn refine(
    service: &dyn RoutingService,
    request: &MatchRequest,
    odometer_km: Option<f64>,
    policy: &MatchPolicy,
) -> Result<Refinement, RouteError> {
    let mut radiuses = vec![policy.initial_radius_m; request.coordinates().len()];
    let mut current_request = request.with_radiuses(radiuses.clone())?;
    let mut route = service.match_trace(&current_request)?;
    let mut requests_issued = 1;
    let mut radius_history = vec![policy.initial_radius_m];

    let finish = |route, radiuses, requests_issued, radius_history| RefinedMatch {
        route,
        radiuses,
        requests_issued,
        radius_history,
        odometer_km,
    };

    let Some(odometer) = odometer_km else {
        info!("odometer reading missing, skipping distance validation");
        return Ok(Refinement::Unvalidated(finish(
            route,
            radiuses,
            requests_issued,
            radius_history,
        )));
    };

    let tolerance_km = policy.relative_tolerance * odometer;
    let mut within = agrees(route.distance_km(), odometer, policy.relative_tolerance);
    let mut attempt = 0;
    while !within && attempt < policy.max_refinement_attempts {
        attempt += 1;
        radiuses = widen(&radiuses, policy);
        current_request = current_request.with_radiuses(radiuses.clone())?;
        info!(
            "attempt {}: matched {:.2} km vs odometer {:.2} km (tolerance {:.2} km), retrying with radius {}",
            attempt,
            route.distance_km(),
            odometer,
            tolerance_km,
            radiuses.first().copied().unwrap_or_default()
        );
        route = service.match_trace(&current_request)?;
        requests_issued += 1;
        radius_history.push(radiuses.first().copied().unwrap_or_default());
        within = agrees(route.distance_km(), odometer, policy.relative_tolerance);
    }

    let refined = finish(route, radiuses, requests_issued, radius_history);
    if within {
        Ok(Refinement::WithinTolerance(refined))
    } else {
        info!(
            "matched distance {:.2} km is not within {}% of odometer distance {:.2} km after {} requests",
            refined.matched_km(),
            policy.relative_tolerance * 100.,
            odometer,
            refined.requests_issued
        );
        Ok(Refinement::OutsideTolerance(refined))
    }
}
