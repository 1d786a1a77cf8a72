pub mod test_utils;
use test_utils::*;

use tripmatch_core::config::MatchPolicy;
use tripmatch_core::error::RouteError;
use tripmatch_core::osrm::MatchRequest;
use tripmatch_core::radius_refiner::{refine, Refinement};
use tripmatch_core::timeline::GapPolicy;

fn request(n: usize) -> MatchRequest {
    let trip = trip_with_samples("c", n, 10.);
    let points = trip
        .samples
        .iter()
        .map(|s| s.position().unwrap())
        .collect();
    let timestamps = trip.samples.iter().map(|s| s.timestamp_sec.unwrap()).collect();
    MatchRequest::build(points, timestamps, vec![20.; n], GapPolicy::Ignore).unwrap()
}

#[test]
fn refines_until_within_tolerance() {
    let service = ScriptedRoutingService::new().then_km(11.).then_km(10.3);
    let refinement = refine(&service, &request(4), Some(10.), &MatchPolicy::default()).unwrap();

    assert!(refinement.is_within_tolerance());
    let refined = refinement.refined_match();
    assert_eq!(refined.requests_issued, 2);
    assert_eq!(refined.refinement_attempts(), 1);
    assert_eq!(refined.radius_history, vec![20., 30.]);
    assert_eq!(refined.radiuses, vec![30.; 4]);
    assert!((refined.matched_km() - 10.3).abs() < 1e-9);
    assert_eq!(service.match_calls(), 2);
}

#[test]
fn first_match_good_enough() {
    let service = ScriptedRoutingService::always_km(9.6);
    let refinement = refine(&service, &request(3), Some(10.), &MatchPolicy::default()).unwrap();
    assert!(matches!(refinement, Refinement::WithinTolerance(_)));
    assert_eq!(service.match_calls(), 1);
}

#[test]
fn gives_up_after_three_attempts() {
    let service = ScriptedRoutingService::always_km(20.);
    let refinement = refine(&service, &request(5), Some(10.), &MatchPolicy::default()).unwrap();

    let Refinement::OutsideTolerance(refined) = refinement else {
        panic!("expected outside tolerance");
    };
    assert_eq!(refined.requests_issued, 4);
    assert_eq!(service.match_calls(), 4);
    assert_eq!(service.first_radii(), vec![20., 30., 45., 67.5]);
    assert_eq!(refined.radius_history, service.first_radii());
    // the last result is kept
    assert_eq!(refined.matched_km(), 20.);
}

#[test]
fn radii_grow_monotonically_and_stay_capped() {
    let policy = MatchPolicy {
        initial_radius_m: 80.,
        ..MatchPolicy::default()
    };
    let service = ScriptedRoutingService::always_km(50.);
    refine(&service, &request(3), Some(10.), &policy).unwrap();

    assert_eq!(service.first_radii(), vec![80., 100., 100., 100.]);
    for request in service.requests() {
        let radiuses = request.radiuses();
        assert!(radiuses.iter().all(|r| *r == radiuses[0]));
        assert!(radiuses.iter().all(|r| *r <= policy.max_radius_m));
    }
    let radii = service.first_radii();
    assert!(radii.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn every_request_keeps_trace_and_gaps() {
    let service = ScriptedRoutingService::always_km(30.);
    let original = request(6);
    refine(&service, &original, Some(10.), &MatchPolicy::default()).unwrap();
    for sent in service.requests() {
        assert_eq!(sent.coordinates(), original.coordinates());
        assert_eq!(sent.timestamps(), original.timestamps());
        assert_eq!(sent.gaps(), original.gaps());
    }
}

#[test]
fn no_match_on_initial_request() {
    let service = ScriptedRoutingService::new().then(Err(RouteError::NoMatch));
    let result = refine(&service, &request(3), Some(10.), &MatchPolicy::default());
    assert_eq!(result, Err(RouteError::NoMatch));
    assert_eq!(service.match_calls(), 1);
}

#[test]
fn service_error_stops_refinement() {
    let error = RouteError::Service {
        status: 502,
        body: "Bad Gateway".to_string(),
    };
    let service = ScriptedRoutingService::new()
        .then_km(20.)
        .then(Err(error.clone()))
        .then_km(10.);
    let result = refine(&service, &request(3), Some(10.), &MatchPolicy::default());
    assert_eq!(result, Err(error));
    assert_eq!(service.match_calls(), 2);
}

#[test]
fn zero_odometer_still_refines() {
    let service = ScriptedRoutingService::always_km(12.);
    let refinement = refine(&service, &request(3), Some(0.), &MatchPolicy::default()).unwrap();
    assert!(matches!(refinement, Refinement::OutsideTolerance(_)));
    assert_eq!(refinement.into_refined_match().requests_issued, 4);
    assert_eq!(service.match_calls(), 4);
}

#[test]
fn zero_odometer_and_zero_match_agree() {
    let service = ScriptedRoutingService::always_km(0.);
    let refinement = refine(&service, &request(3), Some(0.), &MatchPolicy::default()).unwrap();
    assert!(refinement.is_within_tolerance());
    assert_eq!(service.match_calls(), 1);
}

#[test]
fn negative_odometer_refines_every_attempt() {
    let service = ScriptedRoutingService::always_km(12.);
    let refinement = refine(&service, &request(3), Some(-4.), &MatchPolicy::default()).unwrap();
    assert!(matches!(refinement, Refinement::OutsideTolerance(_)));
    assert_eq!(service.first_radii(), vec![20., 30., 45., 67.5]);
}

#[test]
fn missing_odometer_is_not_validated() {
    let service = ScriptedRoutingService::always_km(12.);
    let refinement = refine(&service, &request(3), None, &MatchPolicy::default()).unwrap();
    assert!(matches!(refinement, Refinement::Unvalidated(_)));
    assert_eq!(refinement.into_refined_match().odometer_km, None);
    assert_eq!(service.match_calls(), 1);
}

#[test]
fn respects_configured_attempt_count() {
    let policy = MatchPolicy {
        max_refinement_attempts: 1,
        ..MatchPolicy::default()
    };
    let service = ScriptedRoutingService::always_km(20.);
    let refinement = refine(&service, &request(3), Some(10.), &policy).unwrap();
    assert!(!refinement.is_within_tolerance());
    assert_eq!(service.match_calls(), 2);
}

#[test]
fn random_distances_keep_the_bounds() {
    use rand::Rng;

    let mut rng = rand::rng();
    let policy = MatchPolicy::default();
    for _ in 0..200 {
        let odometer_km = rng.random_range(0.5..50.);
        let mut service = ScriptedRoutingService::new();
        for _ in 0..4 {
            service = service.then_km(rng.random_range(0.0..100.));
        }
        let refined = refine(&service, &request(3), Some(odometer_km), &policy)
            .unwrap()
            .into_refined_match();

        assert!(refined.requests_issued <= 4);
        assert_eq!(service.match_calls(), refined.requests_issued);
        let radii = service.first_radii();
        assert_eq!(radii[0], 20.);
        assert!(radii.windows(2).all(|w| w[0] <= w[1]));
        assert!(radii.iter().all(|r| *r <= 100.));
    }
}
