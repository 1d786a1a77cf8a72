//! What the analyst is looking at, and the boundary where trip errors stop.

use std::sync::Arc;

use itertools::Itertools;
use serde::Serialize;

use crate::config::MatchPolicy;
use crate::error::RouteError;
use crate::gps_sample::Point;
use crate::osrm::{MatchRequest, RoutingService};
use crate::radius_refiner::{self, Refinement};
use crate::reconcile::Reconciliation;
use crate::timeline::{self, GapPolicy};
use crate::trip_data::{Dataset, Trip};
use crate::utils;

/// Single shared password, compared as plain text. No password means open.
pub struct AccessGate {
    password: Option<String>,
}

impl AccessGate {
    pub fn new(password: Option<String>) -> Self {
        AccessGate {
            password: password.filter(|p| !p.is_empty()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.password.is_none()
    }

    pub fn check(&self, input: &str) -> bool {
        match &self.password {
            None => true,
            Some(password) => password == input,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    pub number: usize,
    pub point: Point,
    pub timestamp_sec: i64,
    pub timestamp: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: Point,
    pub north_east: Point,
}

impl Bounds {
    pub fn of(points: &[Point]) -> Option<Bounds> {
        let first = points.first()?;
        let mut bounds = Bounds {
            south_west: *first,
            north_east: *first,
        };
        for p in points {
            bounds.south_west.latitude = bounds.south_west.latitude.min(p.latitude);
            bounds.south_west.longitude = bounds.south_west.longitude.min(p.longitude);
            bounds.north_east.latitude = bounds.north_east.latitude.max(p.latitude);
            bounds.north_east.longitude = bounds.north_east.longitude.max(p.longitude);
        }
        Some(bounds)
    }
}

fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(Point::new(
        points.iter().map(|p| p.latitude).sum::<f64>() / n,
        points.iter().map(|p| p.longitude).sum::<f64>() / n,
    ))
}

/// Everything a map widget needs to show one trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TripView {
    pub cycle_id: String,
    pub start: Option<String>,
    pub markers: Vec<Marker>,
    pub bounds: Option<Bounds>,
    pub center: Option<Point>,
    pub gap_policy: Option<GapPolicy>,
    pub matched_route: Vec<Point>,
    pub matched_km: Option<f64>,
    pub requests_issued: usize,
    pub direct_route: Vec<Point>,
    pub direct_km: Option<f64>,
    /// `None` when an odometer reading is missing.
    pub odometer_km: Option<f64>,
    pub reconciliation: Option<Reconciliation>,
    /// Shown to the analyst as is, in order.
    pub messages: Vec<String>,
}

impl TripView {
    pub fn has_route(&self) -> bool {
        !self.matched_route.is_empty()
    }
}

fn describe(error: &RouteError) -> String {
    match error {
        RouteError::NoMatch => "Could not find a matching route for this trip.".to_string(),
        RouteError::Service { status, body } => format!("Error: {} {}", status, body),
        other => other.to_string(),
    }
}

/// Builds the view of one trip. Never fails: a `RouteError` ends up as a
/// message and whatever is not built yet stays empty.
pub fn build_trip_view(
    trip: &Trip,
    service: &dyn RoutingService,
    policy: &MatchPolicy,
) -> TripView {
    let mut view = TripView {
        cycle_id: trip.cycle_id.clone(),
        start: trip.start_sec.map(utils::format_timestamp),
        odometer_km: trip.odometer_km(),
        ..Default::default()
    };
    if trip.samples.is_empty() {
        view.messages
            .push("No coordinates available for this trip.".to_string());
        return view;
    }
    if let Err(error) = fill_trip_view(&mut view, trip, service, policy) {
        // bad rows are expected in the tables; the service failing is not
        if error.is_service_side() {
            warn!("trip {}: {}", trip.cycle_id, error);
        } else {
            info!("trip {}: {}", trip.cycle_id, error);
        }
        view.messages.push(describe(&error));
    }
    view
}

fn fill_trip_view(
    view: &mut TripView,
    trip: &Trip,
    service: &dyn RoutingService,
    policy: &MatchPolicy,
) -> Result<(), RouteError> {
    // a bad cell spoils the whole trip, no partial rendering
    let points = trip
        .samples
        .iter()
        .map(|s| s.position())
        .collect::<Result<Vec<Point>, RouteError>>()?;
    let timestamps = timeline::normalize_timestamps(trip, policy)?;

    view.markers = points
        .iter()
        .zip(timestamps.iter())
        .enumerate()
        .map(|(i, (point, ts))| Marker {
            number: i + 1,
            point: *point,
            timestamp_sec: *ts,
            timestamp: utils::format_timestamp(*ts),
        })
        .collect();
    view.bounds = Bounds::of(&points);
    view.center = centroid(&points);

    let gaps = timeline::classify_gaps(&timestamps, policy.gap_split_threshold_sec);
    view.gap_policy = Some(gaps);
    let radiuses = vec![policy.initial_radius_m; points.len()];
    let request = MatchRequest::build(points.clone(), timestamps, radiuses, gaps)?;

    let refinement = radius_refiner::refine(service, &request, view.odometer_km, policy)?;
    let refined = refinement.refined_match();
    view.matched_route = refined.route.points();
    view.matched_km = Some(refined.matched_km());
    view.requests_issued = refined.requests_issued;

    if let Some(odometer_km) = view.odometer_km {
        let reconciliation =
            Reconciliation::new(refined.matched_km(), odometer_km, policy.relative_tolerance);
        if let Refinement::OutsideTolerance(_) = refinement {
            if let Some(message) = reconciliation.warning(policy.relative_tolerance) {
                view.messages.push(message);
            }
        }
        view.reconciliation = Some(reconciliation);
    }

    // the straight comparison is informational, its failure is not the trip's
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        match service.route(first, last) {
            Ok(direct) => {
                view.direct_km = Some(direct.distance_km());
                view.direct_route = direct.points();
            }
            Err(error) => view
                .messages
                .push(format!("Direct route unavailable: {}", describe(&error))),
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripTableRow {
    pub trip_number: usize,
    pub cycle_id: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Navigation state of one analyst. Only the explicit navigation methods
/// change it; viewing never does.
pub struct ExplorerSession {
    dataset: Arc<Dataset>,
    policy: MatchPolicy,
    cycle_index: usize,
    vehicle: Option<String>,
    trip_index: usize,
}

impl ExplorerSession {
    pub fn new(dataset: Arc<Dataset>, policy: MatchPolicy) -> Self {
        ExplorerSession {
            dataset,
            policy,
            cycle_index: 0,
            vehicle: None,
            trip_index: 0,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn cycle_index(&self) -> usize {
        self.cycle_index
    }

    pub fn current_cycle_id(&self) -> Option<&str> {
        self.dataset
            .trips()
            .get(self.cycle_index)
            .map(|t| t.cycle_id.as_str())
    }

    pub fn next_cycle(&mut self) {
        let count = self.dataset.trips().len();
        if count > 0 {
            self.cycle_index = (self.cycle_index + 1) % count;
        }
    }

    pub fn previous_cycle(&mut self) {
        let count = self.dataset.trips().len();
        if count > 0 {
            self.cycle_index = (self.cycle_index + count - 1) % count;
        }
    }

    pub fn view_current_cycle(&self, service: &dyn RoutingService) -> Option<TripView> {
        self.current_cycle_id()
            .map(|cycle_id| self.view_trip(cycle_id, service))
    }

    pub fn view_trip(&self, cycle_id: &str, service: &dyn RoutingService) -> TripView {
        match self.dataset.trip(cycle_id) {
            Some(trip) => build_trip_view(trip, service, &self.policy),
            None => TripView {
                cycle_id: cycle_id.to_string(),
                messages: vec!["No data available for this cycle.".to_string()],
                ..Default::default()
            },
        }
    }

    pub fn vehicle_models(&self) -> Vec<&str> {
        self.dataset
            .sequences()
            .iter()
            .map(|s| s.vehicle_model.as_str())
            .unique()
            .collect()
    }

    pub fn select_vehicle(&mut self, vehicle_model: &str) -> anyhow::Result<()> {
        if self.dataset.sequence(vehicle_model).is_none() {
            bail!("unknown vehicle model `{}`", vehicle_model);
        }
        self.vehicle = Some(vehicle_model.to_string());
        self.trip_index = 0;
        Ok(())
    }

    pub fn selected_vehicle(&self) -> Option<&str> {
        self.vehicle.as_deref()
    }

    /// Trips of the vehicle's sequence, ordered by start time and numbered
    /// from 1. Trips missing from the sample table are left out.
    pub fn trip_table(&self, vehicle_model: &str) -> Vec<TripTableRow> {
        let Some(sequence) = self.dataset.sequence(vehicle_model) else {
            return Vec::new();
        };
        let mut trips: Vec<&Trip> = sequence
            .trip_ids
            .iter()
            .filter_map(|id| self.dataset.trip(id))
            .collect();
        trips.sort_by_key(|t| (t.start_sec.is_none(), t.start_sec));
        trips
            .into_iter()
            .enumerate()
            .map(|(i, trip)| TripTableRow {
                trip_number: i + 1,
                cycle_id: trip.cycle_id.clone(),
                start: trip.start_sec.map(utils::format_timestamp),
                end: trip.end_sec.map(utils::format_timestamp),
            })
            .collect()
    }

    pub fn select_trip(&mut self, trip_index: usize) -> anyhow::Result<()> {
        let Some(vehicle) = &self.vehicle else {
            bail!("no vehicle selected");
        };
        let count = self.trip_table(vehicle).len();
        if trip_index >= count {
            bail!("trip {} out of range, vehicle has {} trips", trip_index + 1, count);
        }
        self.trip_index = trip_index;
        Ok(())
    }

    pub fn selected_trip_index(&self) -> usize {
        self.trip_index
    }

    pub fn view_selected_trip(&self, service: &dyn RoutingService) -> Option<TripView> {
        let vehicle = self.vehicle.as_deref()?;
        let row = self.trip_table(vehicle).into_iter().nth(self.trip_index)?;
        Some(self.view_trip(&row.cycle_id, service))
    }
}
