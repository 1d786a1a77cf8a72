use std::collections::VecDeque;
use std::sync::Mutex;

use geo_types::{Coord, LineString};
use h3o::{LatLng, Resolution};
use tripmatch_core::error::RouteError;
use tripmatch_core::gps_sample::Point;
use tripmatch_core::osrm::{MatchRequest, MatchedRoute, RoutingService};
use tripmatch_core::trip_data::{Dataset, Sample, Sequence, Trip};

// Paris, around the Louvre
pub const START_LAT: f64 = 48.8606;
pub const START_LNG: f64 = 2.3376;

pub fn cell_at(lat: f64, lng: f64) -> String {
    u64::from(LatLng::new(lat, lng).unwrap().to_cell(Resolution::Ten)).to_string()
}

pub fn route_of_km(km: f64) -> MatchedRoute {
    let geometry: LineString<f64> = vec![
        Coord {
            x: START_LNG,
            y: START_LAT,
        },
        Coord {
            x: START_LNG + 0.01,
            y: START_LAT + 0.01,
        },
    ]
    .into();
    MatchedRoute {
        geometry,
        distance_m: km * 1000.,
        confidence: Some(0.8),
    }
}

/// Answers `match_trace` from a queue, then keeps repeating `fallback`.
/// Every request is recorded.
pub struct ScriptedRoutingService {
    matches: Mutex<VecDeque<Result<MatchedRoute, RouteError>>>,
    fallback: Result<MatchedRoute, RouteError>,
    direct: Result<MatchedRoute, RouteError>,
    requests: Mutex<Vec<MatchRequest>>,
}

impl ScriptedRoutingService {
    pub fn new() -> Self {
        ScriptedRoutingService {
            matches: Mutex::new(VecDeque::new()),
            fallback: Err(RouteError::NoMatch),
            direct: Ok(route_of_km(1.)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always_km(km: f64) -> Self {
        Self::new().otherwise(Ok(route_of_km(km)))
    }

    pub fn then_km(self, km: f64) -> Self {
        self.then(Ok(route_of_km(km)))
    }

    pub fn then(self, result: Result<MatchedRoute, RouteError>) -> Self {
        self.matches.lock().unwrap().push_back(result);
        self
    }

    pub fn otherwise(mut self, result: Result<MatchedRoute, RouteError>) -> Self {
        self.fallback = result;
        self
    }

    pub fn with_direct(mut self, result: Result<MatchedRoute, RouteError>) -> Self {
        self.direct = result;
        self
    }

    pub fn requests(&self) -> Vec<MatchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn match_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Radius of the first point of every request, in order.
    pub fn first_radii(&self) -> Vec<f64> {
        self.requests()
            .iter()
            .map(|r| r.radiuses()[0])
            .collect()
    }
}

impl RoutingService for ScriptedRoutingService {
    fn match_trace(&self, request: &MatchRequest) -> Result<MatchedRoute, RouteError> {
        self.requests.lock().unwrap().push(request.clone());
        self.matches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn route(&self, _from: &Point, _to: &Point) -> Result<MatchedRoute, RouteError> {
        self.direct.clone()
    }
}

/// A trip of `n` samples one minute apart, heading north-east.
pub fn trip_with_samples(cycle_id: &str, n: usize, odometer_km: f64) -> Trip {
    let start = 1_700_000_000;
    Trip {
        cycle_id: cycle_id.to_string(),
        start_sec: Some(start),
        end_sec: Some(start + 60 * n as i64),
        odo_start_km: Some(1000.),
        odo_end_km: Some(1000. + odometer_km),
        samples: (0..n)
            .map(|i| Sample {
                cell: cell_at(START_LAT + 0.002 * i as f64, START_LNG + 0.002 * i as f64),
                timestamp_sec: Some(start + 60 * i as i64),
            })
            .collect(),
    }
}

/// Three trips of vehicle `m1`, listed out of start order in the sequence.
pub fn small_dataset() -> Dataset {
    let mut t1 = trip_with_samples("c1", 5, 10.);
    let mut t2 = trip_with_samples("c2", 4, 8.);
    let t3 = trip_with_samples("c3", 3, 6.);
    t1.start_sec = Some(1_700_100_000);
    t2.start_sec = Some(1_700_050_000);
    Dataset::new(
        vec![t1, t2, t3],
        vec![Sequence {
            vehicle_model: "m1".to_string(),
            trip_ids: vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
        }],
    )
    .unwrap()
}

pub fn samples_csv(trips: &[Trip]) -> String {
    let mut csv = String::from(
        "CYCLE_ID,geoindex_10,HEAD_COLL_TIMS,DATETIME_START,DATETIME_END,ODO_START,ODO_END\n",
    );
    let opt = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
    for trip in trips {
        for sample in &trip.samples {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                trip.cycle_id,
                sample.cell,
                opt(sample.timestamp_sec),
                opt(trip.start_sec),
                opt(trip.end_sec),
                trip.odo_start_km.map(|v| v.to_string()).unwrap_or_default(),
                trip.odo_end_km.map(|v| v.to_string()).unwrap_or_default(),
            ));
        }
    }
    csv
}
