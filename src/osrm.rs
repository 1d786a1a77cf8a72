//! Requests to an OSRM compatible routing service.
//!
//! `MatchRequest` is the pure part: it turns a trip into the exact parameter
//! set of a `match` call. `OsrmClient` is the blocking HTTP collaborator behind
//! the `RoutingService` trait, so the refinement loop can run against a fake.

use std::time::Duration;

use anyhow::Result;
use geo_types::{Coord, LineString};
use serde::Deserialize;

use crate::config::ServiceConfig;
use crate::error::RouteError;
use crate::gps_sample::Point;
use crate::timeline::GapPolicy;

#[derive(Clone, Debug, PartialEq)]
pub struct MatchRequest {
    coordinates: Vec<Point>,
    timestamps: Vec<i64>,
    radiuses: Vec<f64>,
    gaps: GapPolicy,
    tidy: bool,
}

impl MatchRequest {
    pub fn build(
        coordinates: Vec<Point>,
        timestamps: Vec<i64>,
        radiuses: Vec<f64>,
        gaps: GapPolicy,
    ) -> Result<Self, RouteError> {
        if coordinates.len() < 2 {
            return Err(RouteError::InvalidRequest(format!(
                "need at least 2 points, got {}",
                coordinates.len()
            )));
        }
        if timestamps.len() != coordinates.len() || radiuses.len() != coordinates.len() {
            return Err(RouteError::InvalidRequest(format!(
                "{} coordinates, {} timestamps, {} radiuses",
                coordinates.len(),
                timestamps.len(),
                radiuses.len()
            )));
        }
        Ok(MatchRequest {
            coordinates,
            timestamps,
            radiuses,
            gaps,
            tidy: true,
        })
    }

    /// Same trace and gap policy, different search radii.
    pub fn with_radiuses(&self, radiuses: Vec<f64>) -> Result<Self, RouteError> {
        Self::build(
            self.coordinates.clone(),
            self.timestamps.clone(),
            radiuses,
            self.gaps,
        )
    }

    pub fn coordinates(&self) -> &[Point] {
        &self.coordinates
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn radiuses(&self) -> &[f64] {
        &self.radiuses
    }

    pub fn gaps(&self) -> GapPolicy {
        self.gaps
    }

    /// Query parameters in the order the service documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("timestamps", join(&self.timestamps)),
            ("radiuses", join(&self.radiuses)),
            ("gaps", self.gaps.to_string()),
        ];
        if self.tidy {
            params.push(("tidy", "true".to_string()));
        }
        params.push(("overview", "full".to_string()));
        params.push(("geometries", "geojson".to_string()));
        params
    }

    pub fn url(&self, base_url: &str, profile: &str) -> String {
        format!(
            "{}/match/v1/{}/{}?{}",
            base_url.trim_end_matches('/'),
            profile,
            coordinates_path(&self.coordinates),
            encode_params(&self.params())
        )
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn coordinates_path(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| p.to_lng_lat_string())
        .collect::<Vec<_>>()
        .join(";")
}

// values are numbers, `;` and plain words, nothing needs escaping
fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn route_url(base_url: &str, profile: &str, from: &Point, to: &Point) -> String {
    format!(
        "{}/route/v1/{}/{}?overview=full&geometries=geojson",
        base_url.trim_end_matches('/'),
        profile,
        coordinates_path(&[*from, *to])
    )
}

/// Best route returned by the service for a match or route call.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedRoute {
    /// x is longitude, y is latitude.
    pub geometry: LineString<f64>,
    pub distance_m: f64,
    pub confidence: Option<f64>,
}

impl MatchedRoute {
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.
    }

    pub fn points(&self) -> Vec<Point> {
        self.geometry
            .coords()
            .map(|c| Point::new(c.y, c.x))
            .collect()
    }
}

pub trait RoutingService {
    /// Snaps a GPS trace to the road network.
    fn match_trace(&self, request: &MatchRequest) -> Result<MatchedRoute, RouteError>;

    /// Shortest path between two points.
    fn route(&self, from: &Point, to: &Point) -> Result<MatchedRoute, RouteError>;
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    matchings: Option<Vec<OsrmRoute>>,
    #[serde(default)]
    routes: Option<Vec<OsrmRoute>>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    #[serde(default)]
    confidence: Option<f64>,
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

impl From<OsrmRoute> for MatchedRoute {
    fn from(route: OsrmRoute) -> Self {
        MatchedRoute {
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[x, y]| Coord { x, y })
                .collect(),
            distance_m: route.distance,
            confidence: route.confidence,
        }
    }
}

// `NoMatch`/`NoRoute` come back as HTTP 400 but mean "nothing found", not
// "the call was wrong".
const NOTHING_FOUND_CODES: [&str; 3] = ["NoMatch", "NoRoute", "NoSegment"];

/// Interprets a response from either endpoint. `matchings` is read for match
/// calls and `routes` for route calls.
pub fn parse_response(status: u16, body: &str, is_match: bool) -> Result<MatchedRoute, RouteError> {
    let parsed = serde_json::from_str::<OsrmResponse>(body);
    if !(200..300).contains(&status) {
        return match parsed {
            Ok(response) if NOTHING_FOUND_CODES.contains(&response.code.as_str()) => {
                Err(RouteError::NoMatch)
            }
            _ => Err(RouteError::Service {
                status,
                body: body.to_string(),
            }),
        };
    }
    let response = parsed.map_err(|e| RouteError::Parse(e.to_string()))?;
    if response.code != "Ok" {
        return Err(RouteError::NoMatch);
    }
    let candidates = if is_match {
        response.matchings
    } else {
        response.routes
    };
    candidates
        .and_then(|c| c.into_iter().next())
        .map(MatchedRoute::from)
        .ok_or(RouteError::NoMatch)
}

pub struct OsrmClient {
    base_url: String,
    profile: String,
    http: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()?;
        Ok(OsrmClient {
            base_url: config.base_url.clone(),
            profile: config.profile.clone(),
            http,
        })
    }

    fn get(&self, url: &str, is_match: bool) -> Result<MatchedRoute, RouteError> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| RouteError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| RouteError::Transport(e.to_string()))?;
        parse_response(status, &body, is_match)
    }
}

impl RoutingService for OsrmClient {
    fn match_trace(&self, request: &MatchRequest) -> Result<MatchedRoute, RouteError> {
        self.get(&request.url(&self.base_url, &self.profile), true)
    }

    fn route(&self, from: &Point, to: &Point) -> Result<MatchedRoute, RouteError> {
        self.get(&route_url(&self.base_url, &self.profile, from, to), false)
    }
}
