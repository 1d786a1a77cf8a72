use std::io::Write;

use anyhow::Result;
use geo_types::Point as GeoPoint;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};

use crate::gps_sample::Point;
use crate::session::TripView;

fn waypoint(point: &Point) -> Waypoint {
    // gpx points are (x = lon, y = lat)
    Waypoint::new(GeoPoint::new(point.longitude, point.latitude))
}

fn track(name: &str, points: &[Point]) -> Track {
    let mut segment = TrackSegment::new();
    segment.points = points.iter().map(waypoint).collect();
    let mut track = Track::new();
    track.name = Some(name.to_string());
    track.segments.push(segment);
    track
}

/// Samples become numbered waypoints, the matched and the direct route become
/// the tracks "matched" and "direct" (each only when present).
pub fn trip_view_to_gpx(view: &TripView) -> Result<Gpx> {
    let mut gpx = Gpx::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some("tripmatch".to_string());
    for marker in &view.markers {
        let mut point = waypoint(&marker.point);
        point.name = Some(format!("{} #{}", view.cycle_id, marker.number));
        point.description = Some(marker.timestamp.clone());
        gpx.waypoints.push(point);
    }
    if !view.matched_route.is_empty() {
        gpx.tracks.push(track("matched", &view.matched_route));
    }
    if !view.direct_route.is_empty() {
        gpx.tracks.push(track("direct", &view.direct_route));
    }
    Ok(gpx)
}

pub fn trip_view_to_gpx_file<W: Write>(view: &TripView, writer: &mut W) -> Result<()> {
    let gpx = trip_view_to_gpx(view)?;
    gpx::write(&gpx, writer)?;
    Ok(())
}
