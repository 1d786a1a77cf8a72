use std::{fmt, str::FromStr};

use h3o::{CellIndex, LatLng};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Point {
            latitude,
            longitude,
        }
    }

    // https://en.wikipedia.org/wiki/Haversine_formula
    pub fn haversine_distance(&self, other: &Point) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.;
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lng = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.).sin().powi(2);
        2. * EARTH_RADIUS_M * a.sqrt().asin()
    }

    /// `lng,lat`, the order routing services expect.
    pub fn to_lng_lat_string(&self) -> String {
        format!("{},{}", self.longitude, self.latitude)
    }
}

/// A spatial cell identifier as it appears in the sample table.
///
/// The table stores the 64-bit H3 index as a decimal number, sometimes as a
/// string. Nothing is validated until `decode` is called.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellId(i128);

impl CellId {
    /// Decodes the cell into the coordinates of its centre.
    pub fn decode(&self) -> Result<Point, RouteError> {
        let raw = u64::try_from(self.0).map_err(|_| RouteError::Decode(self.to_string()))?;
        let cell = CellIndex::try_from(raw).map_err(|_| RouteError::Decode(self.to_string()))?;
        let center = LatLng::from(cell);
        Ok(Point::new(center.lat(), center.lng()))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CellId {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // dataframe exports sometimes write integral values as `123.0`
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        digits
            .parse::<i128>()
            .map(CellId)
            .map_err(|_| RouteError::Decode(s.to_string()))
    }
}

/// Decodes a cell exactly as found in the sample table.
pub fn decode_cell(text: &str) -> Result<Point, RouteError> {
    text.parse::<CellId>()?.decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use h3o::Resolution;

    fn cell_near(lat: f64, lng: f64) -> u64 {
        u64::from(LatLng::new(lat, lng).unwrap().to_cell(Resolution::Ten))
    }

    #[test]
    fn decode_near_the_source_point() {
        let raw = cell_near(48.8566, 2.3522);
        let center = decode_cell(&raw.to_string()).unwrap();
        // a resolution 10 cell is well under 100m across
        assert!(center.haversine_distance(&Point::new(48.8566, 2.3522)) < 100.);
        assert_eq!(decode_cell(&format!(" {raw}.0 ")), Ok(center));
    }

    #[test]
    fn invalid_cells() {
        assert_eq!(decode_cell("abc"), Err(RouteError::Decode("abc".to_string())));
        assert_eq!(decode_cell("1.5"), Err(RouteError::Decode("1.5".to_string())));
        assert_eq!(decode_cell("-1"), Err(RouteError::Decode("-1".to_string())));
        assert_eq!(decode_cell("0"), Err(RouteError::Decode("0".to_string())));
        assert!(matches!(
            decode_cell("99999999999999999999999"),
            Err(RouteError::Decode(_))
        ));
    }
}
