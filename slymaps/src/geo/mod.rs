//! Geographic primitives shared by providers and stores.
//!
//! Positions travel in two shapes:
//! - [`LatLng`] for request parameters and point records
//! - [`Coordinate`] (`[longitude, latitude]`) for path geometry, matching
//!   the GeoJSON axis order the rendering layer consumes

use serde::{Deserialize, Serialize};

/// A `[longitude, latitude]` pair.
pub type Coordinate = [f64; 2];

/// Encoded polylines from OneBusAway and OpenTripPlanner use 5 digits of precision.
pub const POLYLINE_PRECISION: u32 = 5;

/// A latitude/longitude point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both axes are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// GeoJSON-ordered coordinate.
    pub fn to_coordinate(self) -> Coordinate {
        [self.lng, self.lat]
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

impl std::str::FromStr for LatLng {
    type Err = String;

    /// Parses `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'lat,lng', got '{}'", s))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| format!("invalid latitude '{}'", lat.trim()))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|_| format!("invalid longitude '{}'", lng.trim()))?;
        let point = LatLng::new(lat, lng);
        if !point.is_valid() {
            return Err(format!("coordinate out of range: {}", s));
        }
        Ok(point)
    }
}

/// Decode a Google-style encoded polyline into `[lng, lat]` pairs.
///
/// Returns `None` for malformed input or input that decodes to positions
/// outside WGS84 bounds.
pub fn decode_polyline(encoded: &str) -> Option<Vec<Coordinate>> {
    if encoded.is_empty() {
        return None;
    }

    let line = polyline::decode_polyline(encoded, POLYLINE_PRECISION).ok()?;
    let coords: Vec<Coordinate> = line.0.iter().map(|c| [c.x, c.y]).collect();

    let in_bounds = coords
        .iter()
        .all(|[lng, lat]| LatLng::new(*lat, *lng).is_valid());
    if coords.is_empty() || !in_bounds {
        return None;
    }

    Some(coords)
}

/// Encode `[lng, lat]` pairs as a polyline.
pub fn encode_polyline(coords: &[Coordinate]) -> Option<String> {
    let line: geo_types::LineString<f64> = coords
        .iter()
        .map(|[lng, lat]| geo_types::coord! { x: *lng, y: *lat })
        .collect();
    polyline::encode_coordinates(line, POLYLINE_PRECISION).ok()
}

/// Append `next` onto `path`, skipping the first point of `next` when it
/// repeats the current last point.
pub fn extend_path(path: &mut Vec<Coordinate>, next: &[Coordinate]) {
    let mut points = next.iter();
    if let (Some(last), Some(first)) = (path.last(), next.first()) {
        if last == first {
            points.next();
        }
    }
    path.extend(points.copied());
}
