//! Turn-by-turn routes and transit itineraries.

use serde::{Deserialize, Serialize};

use crate::clock::EpochMillis;
use crate::geo::{Coordinate, LatLng};

/// How a route is travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TravelMode {
    Driving,
    DrivingTraffic,
    Walking,
    Cycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::DrivingTraffic => "driving-traffic",
            TravelMode::Walking => "walking",
            TravelMode::Cycling => "cycling",
            TravelMode::Transit => "transit",
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "driving" | "car" => Ok(TravelMode::Driving),
            "driving-traffic" | "traffic" => Ok(TravelMode::DrivingTraffic),
            "walking" | "walk" => Ok(TravelMode::Walking),
            "cycling" | "bike" | "bicycle" => Ok(TravelMode::Cycling),
            "transit" | "bus" => Ok(TravelMode::Transit),
            other => Err(format!("unknown travel mode '{}'", other)),
        }
    }
}

/// One instruction within a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
    pub maneuver: Option<String>,
    pub location: Option<Coordinate>,
}

/// A leg between two waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub summary: String,
    pub distance: f64,
    pub duration: f64,
    pub steps: Vec<RouteStep>,
}

/// A normalized route from any routing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Always prefixed `route-`.
    pub id: String,
    pub mode: TravelMode,
    pub start: LatLng,
    pub end: LatLng,
    pub geometry: Vec<Coordinate>,
    /// Meters.
    pub distance: f64,
    /// Seconds.
    pub duration: f64,
    pub legs: Vec<RouteLeg>,
}

impl Route {
    /// Generate a fresh route id.
    pub fn generate_id() -> String {
        format!("route-{}", uuid::Uuid::new_v4())
    }
}

/// Endpoint of a transit leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPlace {
    pub name: String,
    pub position: LatLng,
}

/// One leg of a transit itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitLeg {
    /// OTP mode (`WALK`, `BUS`, `TRAM`, ...).
    pub mode: String,
    pub transit_leg: bool,
    pub from: LegPlace,
    pub to: LegPlace,
    pub start_time: EpochMillis,
    pub end_time: EpochMillis,
    pub distance: f64,
    pub duration: f64,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub headsign: Option<String>,
    pub agency_name: Option<String>,
    pub geometry: Vec<Coordinate>,
    pub instruction: String,
}

/// One candidate journey from the trip planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitItinerary {
    pub start_time: EpochMillis,
    pub end_time: EpochMillis,
    pub duration: f64,
    pub walk_distance: f64,
    pub transfers: u32,
    pub legs: Vec<TransitLeg>,
    /// All leg geometries joined, without repeated boundary points.
    pub geometry: Vec<Coordinate>,
}

impl TransitItinerary {
    /// Project the itinerary onto the generic [`Route`] shape.
    pub fn to_route(&self, start: LatLng, end: LatLng) -> Route {
        let steps = self
            .legs
            .iter()
            .map(|leg| RouteStep {
                instruction: leg.instruction.clone(),
                distance: leg.distance,
                duration: leg.duration,
                maneuver: Some(leg.mode.to_lowercase()),
                location: leg.geometry.first().copied(),
            })
            .collect();

        Route {
            id: Route::generate_id(),
            mode: TravelMode::Transit,
            start,
            end,
            geometry: self.geometry.clone(),
            distance: self.legs.iter().map(|leg| leg.distance).sum(),
            duration: self.duration,
            legs: vec![RouteLeg {
                summary: self.summary(),
                distance: self.legs.iter().map(|leg| leg.distance).sum(),
                duration: self.duration,
                steps,
            }],
        }
    }

    /// Route names of the transit legs joined with `→`, or `Walk`.
    pub fn summary(&self) -> String {
        let names: Vec<&str> = self
            .legs
            .iter()
            .filter(|leg| leg.transit_leg)
            .map(|leg| {
                leg.route_short_name
                    .as_deref()
                    .or(leg.route_long_name.as_deref())
                    .unwrap_or(leg.mode.as_str())
            })
            .collect();

        if names.is_empty() {
            "Walk".to_string()
        } else {
            names.join(" → ")
        }
    }
}

/// Result of a transit planning request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitPlan {
    pub itineraries: Vec<TransitItinerary>,
}

/// A geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub place_id: String,
    pub display_name: String,
    pub position: LatLng,
    pub category: Option<String>,
    pub address: std::collections::BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_mode_parse_and_display() {
        assert_eq!("walking".parse::<TravelMode>(), Ok(TravelMode::Walking));
        assert_eq!("Bike".parse::<TravelMode>(), Ok(TravelMode::Cycling));
        assert!("teleport".parse::<TravelMode>().is_err());
        assert_eq!(TravelMode::DrivingTraffic.to_string(), "driving-traffic");
    }

    #[test]
    fn test_generate_id_prefix() {
        let a = Route::generate_id();
        let b = Route::generate_id();
        assert!(a.starts_with("route-"));
        assert_ne!(a, b);
    }

    fn leg(mode: &str, transit: bool, name: Option<&str>, distance: f64) -> TransitLeg {
        let place = LegPlace {
            name: "x".into(),
            position: LatLng::new(0.0, 0.0),
        };
        TransitLeg {
            mode: mode.into(),
            transit_leg: transit,
            from: place.clone(),
            to: place,
            start_time: 0,
            end_time: 0,
            distance,
            duration: 60.0,
            route_short_name: name.map(String::from),
            route_long_name: None,
            headsign: None,
            agency_name: None,
            geometry: vec![[0.0, 0.0]],
            instruction: format!("{} leg", mode),
        }
    }

    #[test]
    fn test_itinerary_to_route() {
        let itinerary = TransitItinerary {
            start_time: 0,
            end_time: 1_800_000,
            duration: 1800.0,
            walk_distance: 300.0,
            transfers: 1,
            legs: vec![
                leg("WALK", false, None, 200.0),
                leg("BUS", true, Some("49"), 3000.0),
                leg("BUS", true, Some("8"), 2000.0),
                leg("WALK", false, None, 100.0),
            ],
            geometry: vec![[0.0, 0.0], [1.0, 1.0]],
        };

        assert_eq!(itinerary.summary(), "49 → 8");

        let route = itinerary.to_route(LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0));
        assert_eq!(route.mode, TravelMode::Transit);
        assert_eq!(route.distance, 5300.0);
        assert_eq!(route.legs[0].steps.len(), 4);
        assert_eq!(route.legs[0].steps[1].maneuver.as_deref(), Some("bus"));
    }
}
