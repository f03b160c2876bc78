//! Transit entities normalized from OneBusAway responses.

use serde::{Deserialize, Serialize};

use crate::clock::EpochMillis;
use crate::geo::{Coordinate, LatLng};

/// Static route metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObaRoute {
    pub id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub description: Option<String>,
    pub agency_id: Option<String>,
    pub agency_name: Option<String>,
    /// Hex color without the leading `#`.
    pub color: Option<String>,
    pub text_color: Option<String>,
    /// GTFS route type (3 = bus).
    pub route_type: Option<i32>,
    pub url: Option<String>,
}

impl ObaRoute {
    /// Short name, long name or id, in that order of preference.
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.long_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.id)
    }
}

/// A stop served by one or more routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitStop {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub position: LatLng,
    /// Compass direction of travel at the stop (`N`, `SW`, ...).
    pub direction: Option<String>,
    pub route_ids: Vec<String>,
}

/// One contiguous polyline of a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub coordinates: Vec<Coordinate>,
}

/// A directional variant of a route (inbound/outbound or a named headsign).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteBranch {
    pub name: String,
    pub direction_id: Option<String>,
    pub segments: Vec<RouteSegment>,
    pub stops: Vec<TransitStop>,
}

/// Shape and stop data for a route.
///
/// `segments[i]` and `stops_by_segment[i]` both describe `branches[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDetails {
    pub route: ObaRoute,
    pub branches: Vec<RouteBranch>,
    pub segments: Vec<RouteSegment>,
    pub stops_by_segment: Vec<Vec<TransitStop>>,
}

/// Realtime position of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: String,
    pub trip_id: Option<String>,
    pub route_id: String,
    pub position: LatLng,
    /// Degrees counter-clockwise from east, as reported by OneBusAway.
    pub orientation: Option<f64>,
    pub headsign: Option<String>,
    pub next_stop_id: Option<String>,
    pub phase: Option<String>,
    /// Seconds behind (positive) or ahead (negative) of schedule.
    pub schedule_deviation_secs: Option<i64>,
    pub predicted: bool,
    pub last_update: EpochMillis,
}

/// A scheduled stop time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub trip_id: String,
    pub stop_id: String,
    pub route_id: Option<String>,
    pub headsign: Option<String>,
    pub arrival_time: EpochMillis,
    pub departure_time: EpochMillis,
}

/// A service alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub reason: Option<String>,
    pub url: Option<String>,
    pub active_windows: Vec<(EpochMillis, EpochMillis)>,
    pub affected_route_ids: Vec<String>,
    pub affected_stop_ids: Vec<String>,
}

/// Schedule for a single stop, with any situations the response referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopSchedule {
    pub stop_id: String,
    pub date: EpochMillis,
    pub entries: Vec<ScheduleEntry>,
    pub situations: Vec<Situation>,
}

/// Schedule for a whole route on one service date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSchedule {
    pub route_id: String,
    pub date: EpochMillis,
    pub entries: Vec<ScheduleEntry>,
    pub situations: Vec<Situation>,
}

/// An upcoming arrival/departure at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalDeparture {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub trip_id: String,
    pub trip_headsign: Option<String>,
    pub stop_id: String,
    pub vehicle_id: Option<String>,
    pub scheduled_arrival: EpochMillis,
    pub predicted_arrival: Option<EpochMillis>,
    pub scheduled_departure: EpochMillis,
    pub predicted_departure: Option<EpochMillis>,
    pub number_of_stops_away: Option<i64>,
}

impl ArrivalDeparture {
    /// Predicted arrival when realtime data exists, scheduled otherwise.
    pub fn best_arrival(&self) -> EpochMillis {
        self.predicted_arrival.unwrap_or(self.scheduled_arrival)
    }
}

/// Stops and routes around a point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NearbyTransit {
    pub stops: Vec<TransitStop>,
    pub routes: Vec<ObaRoute>,
}
