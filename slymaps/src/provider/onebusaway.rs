//! OneBusAway realtime transit provider.
//!
//! Wraps the OneBusAway REST API (`/api/where/*.json`). Every response uses
//! the same envelope:
//!
//! ```text
//! { "code": 200, "text": "OK", "data": { "entry" | "list", "references": {...} } }
//! ```
//!
//! `references` carries the agencies, routes, stops, trips and situations the
//! payload points at by id. A body `code` other than 200 is an error even when
//! the HTTP status is 200.
//!
//! All calls share one [`RateLimiter`] and fail fast when it is exhausted.
//! The API key is checked before any I/O; an empty or placeholder key is a
//! configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::clock::EpochMillis;
use crate::geo::{decode_polyline, extend_path, LatLng};
use crate::model::{
    ArrivalDeparture, NearbyTransit, ObaRoute, Place, PoiPage, PoiQuery, RouteBranch,
    RouteDetails, RouteSchedule, RouteSegment, ScheduleEntry, Situation, StopSchedule,
    TransitStop, VehiclePosition,
};
use crate::rate_limit::{rate_limited_request, RateLimiter};

use super::types::{cancellable, check_response, decode_json, is_placeholder_key};
use super::{AsyncHttpClient, PoiSource, ProviderError, ProviderResult, TransitApi};

/// Puget Sound OneBusAway deployment.
pub const OBA_BASE_URL: &str = "https://api.pugetsound.onebusaway.org/api/where";

const PROVIDER: &str = "OneBusAway";

/// Stops returned for a nearby-POI lookup.
const MAX_STOP_POIS: usize = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<D> {
    code: i64,
    #[serde(default)]
    text: Option<String>,
    data: Option<D>,
}

#[derive(Debug, Deserialize)]
struct EntryData<E> {
    entry: E,
    #[serde(default)]
    references: Option<References>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListData<E> {
    #[serde(default = "Vec::new")]
    list: Vec<E>,
    #[serde(default)]
    references: Option<References>,
    #[serde(default)]
    limit_exceeded: bool,
}

/// The `references` block shared by every OneBusAway response.
#[derive(Debug, Default, Deserialize)]
pub struct References {
    #[serde(default)]
    agencies: Vec<WireAgency>,
    #[serde(default)]
    routes: Vec<WireRoute>,
    #[serde(default)]
    stops: Vec<WireStop>,
    #[serde(default)]
    trips: Vec<WireTrip>,
    #[serde(default)]
    situations: Vec<WireSituation>,
}

impl References {
    fn agency_name(&self, agency_id: &str) -> Option<String> {
        self.agencies
            .iter()
            .find(|a| a.id == agency_id)
            .map(|a| a.name.clone())
    }

    fn route(&self, route_id: &str) -> Option<ObaRoute> {
        self.routes
            .iter()
            .find(|r| r.id == route_id)
            .map(|r| r.to_route(self))
    }

    fn stops_by_id(&self) -> HashMap<&str, &WireStop> {
        self.stops.iter().map(|s| (s.id.as_str(), s)).collect()
    }

    fn trip(&self, trip_id: &str) -> Option<&WireTrip> {
        self.trips.iter().find(|t| t.id == trip_id)
    }
}

#[derive(Debug, Deserialize)]
struct WireAgency {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    id: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    agency_id: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    text_color: Option<String>,
    #[serde(default, rename = "type")]
    route_type: Option<i32>,
    #[serde(default)]
    url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

impl WireRoute {
    fn to_route(&self, references: &References) -> ObaRoute {
        ObaRoute {
            id: self.id.clone(),
            short_name: non_empty(&self.short_name),
            long_name: non_empty(&self.long_name),
            description: non_empty(&self.description),
            agency_id: self.agency_id.clone(),
            agency_name: self
                .agency_id
                .as_deref()
                .and_then(|id| references.agency_name(id)),
            color: non_empty(&self.color),
            text_color: non_empty(&self.text_color),
            route_type: self.route_type,
            url: non_empty(&self.url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStop {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    code: Option<String>,
    lat: f64,
    lon: f64,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    route_ids: Vec<String>,
}

impl WireStop {
    fn to_stop(&self) -> TransitStop {
        TransitStop {
            id: self.id.clone(),
            name: self.name.clone(),
            code: non_empty(&self.code),
            position: LatLng::new(self.lat, self.lon),
            direction: non_empty(&self.direction),
            route_ids: self.route_ids.clone(),
        }
    }

    fn to_place(&self) -> Place {
        let mut place = Place::new(
            format!("oba-{}", self.id),
            self.name.clone(),
            "transit_stop",
            LatLng::new(self.lat, self.lon),
        );
        place.is_oba_stop = true;
        if let Some(code) = non_empty(&self.code) {
            place.properties.insert("stop_code".into(), code);
        }
        if let Some(direction) = non_empty(&self.direction) {
            place.properties.insert("direction".into(), direction);
        }
        if !self.route_ids.is_empty() {
            place
                .properties
                .insert("route_ids".into(), self.route_ids.join(","));
        }
        place
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrip {
    id: String,
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    trip_headsign: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireText {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireWindow {
    #[serde(default)]
    from: EpochMillis,
    #[serde(default)]
    to: EpochMillis,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAffects {
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    stop_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSituation {
    id: String,
    #[serde(default)]
    summary: Option<WireText>,
    #[serde(default)]
    description: Option<WireText>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    url: Option<WireText>,
    #[serde(default)]
    active_windows: Vec<WireWindow>,
    #[serde(default)]
    all_affects: Vec<WireAffects>,
}

fn text_value(text: &Option<WireText>) -> Option<String> {
    text.as_ref().and_then(|t| non_empty(&t.value))
}

impl WireSituation {
    fn to_situation(&self) -> Situation {
        let mut affected_route_ids: Vec<String> = self
            .all_affects
            .iter()
            .filter_map(|a| non_empty(&a.route_id))
            .collect();
        affected_route_ids.dedup();
        let mut affected_stop_ids: Vec<String> = self
            .all_affects
            .iter()
            .filter_map(|a| non_empty(&a.stop_id))
            .collect();
        affected_stop_ids.dedup();

        Situation {
            id: self.id.clone(),
            summary: text_value(&self.summary),
            description: text_value(&self.description),
            severity: non_empty(&self.severity),
            reason: non_empty(&self.reason),
            url: text_value(&self.url),
            active_windows: self.active_windows.iter().map(|w| (w.from, w.to)).collect(),
            affected_route_ids,
            affected_stop_ids,
        }
    }
}

/// Situations (service alerts) embedded in a response's references.
///
/// Responses without references yield an empty list.
pub fn extract_situations(references: Option<&References>) -> Vec<Situation> {
    references
        .map(|r| r.situations.iter().map(WireSituation::to_situation).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct WirePolyline {
    #[serde(default)]
    points: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopsForRoute {
    #[serde(default)]
    polylines: Vec<WirePolyline>,
    #[serde(default)]
    stop_ids: Vec<String>,
    #[serde(default)]
    stop_groupings: Vec<WireStopGrouping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopGrouping {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    stop_groups: Vec<WireStopGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopGroup {
    id: String,
    #[serde(default)]
    name: Option<WireGroupName>,
    #[serde(default)]
    stop_ids: Vec<String>,
    #[serde(default)]
    polylines: Vec<WirePolyline>,
}

#[derive(Debug, Deserialize)]
struct WireGroupName {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTripDetails {
    #[serde(default)]
    trip_id: Option<String>,
    #[serde(default)]
    status: Option<WireTripStatus>,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTripStatus {
    #[serde(default)]
    active_trip_id: Option<String>,
    #[serde(default)]
    vehicle_id: Option<String>,
    #[serde(default)]
    position: Option<WirePosition>,
    #[serde(default)]
    orientation: Option<f64>,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    predicted: bool,
    #[serde(default)]
    schedule_deviation: Option<i64>,
    #[serde(default)]
    last_update_time: Option<EpochMillis>,
    #[serde(default)]
    next_stop: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopSchedule {
    #[serde(default)]
    date: EpochMillis,
    #[serde(default)]
    stop_id: String,
    #[serde(default)]
    stop_route_schedules: Vec<WireStopRouteSchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopRouteSchedule {
    #[serde(default)]
    route_id: Option<String>,
    #[serde(default)]
    stop_route_direction_schedules: Vec<WireDirectionSchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDirectionSchedule {
    #[serde(default)]
    trip_headsign: Option<String>,
    #[serde(default)]
    schedule_stop_times: Vec<WireStopTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopTime {
    #[serde(default)]
    trip_id: String,
    #[serde(default)]
    stop_id: Option<String>,
    #[serde(default)]
    arrival_time: EpochMillis,
    #[serde(default)]
    departure_time: EpochMillis,
    #[serde(default)]
    stop_headsign: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRouteSchedule {
    #[serde(default)]
    route_id: String,
    #[serde(default)]
    schedule_date: EpochMillis,
    #[serde(default)]
    stop_trip_groupings: Vec<WireStopTripGrouping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStopTripGrouping {
    #[serde(default)]
    trip_headsigns: Vec<String>,
    #[serde(default)]
    trips_with_stop_times: Vec<WireTripStopTimes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTripStopTimes {
    #[serde(default)]
    trip_id: String,
    #[serde(default)]
    stop_times: Vec<WireStopTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArrivals {
    #[serde(default)]
    arrivals_and_departures: Vec<WireArrival>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArrival {
    route_id: String,
    #[serde(default)]
    route_short_name: Option<String>,
    trip_id: String,
    #[serde(default)]
    trip_headsign: Option<String>,
    stop_id: String,
    #[serde(default)]
    vehicle_id: Option<String>,
    #[serde(default)]
    scheduled_arrival_time: EpochMillis,
    #[serde(default)]
    predicted_arrival_time: EpochMillis,
    #[serde(default)]
    scheduled_departure_time: EpochMillis,
    #[serde(default)]
    predicted_departure_time: EpochMillis,
    #[serde(default)]
    number_of_stops_away: Option<i64>,
}

/// OneBusAway reports "no prediction" as 0.
fn prediction(ms: EpochMillis) -> Option<EpochMillis> {
    (ms > 0).then_some(ms)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn decode_segments(polylines: &[WirePolyline]) -> Vec<RouteSegment> {
    polylines
        .iter()
        .filter_map(|p| decode_polyline(&p.points))
        .map(|coordinates| RouteSegment { coordinates })
        .collect()
}

fn lookup_stops(ids: &[String], stops: &HashMap<&str, &WireStop>) -> Vec<TransitStop> {
    ids.iter()
        .filter_map(|id| stops.get(id.as_str()))
        .map(|s| s.to_stop())
        .collect()
}

/// Combine stops-for-route data with route metadata.
///
/// With direction groupings, each branch becomes one segment (its polylines
/// joined end to end) paired with that branch's ordered stops. Without them,
/// each route polyline is a segment and every segment shares the full stop
/// list. Either way `segments` and `stops_by_segment` have the same length.
fn build_route_details(
    route: ObaRoute,
    entry: WireStopsForRoute,
    references: &References,
) -> RouteDetails {
    let stops = references.stops_by_id();

    let branches: Vec<RouteBranch> = entry
        .stop_groupings
        .iter()
        .filter(|g| g.kind.as_deref().map_or(true, |k| k == "direction"))
        .flat_map(|g| g.stop_groups.iter())
        .map(|group| RouteBranch {
            name: group
                .name
                .as_ref()
                .and_then(|n| non_empty(&n.name))
                .unwrap_or_else(|| format!("Direction {}", group.id)),
            direction_id: Some(group.id.clone()),
            segments: decode_segments(&group.polylines),
            stops: lookup_stops(&group.stop_ids, &stops),
        })
        .collect();

    let (segments, stops_by_segment) = if branches.iter().any(|b| !b.segments.is_empty()) {
        let with_geometry: Vec<&RouteBranch> =
            branches.iter().filter(|b| !b.segments.is_empty()).collect();
        let segments = with_geometry
            .iter()
            .map(|branch| {
                let mut coordinates = Vec::new();
                for segment in &branch.segments {
                    extend_path(&mut coordinates, &segment.coordinates);
                }
                RouteSegment { coordinates }
            })
            .collect();
        let stops_by_segment = with_geometry.iter().map(|b| b.stops.clone()).collect();
        (segments, stops_by_segment)
    } else {
        let segments = decode_segments(&entry.polylines);
        let all_stops = lookup_stops(&entry.stop_ids, &stops);
        let stops_by_segment = segments.iter().map(|_| all_stops.clone()).collect();
        (segments, stops_by_segment)
    };

    RouteDetails {
        route,
        branches,
        segments,
        stops_by_segment,
    }
}

fn build_vehicles(
    route_id: &str,
    trips: Vec<WireTripDetails>,
    references: &References,
) -> Vec<VehiclePosition> {
    trips
        .into_iter()
        .filter_map(|details| {
            let status = details.status?;
            let position = status.position.as_ref()?;
            let position = LatLng::new(position.lat, position.lon);
            if !position.is_valid() || (position.lat == 0.0 && position.lng == 0.0) {
                return None;
            }

            let trip_id = status.active_trip_id.clone().or(details.trip_id);
            let trip = trip_id.as_deref().and_then(|id| references.trip(id));
            let vehicle_id = non_empty(&status.vehicle_id)
                .or_else(|| trip_id.clone())
                .unwrap_or_default();

            Some(VehiclePosition {
                vehicle_id,
                route_id: trip
                    .and_then(|t| t.route_id.clone())
                    .unwrap_or_else(|| route_id.to_string()),
                headsign: trip.and_then(|t| non_empty(&t.trip_headsign)),
                trip_id,
                position,
                orientation: status.orientation,
                next_stop_id: non_empty(&status.next_stop),
                phase: non_empty(&status.phase),
                schedule_deviation_secs: status.schedule_deviation,
                predicted: status.predicted,
                last_update: status.last_update_time.unwrap_or_default(),
            })
        })
        .collect()
}

fn build_stop_schedule(entry: WireStopSchedule, references: Option<&References>) -> StopSchedule {
    let stop_id = entry.stop_id.as_str();
    let mut entries: Vec<ScheduleEntry> = entry
        .stop_route_schedules
        .iter()
        .flat_map(|route| {
            route.stop_route_direction_schedules.iter().flat_map(move |direction| {
                direction.schedule_stop_times.iter().map(move |time| ScheduleEntry {
                    trip_id: time.trip_id.clone(),
                    stop_id: time.stop_id.clone().unwrap_or_else(|| stop_id.to_string()),
                    route_id: route.route_id.clone(),
                    headsign: non_empty(&time.stop_headsign)
                        .or_else(|| non_empty(&direction.trip_headsign)),
                    arrival_time: time.arrival_time,
                    departure_time: time.departure_time,
                })
            })
        })
        .collect();
    entries.sort_by_key(|e| e.arrival_time);

    StopSchedule {
        stop_id: entry.stop_id.clone(),
        date: entry.date,
        entries,
        situations: extract_situations(references),
    }
}

fn build_route_schedule(
    entry: WireRouteSchedule,
    references: Option<&References>,
) -> RouteSchedule {
    let route_id = entry.route_id.as_str();
    let service_date = entry.schedule_date;
    let mut entries: Vec<ScheduleEntry> = entry
        .stop_trip_groupings
        .iter()
        .flat_map(|grouping| {
            let headsign = grouping.trip_headsigns.first().cloned();
            grouping.trips_with_stop_times.iter().flat_map(move |trip| {
                let headsign = headsign.clone();
                trip.stop_times.iter().map(move |time| ScheduleEntry {
                    trip_id: trip.trip_id.clone(),
                    stop_id: time.stop_id.clone().unwrap_or_default(),
                    route_id: Some(route_id.to_string()),
                    headsign: headsign.clone(),
                    // Route schedules report seconds since the service date.
                    arrival_time: service_date + time.arrival_time * 1000,
                    departure_time: service_date + time.departure_time * 1000,
                })
            })
        })
        .collect();
    entries.sort_by_key(|e| e.arrival_time);

    RouteSchedule {
        route_id: entry.route_id.clone(),
        date: entry.schedule_date,
        entries,
        situations: extract_situations(references),
    }
}

fn date_param(date: Option<NaiveDate>) -> String {
    date.map(|d| format!("&date={}", d.format("%Y-%m-%d")))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// OneBusAway REST provider.
pub struct OneBusAwayProvider<C: AsyncHttpClient> {
    http_client: C,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl<C: AsyncHttpClient> OneBusAwayProvider<C> {
    pub fn new(http_client: C, api_key: impl Into<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: OBA_BASE_URL.to_string(),
            rate_limiter,
        }
    }

    /// Point at a different OneBusAway deployment.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn ensure_api_key(&self) -> ProviderResult<()> {
        if is_placeholder_key(&self.api_key) {
            return Err(ProviderError::config(
                PROVIDER,
                "API key is missing; set SLYMAPS_OBA_API_KEY or [onebusaway] api_key",
            ));
        }
        Ok(())
    }

    /// `{base}/{path}.json?key=...{query}`. `path` must already be encoded.
    fn build_url(&self, path: &str, query: &str) -> String {
        format!(
            "{}/{}.json?key={}{}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key),
            query
        )
    }

    /// Rate-limited, cancellable GET that unwraps the response envelope.
    async fn get_data<D: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<D> {
        self.ensure_api_key()?;
        let url = self.build_url(path, query);

        tracing::debug!(endpoint = path, "OneBusAway request");

        let response = cancellable(
            cancel,
            rate_limited_request(&self.rate_limiter, || self.http_client.get(&url, &[])),
        )
        .await?;
        let body = check_response(PROVIDER, response)?;
        let envelope: Envelope<D> = decode_json(PROVIDER, &body)?;

        match envelope.code {
            200 => envelope
                .data
                .ok_or_else(|| ProviderError::decode(PROVIDER, "response has no data")),
            429 => Err(ProviderError::RateLimited {
                message: "Too many requests to OneBusAway. Please wait a moment and try again."
                    .to_string(),
                retry_after: None,
            }),
            404 => Err(ProviderError::NotFound(format!(
                "OneBusAway has no result for {}",
                path
            ))),
            code => Err(ProviderError::Http {
                provider: PROVIDER,
                status: u16::try_from(code).unwrap_or(500),
                message: envelope
                    .text
                    .unwrap_or_else(|| format!("Unexpected response code {}", code)),
            }),
        }
    }

    fn entity_path(endpoint: &str, id: &str) -> String {
        format!("{}/{}", endpoint, urlencoding::encode(id))
    }

    async fn nearby_stops(
        &self,
        center: LatLng,
        radius_m: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<(Vec<WireStop>, Option<References>)> {
        let query = format!("&lat={}&lon={}&radius={}", center.lat, center.lng, radius_m);
        let data: ListData<WireStop> = self
            .get_data("stops-for-location", &query, cancel)
            .await?;
        if data.limit_exceeded {
            tracing::debug!(radius_m, "OneBusAway stop list truncated");
        }
        Ok((data.list, data.references))
    }

    async fn nearby_transit(
        &self,
        center: LatLng,
        radius_m: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<NearbyTransit> {
        let (stops, _) = self.nearby_stops(center, radius_m, cancel).await?;

        let query = format!("&lat={}&lon={}&radius={}", center.lat, center.lng, radius_m);
        let routes: ListData<WireRoute> = self
            .get_data("routes-for-location", &query, cancel)
            .await?;
        let references = routes.references.unwrap_or_default();

        Ok(NearbyTransit {
            stops: stops.iter().map(WireStop::to_stop).collect(),
            routes: routes.list.iter().map(|r| r.to_route(&references)).collect(),
        })
    }

    async fn route(&self, route_id: &str, cancel: &CancellationToken) -> ProviderResult<ObaRoute> {
        let data: EntryData<WireRoute> = self
            .get_data(&Self::entity_path("route", route_id), "", cancel)
            .await?;
        let references = data.references.unwrap_or_default();
        Ok(data.entry.to_route(&references))
    }

    async fn route_details(
        &self,
        route_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<RouteDetails> {
        let data: EntryData<WireStopsForRoute> = self
            .get_data(
                &Self::entity_path("stops-for-route", route_id),
                "&includePolylines=true&version=2",
                cancel,
            )
            .await?;
        let references = data.references.unwrap_or_default();

        let route = match references.route(route_id) {
            Some(route) => route,
            None => self.route(route_id, cancel).await?,
        };

        let details = build_route_details(route, data.entry, &references);
        tracing::debug!(
            route_id,
            branches = details.branches.len(),
            segments = details.segments.len(),
            "Route details loaded"
        );
        Ok(details)
    }

    async fn vehicles(
        &self,
        route_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<VehiclePosition>> {
        let data: ListData<WireTripDetails> = self
            .get_data(
                &Self::entity_path("trips-for-route", route_id),
                "&includeStatus=true&includeSchedule=false",
                cancel,
            )
            .await?;
        let references = data.references.unwrap_or_default();
        Ok(build_vehicles(route_id, data.list, &references))
    }

    async fn stop_schedule(
        &self,
        stop_id: &str,
        date: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> ProviderResult<StopSchedule> {
        let data: EntryData<WireStopSchedule> = self
            .get_data(
                &Self::entity_path("schedule-for-stop", stop_id),
                &date_param(date),
                cancel,
            )
            .await?;
        Ok(build_stop_schedule(data.entry, data.references.as_ref()))
    }

    async fn route_schedule(
        &self,
        route_id: &str,
        date: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> ProviderResult<RouteSchedule> {
        let data: EntryData<WireRouteSchedule> = self
            .get_data(
                &Self::entity_path("schedule-for-route", route_id),
                &date_param(date),
                cancel,
            )
            .await?;
        Ok(build_route_schedule(data.entry, data.references.as_ref()))
    }

    async fn arrivals(
        &self,
        stop_id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<ArrivalDeparture>> {
        let data: EntryData<WireArrivals> = self
            .get_data(
                &Self::entity_path("arrivals-and-departures-for-stop", stop_id),
                "",
                cancel,
            )
            .await?;
        let mut arrivals: Vec<ArrivalDeparture> = data
            .entry
            .arrivals_and_departures
            .into_iter()
            .map(|a| ArrivalDeparture {
                route_id: a.route_id,
                route_short_name: non_empty(&a.route_short_name),
                trip_id: a.trip_id,
                trip_headsign: non_empty(&a.trip_headsign),
                stop_id: a.stop_id,
                vehicle_id: non_empty(&a.vehicle_id),
                scheduled_arrival: a.scheduled_arrival_time,
                predicted_arrival: prediction(a.predicted_arrival_time),
                scheduled_departure: a.scheduled_departure_time,
                predicted_departure: prediction(a.predicted_departure_time),
                number_of_stops_away: a.number_of_stops_away,
            })
            .collect();
        arrivals.sort_by_key(ArrivalDeparture::best_arrival);
        Ok(arrivals)
    }

    async fn stop_pois(
        &self,
        query: &PoiQuery,
        cancel: &CancellationToken,
    ) -> ProviderResult<PoiPage> {
        let (stops, _) = self.nearby_stops(query.center, query.radius_m, cancel).await?;
        let start = MAX_STOP_POIS * query.page as usize;
        let has_more = stops.len() > start + MAX_STOP_POIS;
        let pois = stops
            .iter()
            .skip(start)
            .take(MAX_STOP_POIS)
            .map(WireStop::to_place)
            .collect();
        Ok(PoiPage {
            pois,
            has_more,
            next_page: has_more.then_some(query.page + 1),
        })
    }
}

impl<C: AsyncHttpClient> TransitApi for OneBusAwayProvider<C> {
    fn fetch_nearby_transit<'a>(
        &'a self,
        center: LatLng,
        radius_m: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<NearbyTransit>> {
        Box::pin(self.nearby_transit(center, radius_m, cancel))
    }

    fn fetch_route<'a>(
        &'a self,
        route_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<ObaRoute>> {
        Box::pin(self.route(route_id, cancel))
    }

    fn fetch_route_details<'a>(
        &'a self,
        route_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<RouteDetails>> {
        Box::pin(self.route_details(route_id, cancel))
    }

    fn fetch_vehicles_for_route<'a>(
        &'a self,
        route_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<VehiclePosition>>> {
        Box::pin(self.vehicles(route_id, cancel))
    }

    fn fetch_route_schedule<'a>(
        &'a self,
        route_id: &'a str,
        date: Option<NaiveDate>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<RouteSchedule>> {
        Box::pin(self.route_schedule(route_id, date, cancel))
    }

    fn fetch_stop_schedule<'a>(
        &'a self,
        stop_id: &'a str,
        date: Option<NaiveDate>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<StopSchedule>> {
        Box::pin(self.stop_schedule(stop_id, date, cancel))
    }

    fn fetch_arrivals<'a>(
        &'a self,
        stop_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<ArrivalDeparture>>> {
        Box::pin(self.arrivals(stop_id, cancel))
    }
}

impl<C: AsyncHttpClient> PoiSource for OneBusAwayProvider<C> {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn fetch_pois<'a>(
        &'a self,
        query: &'a PoiQuery,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<PoiPage>> {
        Box::pin(self.stop_pois(query, cancel))
    }
}
