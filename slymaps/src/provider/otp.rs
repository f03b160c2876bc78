//! OpenTripPlanner GraphQL trip planner.
//!
//! Sends the `plan` query to `{base}/otp/routers/default/index/graphql`
//! with walk + transit modes and normalizes each itinerary:
//!
//! - every leg's encoded polyline is decoded to `[lng, lat]`; a leg whose
//!   geometry is missing or malformed becomes a straight from→to line
//! - every leg gets a one-line instruction
//! - leg geometries are concatenated into one itinerary geometry without
//!   repeating the shared point at leg boundaries

use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::clock::EpochMillis;
use crate::geo::{decode_polyline, extend_path, Coordinate, LatLng};
use crate::model::{LegPlace, TransitItinerary, TransitLeg, TransitPlan};

use super::types::{cancellable, check_response, decode_json};
use super::{AsyncHttpClient, ProviderError, ProviderResult, TripPlanner};

/// Path of the GraphQL endpoint below the OTP base URL.
pub const OTP_GRAPHQL_PATH: &str = "/otp/routers/default/index/graphql";

/// Server-side routing timeout passed to OTP, in milliseconds.
const OTP_TIMEOUT_MS: &str = "180000";

/// Default number of itineraries requested.
const DEFAULT_ITINERARIES: u32 = 3;

const PROVIDER: &str = "OpenTripPlanner";

const PLAN_QUERY: &str = r#"query Plan($from: InputCoordinates!, $to: InputCoordinates!, $date: String, $time: String, $arriveBy: Boolean, $numItineraries: Int) {
  plan(from: $from, to: $to, date: $date, time: $time, arriveBy: $arriveBy, numItineraries: $numItineraries, transportModes: [{mode: WALK}, {mode: TRANSIT}]) {
    itineraries {
      startTime
      endTime
      duration
      walkDistance
      legs {
        mode
        startTime
        endTime
        distance
        duration
        transitLeg
        headsign
        from { name lat lon }
        to { name lat lon }
        route { shortName longName agency { name } }
        legGeometry { points }
      }
    }
  }
}"#;

/// A transit planning request.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRequest {
    pub from: LatLng,
    pub to: LatLng,
    /// Local departure (or arrival, with `arrive_by`) time. `None` means now.
    pub time: Option<NaiveDateTime>,
    pub arrive_by: bool,
    pub num_itineraries: u32,
}

impl TripRequest {
    pub fn new(from: LatLng, to: LatLng) -> Self {
        Self {
            from,
            to,
            time: None,
            arrive_by: false,
            num_itineraries: DEFAULT_ITINERARIES,
        }
    }

    pub fn depart_at(mut self, time: NaiveDateTime) -> Self {
        self.time = Some(time);
        self.arrive_by = false;
        self
    }

    pub fn arrive_by(mut self, time: NaiveDateTime) -> Self {
        self.time = Some(time);
        self.arrive_by = true;
        self
    }

    pub fn with_itineraries(mut self, count: u32) -> Self {
        self.num_itineraries = count.max(1);
        self
    }

    fn to_graphql_body(&self) -> serde_json::Value {
        serde_json::json!({
            "query": PLAN_QUERY,
            "variables": {
                "from": { "lat": self.from.lat, "lon": self.from.lng },
                "to": { "lat": self.to.lat, "lon": self.to.lng },
                "date": self.time.map(|t| t.format("%Y-%m-%d").to_string()),
                "time": self.time.map(|t| t.format("%H:%M").to_string()),
                "arriveBy": self.arrive_by,
                "numItineraries": self.num_itineraries,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PlanData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PlanData {
    plan: Option<WirePlan>,
}

#[derive(Debug, Deserialize)]
struct WirePlan {
    #[serde(default)]
    itineraries: Vec<WireItinerary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItinerary {
    start_time: EpochMillis,
    end_time: EpochMillis,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    walk_distance: f64,
    #[serde(default)]
    legs: Vec<WireLeg>,
}

#[derive(Debug, Deserialize)]
struct WirePlace {
    #[serde(default)]
    name: Option<String>,
    lat: f64,
    lon: f64,
}

impl WirePlace {
    fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }

    fn to_leg_place(&self) -> LegPlace {
        LegPlace {
            name: self
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| self.position().to_string()),
            position: self.position(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRoute {
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    agency: Option<WireAgency>,
}

#[derive(Debug, Deserialize)]
struct WireAgency {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    #[serde(default)]
    points: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLeg {
    mode: String,
    start_time: EpochMillis,
    end_time: EpochMillis,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    transit_leg: bool,
    #[serde(default)]
    headsign: Option<String>,
    from: WirePlace,
    to: WirePlace,
    #[serde(default)]
    route: Option<WireRoute>,
    #[serde(default)]
    leg_geometry: Option<WireGeometry>,
}

/// Decode a leg polyline, or fall back to a straight line between the
/// leg's endpoints.
pub fn decode_leg_geometry(points: Option<&str>, from: LatLng, to: LatLng) -> Vec<Coordinate> {
    match points.and_then(decode_polyline) {
        Some(coords) => coords,
        None => {
            tracing::debug!(%from, %to, "Leg geometry unavailable, using straight line");
            vec![from.to_coordinate(), to.to_coordinate()]
        }
    }
}

fn leg_instruction(leg: &TransitLeg) -> String {
    let distance = if leg.distance >= 1000.0 {
        format!("{:.1} km", leg.distance / 1000.0)
    } else {
        format!("{:.0} m", leg.distance)
    };

    match leg.mode.as_str() {
        "WALK" => format!("Walk {} to {}", distance, leg.to.name),
        "BICYCLE" => format!("Bike {} to {}", distance, leg.to.name),
        "CAR" => format!("Drive {} to {}", distance, leg.to.name),
        mode => {
            let vehicle = mode.to_lowercase();
            let line = leg
                .route_short_name
                .as_deref()
                .or(leg.route_long_name.as_deref());
            let mut text = match line {
                Some(line) => format!("Take {} {}", vehicle, line),
                None => format!("Take {}", vehicle),
            };
            if let Some(agency) = &leg.agency_name {
                text.push_str(&format!(" ({})", agency));
            }
            if let Some(headsign) = &leg.headsign {
                text.push_str(&format!(" towards {}", headsign));
            }
            text.push_str(&format!(", get off at {}", leg.to.name));
            text
        }
    }
}

impl WireLeg {
    fn into_leg(self) -> TransitLeg {
        let from = self.from.to_leg_place();
        let to = self.to.to_leg_place();
        let geometry = decode_leg_geometry(
            self.leg_geometry.as_ref().and_then(|g| g.points.as_deref()),
            from.position,
            to.position,
        );
        let (route_short_name, route_long_name, agency_name) = match self.route {
            Some(route) => (
                route.short_name,
                route.long_name,
                route.agency.and_then(|a| a.name),
            ),
            None => (None, None, None),
        };

        let mut leg = TransitLeg {
            mode: self.mode,
            transit_leg: self.transit_leg,
            from,
            to,
            start_time: self.start_time,
            end_time: self.end_time,
            distance: self.distance,
            duration: self.duration,
            route_short_name,
            route_long_name,
            headsign: self.headsign.filter(|h| !h.trim().is_empty()),
            agency_name,
            geometry,
            instruction: String::new(),
        };
        leg.instruction = leg_instruction(&leg);
        leg
    }
}

impl WireItinerary {
    fn into_itinerary(self) -> TransitItinerary {
        let legs: Vec<TransitLeg> = self.legs.into_iter().map(WireLeg::into_leg).collect();

        let mut geometry = Vec::new();
        for leg in &legs {
            extend_path(&mut geometry, &leg.geometry);
        }
        let transit_legs = legs.iter().filter(|l| l.transit_leg).count() as u32;

        TransitItinerary {
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration,
            walk_distance: self.walk_distance,
            transfers: transit_legs.saturating_sub(1),
            legs,
            geometry,
        }
    }
}

fn parse_plan(body: &[u8]) -> ProviderResult<TransitPlan> {
    let response: GraphQlResponse = decode_json(PROVIDER, body)?;

    if let Some(error) = response.errors.first() {
        return Err(ProviderError::Http {
            provider: PROVIDER,
            status: 200,
            message: error.message.clone(),
        });
    }

    let plan = response
        .data
        .and_then(|d| d.plan)
        .ok_or_else(|| ProviderError::decode(PROVIDER, "response has no plan"))?;

    Ok(TransitPlan {
        itineraries: plan
            .itineraries
            .into_iter()
            .map(WireItinerary::into_itinerary)
            .collect(),
    })
}

/// OpenTripPlanner GraphQL provider.
pub struct OtpProvider<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
}

impl<C: AsyncHttpClient> OtpProvider<C> {
    /// `base_url` is the OTP server root, e.g. `http://localhost:8080`.
    pub fn new(http_client: C, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, OTP_GRAPHQL_PATH)
    }

    async fn plan(
        &self,
        request: &TripRequest,
        cancel: &CancellationToken,
    ) -> ProviderResult<TransitPlan> {
        if self.base_url.trim().is_empty() {
            return Err(ProviderError::config(
                PROVIDER,
                "server URL is missing; set SLYMAPS_OTP_URL or [otp] url",
            ));
        }
        if !request.from.is_valid() || !request.to.is_valid() {
            return Err(ProviderError::InvalidRequest(format!(
                "coordinate out of range: {} -> {}",
                request.from, request.to
            )));
        }

        let body = serde_json::to_vec(&request.to_graphql_body())
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        tracing::debug!(from = %request.from, to = %request.to, "OTP plan request");

        let url = self.endpoint();
        let response = cancellable(
            cancel,
            self.http_client.post(
                &url,
                body,
                &[
                    ("Content-Type", "application/json"),
                    ("OTPTimeout", OTP_TIMEOUT_MS),
                ],
            ),
        )
        .await?;
        let body = check_response(PROVIDER, response)?;
        let plan = parse_plan(&body)?;

        tracing::debug!(itineraries = plan.itineraries.len(), "OTP plan");
        Ok(plan)
    }
}

impl<C: AsyncHttpClient> TripPlanner for OtpProvider<C> {
    fn plan_transit<'a>(
        &'a self,
        request: &'a TripRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<TransitPlan>> {
        Box::pin(self.plan(request, cancel))
    }
}
