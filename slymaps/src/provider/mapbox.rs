//! Mapbox Directions provider.
//!
//! # URL Pattern
//!
//! `https://api.mapbox.com/directions/v5/mapbox/{profile}/{lng},{lat};{lng},{lat}`
//!
//! Geometry is requested as GeoJSON so coordinates arrive already in
//! `[lng, lat]` order. Only the first (best) route is normalized.

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::geo::{Coordinate, LatLng};
use crate::model::{Route, RouteLeg, RouteStep, TravelMode};

use super::types::{cancellable, check_response, decode_json, is_placeholder_key};
use super::{AsyncHttpClient, DirectionsApi, ProviderError, ProviderResult};

/// Mapbox Directions API base URL.
pub const MAPBOX_BASE_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";

const PROVIDER: &str = "Mapbox";

/// Map a travel mode to a Mapbox routing profile.
///
/// Mapbox has no transit profile; transit requests fall back to
/// `driving-traffic` and log a warning.
pub fn mapbox_profile(mode: TravelMode) -> (&'static str, TravelMode) {
    match mode {
        TravelMode::Driving => ("driving", TravelMode::Driving),
        TravelMode::DrivingTraffic => ("driving-traffic", TravelMode::DrivingTraffic),
        TravelMode::Walking => ("walking", TravelMode::Walking),
        TravelMode::Cycling => ("cycling", TravelMode::Cycling),
        unsupported => {
            tracing::warn!(
                mode = %unsupported,
                "Mapbox does not support this travel mode, using driving-traffic"
            );
            ("driving-traffic", TravelMode::DrivingTraffic)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<WireRoute>,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    #[serde(default)]
    coordinates: Vec<Coordinate>,
}

#[derive(Debug, Deserialize)]
struct WireRoute {
    distance: f64,
    duration: f64,
    geometry: WireGeometry,
    #[serde(default)]
    legs: Vec<WireLeg>,
}

#[derive(Debug, Deserialize)]
struct WireLeg {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    steps: Vec<WireStep>,
}

#[derive(Debug, Deserialize)]
struct WireStep {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: WireManeuver,
}

#[derive(Debug, Deserialize)]
struct WireManeuver {
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    location: Option<Coordinate>,
}

impl WireStep {
    fn into_step(self) -> RouteStep {
        let instruction = self
            .maneuver
            .instruction
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| match self.name.as_str() {
                "" => "Continue".to_string(),
                name => format!("Continue on {}", name),
            });
        let maneuver = match (self.maneuver.kind, self.maneuver.modifier) {
            (Some(kind), Some(modifier)) => Some(format!("{} {}", kind, modifier)),
            (kind, _) => kind,
        };

        RouteStep {
            instruction,
            distance: self.distance,
            duration: self.duration,
            maneuver,
            location: self.maneuver.location,
        }
    }
}

/// Normalize the first route of a Directions response.
fn parse_directions(
    body: &[u8],
    start: LatLng,
    end: LatLng,
    mode: TravelMode,
) -> ProviderResult<Route> {
    let response: DirectionsResponse = decode_json(PROVIDER, body)?;

    if response.code != "Ok" {
        let message = response.message.unwrap_or_else(|| response.code.clone());
        return Err(match response.code.as_str() {
            "NoRoute" | "NoSegment" => ProviderError::NotFound(format!("No route found: {}", message)),
            "InvalidInput" => ProviderError::InvalidRequest(message),
            _ => ProviderError::Http {
                provider: PROVIDER,
                status: 200,
                message,
            },
        });
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::NotFound("No route found".to_string()))?;

    let legs = route
        .legs
        .into_iter()
        .map(|leg| RouteLeg {
            summary: leg.summary,
            distance: leg.distance,
            duration: leg.duration,
            steps: leg.steps.into_iter().map(WireStep::into_step).collect(),
        })
        .collect();

    Ok(Route {
        id: Route::generate_id(),
        mode,
        start,
        end,
        geometry: route.geometry.coordinates,
        distance: route.distance,
        duration: route.duration,
        legs,
    })
}

/// Mapbox Directions provider.
pub struct MapboxProvider<C: AsyncHttpClient> {
    http_client: C,
    access_token: String,
    base_url: String,
}

impl<C: AsyncHttpClient> MapboxProvider<C> {
    pub fn new(http_client: C, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            base_url: MAPBOX_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_url(&self, profile: &str, start: LatLng, end: LatLng) -> String {
        format!(
            "{}/{}/{},{};{},{}?geometries=geojson&overview=full&steps=true&access_token={}",
            self.base_url,
            profile,
            start.lng,
            start.lat,
            end.lng,
            end.lat,
            urlencoding::encode(&self.access_token)
        )
    }

    async fn directions(
        &self,
        start: LatLng,
        end: LatLng,
        mode: TravelMode,
        cancel: &CancellationToken,
    ) -> ProviderResult<Route> {
        if is_placeholder_key(&self.access_token) {
            return Err(ProviderError::config(
                PROVIDER,
                "access token is missing; set SLYMAPS_MAPBOX_TOKEN or [mapbox] access_token",
            ));
        }
        for point in [start, end] {
            if !point.is_valid() {
                return Err(ProviderError::InvalidRequest(format!(
                    "coordinate out of range: {}",
                    point
                )));
            }
        }

        let (profile, effective_mode) = mapbox_profile(mode);
        let url = self.build_url(profile, start, end);
        tracing::debug!(profile, %start, %end, "Mapbox directions request");

        let response = cancellable(cancel, self.http_client.get(&url, &[])).await?;
        let body = check_response(PROVIDER, response)?;
        let route = parse_directions(&body, start, end, effective_mode)?;

        tracing::debug!(
            route_id = %route.id,
            distance_m = route.distance,
            duration_s = route.duration,
            "Mapbox route"
        );
        Ok(route)
    }
}

impl<C: AsyncHttpClient> DirectionsApi for MapboxProvider<C> {
    fn get_directions<'a>(
        &'a self,
        start: LatLng,
        end: LatLng,
        mode: TravelMode,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Route>> {
        Box::pin(self.directions(start, end, mode, cancel))
    }
}
