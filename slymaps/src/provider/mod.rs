//! External data provider adapters.
//!
//! Each adapter wraps one remote service and normalizes its responses into
//! the entity shapes in [`crate::model`]:
//!
//! | Adapter | Service | Traits |
//! |---------|---------|--------|
//! | [`OverpassProvider`] | Overpass / OpenStreetMap | [`PoiSource`] |
//! | [`OneBusAwayProvider`] | OneBusAway REST | [`TransitApi`], [`PoiSource`] |
//! | [`MapboxProvider`] | Mapbox Directions | [`DirectionsApi`] |
//! | [`OtpProvider`] | OpenTripPlanner GraphQL | [`TripPlanner`] |
//! | [`NominatimProvider`] | Nominatim | [`Geocoder`], [`PoiSource`] |
//!
//! Adapters are generic over [`AsyncHttpClient`] so tests can inject
//! [`MockHttpClient`]. The traits below are object safe; the query layer
//! holds `Arc<dyn Trait>` and never sees the concrete client type.
//!
//! Every operation takes a [`CancellationToken`]. A cancelled token resolves
//! the call to [`ProviderError::Cancelled`] without waiting for the network.
//!
//! ```ignore
//! use slymaps::provider::{OverpassProvider, PoiSource, ReqwestClient};
//!
//! let provider = OverpassProvider::new(ReqwestClient::new()?);
//! let page = provider.fetch_pois(&query, &CancellationToken::new()).await?;
//! ```

mod http;
mod mapbox;
mod nominatim;
mod onebusaway;
mod otp;
mod overpass;
mod types;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::geo::LatLng;
use crate::model::{
    ArrivalDeparture, GeocodeResult, NearbyTransit, ObaRoute, Place, PoiPage, PoiQuery, Route,
    RouteDetails, RouteSchedule, StopSchedule, TransitPlan, TravelMode, VehiclePosition,
};

pub use http::{AsyncHttpClient, HttpResponse, ReqwestClient, DEFAULT_TIMEOUT};
pub use mapbox::{mapbox_profile, MapboxProvider, MAPBOX_BASE_URL};
pub use nominatim::{NominatimProvider, NOMINATIM_BASE_URL};
pub use onebusaway::{extract_situations, OneBusAwayProvider, References as ObaReferences, OBA_BASE_URL};
pub use otp::{decode_leg_geometry, OtpProvider, TripRequest, OTP_GRAPHQL_PATH};
pub use overpass::{
    build_overpass_query, OverpassProvider, DEFAULT_MAX_IN_FLIGHT as OVERPASS_MAX_IN_FLIGHT,
    OVERPASS_BASE_URL,
};
pub use types::{cancellable, is_placeholder_key, ProviderError};

#[cfg(test)]
pub use http::tests::{MockHttpClient, RecordedRequest};

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A source of nearby places.
pub trait PoiSource: Send + Sync {
    /// Short human-readable provider name, used in logs.
    fn name(&self) -> &'static str;

    fn fetch_pois<'a>(
        &'a self,
        query: &'a PoiQuery,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<PoiPage>>;
}

/// Realtime transit data.
pub trait TransitApi: Send + Sync {
    fn fetch_nearby_transit<'a>(
        &'a self,
        center: LatLng,
        radius_m: u32,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<NearbyTransit>>;

    fn fetch_route<'a>(
        &'a self,
        route_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<ObaRoute>>;

    fn fetch_route_details<'a>(
        &'a self,
        route_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<RouteDetails>>;

    fn fetch_vehicles_for_route<'a>(
        &'a self,
        route_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<VehiclePosition>>>;

    fn fetch_route_schedule<'a>(
        &'a self,
        route_id: &'a str,
        date: Option<NaiveDate>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<RouteSchedule>>;

    fn fetch_stop_schedule<'a>(
        &'a self,
        stop_id: &'a str,
        date: Option<NaiveDate>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<StopSchedule>>;

    fn fetch_arrivals<'a>(
        &'a self,
        stop_id: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<ArrivalDeparture>>>;
}

/// Turn-by-turn routing between two points.
pub trait DirectionsApi: Send + Sync {
    fn get_directions<'a>(
        &'a self,
        start: LatLng,
        end: LatLng,
        mode: TravelMode,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Route>>;
}

/// Multi-modal transit journey planning.
pub trait TripPlanner: Send + Sync {
    fn plan_transit<'a>(
        &'a self,
        request: &'a TripRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<TransitPlan>>;
}

/// Forward and reverse geocoding, plus free-text place search.
pub trait Geocoder: Send + Sync {
    fn geocode<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<GeocodeResult>>>;

    fn reverse<'a>(
        &'a self,
        position: LatLng,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Option<GeocodeResult>>>;

    /// Free-text place search, optionally bounded to `(center, radius_m)`.
    fn search_places<'a>(
        &'a self,
        query: &'a str,
        near: Option<(LatLng, u32)>,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<Place>>>;
}
