//! Nominatim geocoding provider.
//!
//! Nominatim's usage policy requires an identifying `User-Agent` on every
//! request; the provider always sends one.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::geo::LatLng;
use crate::model::{GeocodeResult, Place, PoiPage, PoiQuery};

use super::types::{cancellable, check_response, decode_json};
use super::{AsyncHttpClient, Geocoder, PoiSource, ProviderError, ProviderResult};

/// Public Nominatim instance.
pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

const PROVIDER: &str = "Nominatim";

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Results requested for a category search around a point.
const POI_SEARCH_LIMIT: usize = 40;

const DEFAULT_USER_AGENT: &str = concat!(
    "SlyMaps/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/slymaps/slymaps)"
);

#[derive(Debug, Deserialize)]
struct WirePlace {
    place_id: serde_json::Value,
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    address: BTreeMap<String, String>,
}

impl WirePlace {
    fn id(&self) -> String {
        match &self.place_id {
            serde_json::Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }

    fn position(&self) -> Option<LatLng> {
        let lat = self.lat.trim().parse().ok()?;
        let lng = self.lon.trim().parse().ok()?;
        Some(LatLng::new(lat, lng)).filter(LatLng::is_valid)
    }

    fn to_result(&self) -> Option<GeocodeResult> {
        Some(GeocodeResult {
            place_id: self.id(),
            display_name: self.display_name.clone(),
            position: self.position()?,
            category: self.kind.clone().or_else(|| self.category.clone()),
            address: self.address.clone(),
        })
    }

    fn into_place(self) -> Option<Place> {
        let position = self.position()?;
        let name = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.display_name.split(',').next().map(|s| s.trim().to_string()))
            .unwrap_or_default();
        let category = self
            .kind
            .clone()
            .or_else(|| self.category.clone())
            .unwrap_or_else(|| "place".to_string());

        let mut place = Place::new(format!("nominatim-{}", self.id()), name, category, position);
        place.address = Some(self.display_name).filter(|d| !d.is_empty());
        place.is_native_poi = true;
        place.properties = self.address;
        if let Some(category) = self.category {
            place.properties.insert("osm_class".into(), category);
        }
        Some(place)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReverseResponse {
    Error { error: String },
    Place(WirePlace),
}

/// `left,top,right,bottom` box around `center`.
fn viewbox(center: LatLng, radius_m: u32) -> String {
    let dlat = radius_m as f64 / METERS_PER_DEGREE;
    let dlng = radius_m as f64 / (METERS_PER_DEGREE * center.lat.to_radians().cos().max(0.01));
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        center.lng - dlng,
        center.lat + dlat,
        center.lng + dlng,
        center.lat - dlat
    )
}

/// Nominatim geocoder.
pub struct NominatimProvider<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
    user_agent: String,
}

impl<C: AsyncHttpClient> NominatimProvider<C> {
    pub fn new(http_client: C) -> Self {
        Self {
            http_client,
            base_url: NOMINATIM_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    async fn get(&self, url: &str, cancel: &CancellationToken) -> ProviderResult<Vec<u8>> {
        tracing::debug!(url, "Nominatim request");
        let response = cancellable(
            cancel,
            self.http_client.get(url, &[("User-Agent", self.user_agent.as_str())]),
        )
        .await?;
        check_response(PROVIDER, response)
    }

    async fn search(
        &self,
        query: &str,
        near: Option<(LatLng, u32)>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<WirePlace>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ProviderError::InvalidRequest("empty search query".to_string()));
        }

        let mut url = format!(
            "{}/search?q={}&format=jsonv2&addressdetails=1&limit={}",
            self.base_url,
            urlencoding::encode(query),
            limit.clamp(1, 50)
        );
        if let Some((center, radius_m)) = near {
            url.push_str(&format!(
                "&viewbox={}&bounded=1",
                urlencoding::encode(&viewbox(center, radius_m))
            ));
        }

        let body = self.get(&url, cancel).await?;
        decode_json(PROVIDER, &body)
    }

    async fn forward(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<GeocodeResult>> {
        let places = self.search(query, None, limit, cancel).await?;
        Ok(places.iter().filter_map(WirePlace::to_result).collect())
    }

    async fn reverse_lookup(
        &self,
        position: LatLng,
        cancel: &CancellationToken,
    ) -> ProviderResult<Option<GeocodeResult>> {
        if !position.is_valid() {
            return Err(ProviderError::InvalidRequest(format!(
                "coordinate out of range: {}",
                position
            )));
        }

        let url = format!(
            "{}/reverse?lat={}&lon={}&format=jsonv2&addressdetails=1",
            self.base_url, position.lat, position.lng
        );
        let body = self.get(&url, cancel).await?;

        let response: ReverseResponse = decode_json(PROVIDER, &body)?;
        match response {
            ReverseResponse::Place(place) => Ok(place.to_result()),
            ReverseResponse::Error { error } => {
                tracing::debug!(%position, %error, "Reverse geocode found nothing");
                Ok(None)
            }
        }
    }

    async fn places(
        &self,
        query: &str,
        near: Option<(LatLng, u32)>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<Place>> {
        let places = self.search(query, near, limit, cancel).await?;
        Ok(places.into_iter().filter_map(WirePlace::into_place).collect())
    }

    async fn category_pois(
        &self,
        query: &PoiQuery,
        cancel: &CancellationToken,
    ) -> ProviderResult<PoiPage> {
        // Nominatim is a text search; without a category there is nothing to ask for.
        let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(PoiPage::default());
        };
        if query.page > 0 {
            return Ok(PoiPage::default());
        }

        let places = self
            .places(
                category,
                Some((query.center, query.radius_m)),
                POI_SEARCH_LIMIT,
                cancel,
            )
            .await?;
        Ok(PoiPage::complete(places))
    }
}

impl<C: AsyncHttpClient> Geocoder for NominatimProvider<C> {
    fn geocode<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<GeocodeResult>>> {
        Box::pin(self.forward(query, limit, cancel))
    }

    fn reverse<'a>(
        &'a self,
        position: LatLng,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Option<GeocodeResult>>> {
        Box::pin(self.reverse_lookup(position, cancel))
    }

    fn search_places<'a>(
        &'a self,
        query: &'a str,
        near: Option<(LatLng, u32)>,
        limit: usize,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<Place>>> {
        Box::pin(self.places(query, near, limit, cancel))
    }
}

impl<C: AsyncHttpClient> PoiSource for NominatimProvider<C> {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn fetch_pois<'a>(
        &'a self,
        query: &'a PoiQuery,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<PoiPage>> {
        Box::pin(self.category_pois(query, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockHttpClient;

    const SEARCH: &str = r#"[
        {"place_id": 298131, "osm_type": "way", "osm_id": 1, "lat": "47.6205", "lon": "-122.3493",
         "display_name": "Space Needle, 400, Broad Street, Seattle, WA", "name": "Space Needle",
         "category": "tourism", "type": "attraction",
         "address": {"road": "Broad Street", "city": "Seattle"}},
        {"place_id": "42", "lat": "not-a-number", "lon": "0", "display_name": "Broken"}
    ]"#;

    fn provider(mock: &MockHttpClient) -> NominatimProvider<MockHttpClient> {
        NominatimProvider::new(mock.clone()).with_base_url("http://nominatim.test")
    }

    #[tokio::test]
    async fn test_geocode_sends_user_agent() {
        let mock = MockHttpClient::new().respond("/search", 200, SEARCH);
        let provider = provider(&mock);

        let results = provider
            .geocode("space needle", 5, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].place_id, "298131");
        assert_eq!(results[0].category.as_deref(), Some("attraction"));
        assert_eq!(results[0].address.get("city").map(String::as_str), Some("Seattle"));

        let request = &mock.requests()[0];
        assert!(request.url.contains("q=space%20needle"));
        assert!(request.url.contains("limit=5"));
        assert!(request
            .headers
            .iter()
            .any(|(name, value)| name == "User-Agent" && value.starts_with("SlyMaps/")));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let mock = MockHttpClient::new();
        let err = provider(&mock)
            .geocode("  ", 5, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_found() {
        let body = r#"{"place_id": 7, "lat": "47.6", "lon": "-122.3", "display_name": "Pike Place Market",
                       "category": "amenity", "type": "marketplace", "address": {"city": "Seattle"}}"#;
        let mock = MockHttpClient::new().respond("/reverse", 200, body);

        let result = provider(&mock)
            .reverse(LatLng::new(47.6, -122.3), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.display_name, "Pike Place Market");
    }

    #[tokio::test]
    async fn test_reverse_not_found_is_none() {
        let mock = MockHttpClient::new().respond("/reverse", 200, r#"{"error": "Unable to geocode"}"#);

        let result = provider(&mock)
            .reverse(LatLng::new(0.0, -150.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_search_places_bounded_to_radius() {
        let mock = MockHttpClient::new().respond("/search", 200, SEARCH);

        let places = provider(&mock)
            .search_places(
                "attraction",
                Some((LatLng::new(47.62, -122.35), 1000)),
                10,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(places.len(), 1);
        assert_eq!(places[0].id, "nominatim-298131");
        assert_eq!(places[0].name, "Space Needle");
        assert_eq!(places[0].properties.get("osm_class").map(String::as_str), Some("tourism"));
        assert!(mock.requests()[0].url.contains("&bounded=1"));
    }

    #[tokio::test]
    async fn test_poi_source_needs_category() {
        let mock = MockHttpClient::new();
        let page = provider(&mock)
            .fetch_pois(
                &PoiQuery::new(LatLng::new(47.6, -122.3), 500),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(page.pois.is_empty());
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_viewbox_is_centered() {
        let bbox = viewbox(LatLng::new(0.0, 0.0), 1113);
        assert_eq!(bbox, "-0.009998,0.009998,0.009998,-0.009998");
    }
}
