//! Overpass (OpenStreetMap) POI provider.
//!
//! Builds an Overpass QL `around` query for the requested category and maps
//! the returned `elements[]` into [`Place`]s.
//!
//! # Element shapes
//!
//! - `node` carries `lat`/`lon` directly.
//! - `way` and `relation` only carry a `center` because the query asks for
//!   `out center`.
//!
//! Elements with neither are dropped.
//!
//! # Admission gate
//!
//! The public Overpass instances reject clients that open many parallel
//! queries, so each provider bounds its own in-flight requests with a
//! semaphore. Waiting for a permit is cancellable.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::geo::LatLng;
use crate::model::{Place, PoiPage, PoiQuery};

use super::types::{cancellable, check_response, decode_json};
use super::{AsyncHttpClient, PoiSource, ProviderError, ProviderResult};

/// Public Overpass interpreter endpoint.
pub const OVERPASS_BASE_URL: &str = "https://overpass-api.de/api/interpreter";

/// Default number of concurrent Overpass requests.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 2;

/// Places per page.
const PAGE_SIZE: usize = 50;

/// Server-side query timeout in seconds.
const QUERY_TIMEOUT_SECS: u32 = 25;

const PROVIDER: &str = "Overpass";

/// Tag filters used when no category is given.
const DEFAULT_FILTERS: &[&str] = &[
    r#"["amenity"]["name"]"#,
    r#"["shop"]["name"]"#,
    r#"["tourism"]["name"]"#,
    r#"["leisure"]["name"]"#,
];

/// OSM tag keys that name a place's category, in priority order.
const CATEGORY_KEYS: &[&str] = &["amenity", "shop", "tourism", "leisure", "public_transport"];

/// Map a user-facing category to Overpass tag filters.
fn category_filters(category: Option<&str>) -> ProviderResult<Vec<String>> {
    let Some(category) = category.map(str::trim).filter(|c| !c.is_empty() && *c != "*") else {
        return Ok(DEFAULT_FILTERS.iter().map(|f| f.to_string()).collect());
    };

    let category = category.to_lowercase();
    let filter = match category.as_str() {
        "restaurant" | "food" => r#"["amenity"~"restaurant|fast_food"]"#.to_string(),
        "cafe" | "coffee" => r#"["amenity"="cafe"]"#.to_string(),
        "bar" | "pub" => r#"["amenity"~"bar|pub"]"#.to_string(),
        "park" => r#"["leisure"="park"]"#.to_string(),
        "grocery" | "supermarket" => r#"["shop"~"supermarket|convenience|greengrocer"]"#.to_string(),
        "shop" | "shopping" => r#"["shop"]["name"]"#.to_string(),
        "hotel" | "lodging" => r#"["tourism"~"hotel|hostel|motel|guest_house"]"#.to_string(),
        "museum" => r#"["tourism"="museum"]"#.to_string(),
        "attraction" => r#"["tourism"~"attraction|viewpoint|artwork"]"#.to_string(),
        "parking" => r#"["amenity"~"parking|bicycle_parking"]"#.to_string(),
        other if other.chars().all(|c| c.is_ascii_lowercase() || c == '_') => {
            format!(r#"["amenity"="{}"]"#, other)
        }
        other => {
            return Err(ProviderError::InvalidRequest(format!(
                "unsupported POI category '{}'",
                other
            )))
        }
    };
    Ok(vec![filter])
}

/// Build the Overpass QL for `query`.
///
/// Asks for one element more than the requested page needs so the caller can
/// tell whether another page exists.
pub fn build_overpass_query(query: &PoiQuery) -> ProviderResult<String> {
    if !query.center.is_valid() {
        return Err(ProviderError::InvalidRequest(format!(
            "invalid search center {}",
            query.center
        )));
    }

    let around = format!(
        "(around:{},{:.6},{:.6})",
        query.radius_m, query.center.lat, query.center.lng
    );
    let limit = PAGE_SIZE * (query.page as usize + 1) + 1;

    let mut ql = format!("[out:json][timeout:{}];\n(\n", QUERY_TIMEOUT_SECS);
    for filter in category_filters(query.category.as_deref())? {
        for kind in ["node", "way", "relation"] {
            ql.push_str(&format!("  {}{}{};\n", kind, filter, around));
        }
    }
    ql.push_str(&format!(");\nout center {};", limit));
    Ok(ql)
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

impl OverpassElement {
    fn position(&self) -> Option<LatLng> {
        match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Some(LatLng::new(lat, lon)),
            (_, _, Some(center)) => Some(LatLng::new(center.lat, center.lon)),
            _ => None,
        }
    }

    fn into_place(self) -> Option<Place> {
        let position = self.position().filter(LatLng::is_valid)?;

        let category = CATEGORY_KEYS
            .iter()
            .find_map(|key| self.tags.get(*key))
            .cloned()
            .unwrap_or_else(|| "poi".to_string());
        let name = self
            .tags
            .get("name")
            .cloned()
            .unwrap_or_else(|| category.replace('_', " "));

        let mut place = Place::new(
            format!("overpass-{}-{}", self.kind, self.id),
            name,
            category,
            position,
        );
        place.description = self
            .tags
            .get("description")
            .or_else(|| self.tags.get("cuisine"))
            .cloned();
        place.address = match (self.tags.get("addr:housenumber"), self.tags.get("addr:street")) {
            (Some(number), Some(street)) => Some(format!("{} {}", number, street)),
            (None, Some(street)) => Some(street.clone()),
            _ => None,
        };
        place.is_native_poi = true;
        place.properties = self.tags;
        Some(place)
    }
}

/// Map an Overpass response body into one page of places.
fn parse_page(body: &[u8], page: u32) -> ProviderResult<PoiPage> {
    let response: OverpassResponse = decode_json(PROVIDER, body)?;
    let total = response.elements.len();

    let places: Vec<Place> = response
        .elements
        .into_iter()
        .filter_map(OverpassElement::into_place)
        .collect();
    let dropped = total - places.len();
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped Overpass elements without coordinates");
    }

    let start = PAGE_SIZE * page as usize;
    let has_more = places.len() > start + PAGE_SIZE;
    let pois: Vec<Place> = places.into_iter().skip(start).take(PAGE_SIZE).collect();

    Ok(PoiPage {
        pois,
        has_more,
        next_page: has_more.then_some(page + 1),
    })
}

/// Overpass POI provider.
pub struct OverpassProvider<C: AsyncHttpClient> {
    http_client: C,
    base_url: String,
    gate: Semaphore,
}

impl<C: AsyncHttpClient> OverpassProvider<C> {
    pub fn new(http_client: C) -> Self {
        Self::with_options(http_client, OVERPASS_BASE_URL, DEFAULT_MAX_IN_FLIGHT)
    }

    /// Use a different interpreter and admission limit.
    pub fn with_options(http_client: C, base_url: impl Into<String>, max_in_flight: usize) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            gate: Semaphore::new(max_in_flight.max(1)),
        }
    }

    async fn query(&self, query: &PoiQuery, cancel: &CancellationToken) -> ProviderResult<PoiPage> {
        let ql = build_overpass_query(query)?;

        let _permit = cancellable(cancel, async {
            self.gate
                .acquire()
                .await
                .map_err(|_| ProviderError::Network("Overpass gate closed".to_string()))
        })
        .await?;

        tracing::debug!(
            lat = query.center.lat,
            lng = query.center.lng,
            radius_m = query.radius_m,
            category = query.category.as_deref().unwrap_or("*"),
            page = query.page,
            "Overpass query"
        );

        let body = format!("data={}", urlencoding::encode(&ql)).into_bytes();
        let response = cancellable(
            cancel,
            self.http_client.post(
                &self.base_url,
                body,
                &[("Content-Type", "application/x-www-form-urlencoded")],
            ),
        )
        .await?;

        let body = check_response(PROVIDER, response)?;
        parse_page(&body, query.page)
    }
}

impl<C: AsyncHttpClient> PoiSource for OverpassProvider<C> {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn fetch_pois<'a>(
        &'a self,
        query: &'a PoiQuery,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<PoiPage>> {
        Box::pin(self.query(query, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockHttpClient;
    use std::sync::Arc;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "elements": [
            {"type": "node", "id": 1, "lat": 47.61, "lon": -122.33,
             "tags": {"amenity": "cafe", "name": "Bean There", "addr:housenumber": "12", "addr:street": "Pike St"}},
            {"type": "way", "id": 2, "center": {"lat": 47.62, "lon": -122.34},
             "tags": {"leisure": "park", "name": "Cal Anderson"}},
            {"type": "relation", "id": 3, "tags": {"amenity": "school", "name": "Nowhere"}}
        ]
    }"#;

    fn query() -> PoiQuery {
        PoiQuery::new(LatLng::new(47.6, -122.3), 500)
    }

    #[test]
    fn test_query_contains_around_clause_for_each_kind() {
        let ql = build_overpass_query(&query().with_category("cafe")).unwrap();
        assert!(ql.starts_with("[out:json]"));
        assert!(ql.contains(r#"node["amenity"="cafe"](around:500,47.600000,-122.300000);"#));
        assert!(ql.contains(r#"way["amenity"="cafe"]"#));
        assert!(ql.contains(r#"relation["amenity"="cafe"]"#));
        assert!(ql.ends_with("out center 51;"));
    }

    #[test]
    fn test_query_without_category_uses_defaults() {
        let ql = build_overpass_query(&query()).unwrap();
        assert!(ql.contains(r#"node["shop"]["name"]"#));
        assert!(ql.contains(r#"node["tourism"]["name"]"#));
    }

    #[test]
    fn test_query_rejects_unsafe_category() {
        let err = build_overpass_query(&query().with_category(r#"cafe"];out;"#)).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_query_rejects_invalid_center() {
        let q = PoiQuery::new(LatLng::new(120.0, 0.0), 100);
        assert!(build_overpass_query(&q).is_err());
    }

    #[test]
    fn test_parse_maps_nodes_and_centers() {
        let page = parse_page(SAMPLE.as_bytes(), 0).unwrap();
        assert_eq!(page.pois.len(), 2);
        assert!(!page.has_more);

        let cafe = &page.pois[0];
        assert_eq!(cafe.id, "overpass-node-1");
        assert_eq!(cafe.category, "cafe");
        assert_eq!(cafe.address.as_deref(), Some("12 Pike St"));
        assert!(cafe.is_native_poi);

        let park = &page.pois[1];
        assert_eq!(park.id, "overpass-way-2");
        assert_eq!(park.latitude, 47.62);
        assert_eq!(park.properties.get("leisure").map(String::as_str), Some("park"));
    }

    #[test]
    fn test_parse_paginates() {
        let elements: Vec<String> = (0..120)
            .map(|i| {
                format!(
                    r#"{{"type":"node","id":{},"lat":1.0,"lon":1.0,"tags":{{"amenity":"cafe"}}}}"#,
                    i
                )
            })
            .collect();
        let body = format!(r#"{{"elements":[{}]}}"#, elements.join(","));

        let first = parse_page(body.as_bytes(), 0).unwrap();
        assert_eq!(first.pois.len(), PAGE_SIZE);
        assert_eq!(first.next_page, Some(1));

        let last = parse_page(body.as_bytes(), 2).unwrap();
        assert_eq!(last.pois.len(), 20);
        assert!(!last.has_more);
        assert_eq!(last.next_page, None);
    }

    #[tokio::test]
    async fn test_fetch_pois_posts_form_encoded_query() {
        let mock = MockHttpClient::new().respond("overpass", 200, SAMPLE);
        let provider = OverpassProvider::new(mock.clone());

        let page = provider
            .fetch_pois(&query(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.pois.len(), 2);

        let request = &mock.requests()[0];
        assert_eq!(request.method, "POST");
        assert!(request.body.as_deref().unwrap().starts_with("data=%5Bout%3Ajson%5D"));
    }

    #[tokio::test]
    async fn test_fetch_pois_rate_limited() {
        let mock = MockHttpClient::new().respond("overpass", 429, "Too Many Requests");
        let provider = OverpassProvider::new(mock);

        let err = provider
            .fetch_pois(&query(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_bounds_in_flight_requests() {
        let mock =
            MockHttpClient::new().respond_after("overpass", Duration::from_millis(100), SAMPLE);
        let provider = Arc::new(OverpassProvider::with_options(mock.clone(), "http://overpass", 2));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    provider
                        .fetch_pois(&query(), &CancellationToken::new())
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(mock.request_count(), 5);
        assert_eq!(mock.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let mock = MockHttpClient::new().respond("overpass", 200, SAMPLE);
        let provider = OverpassProvider::new(mock.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider.fetch_pois(&query(), &cancel).await.unwrap_err();
        assert_eq!(err, ProviderError::Cancelled);
        assert_eq!(mock.request_count(), 0);
    }
}
