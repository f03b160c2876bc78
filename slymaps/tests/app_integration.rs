//! Integration tests for the application wiring.
//!
//! These tests drive `SlyMapsApp` end to end with in-memory providers:
//! - query coordinators → providers → stores → subscribers
//! - nearby POI fan-out with a failing source and the shared TTL cache
//! - route store selection across directions and transit routes
//! - home location persistence across restarts
//!
//! Run with: `cargo test --test app_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::{BoxFuture, FutureExt};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use slymaps::app::{AppConfig, Providers, SlyMapsApp};
use slymaps::clock::{ManualClock, SharedClock};
use slymaps::geo::LatLng;
use slymaps::model::{
    ArrivalDeparture, NearbyTransit, ObaRoute, Place, PoiPage, PoiQuery, Route, RouteDetails,
    RouteSchedule, RouteSegment, SectionStatus, Situation, StopSchedule, TransitStop, TravelMode,
    VehiclePosition,
};
use slymaps::provider::{
    DirectionsApi, PoiSource, ProviderError, ProviderResult, TransitApi, TripRequest,
};
use slymaps::query::{SECTION_ALERTS, SECTION_ARRIVALS};
use slymaps::store::HomeLocation;

// ============================================================================
// Fake providers
// ============================================================================

const NOW_MS: i64 = 1_700_000_000_000;

fn oba_route(id: &str) -> ObaRoute {
    ObaRoute {
        id: id.into(),
        short_name: Some("8".into()),
        long_name: Some("Seattle Center - Mount Baker".into()),
        description: None,
        agency_id: Some("1".into()),
        agency_name: Some("Metro Transit".into()),
        color: None,
        text_color: None,
        route_type: Some(3),
        url: None,
    }
}

fn stop(id: &str, lat: f64) -> TransitStop {
    TransitStop {
        id: id.into(),
        name: format!("Stop {}", id),
        code: None,
        position: LatLng::new(lat, -122.33),
        direction: Some("N".into()),
        route_ids: vec!["1_100275".into()],
    }
}

fn vehicle(id: &str, route_id: &str) -> VehiclePosition {
    VehiclePosition {
        vehicle_id: id.into(),
        trip_id: Some("1_trip".into()),
        route_id: route_id.into(),
        position: LatLng::new(47.62, -122.33),
        orientation: None,
        headsign: Some("Mount Baker".into()),
        next_stop_id: None,
        phase: Some("in_progress".into()),
        schedule_deviation_secs: Some(120),
        predicted: true,
        last_update: NOW_MS,
    }
}

#[derive(Default)]
struct FakeTransit {
    details_calls: AtomicUsize,
    vehicle_calls: AtomicUsize,
}

impl TransitApi for FakeTransit {
    fn fetch_nearby_transit<'a>(
        &'a self,
        center: LatLng,
        _radius_m: u32,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<NearbyTransit>> {
        async move {
            Ok(NearbyTransit {
                stops: vec![stop("1_75403", center.lat)],
                routes: vec![oba_route("1_100275")],
            })
        }
        .boxed()
    }

    fn fetch_route<'a>(
        &'a self,
        route_id: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<ObaRoute>> {
        async move { Ok(oba_route(route_id)) }.boxed()
    }

    fn fetch_route_details<'a>(
        &'a self,
        route_id: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<RouteDetails>> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        async move {
            Ok(RouteDetails {
                route: oba_route(route_id),
                branches: vec![],
                segments: vec![RouteSegment {
                    coordinates: vec![[-122.35, 47.62], [-122.30, 47.58]],
                }],
                stops_by_segment: vec![vec![stop("1_1", 47.62), stop("1_2", 47.58)]],
            })
        }
        .boxed()
    }

    fn fetch_vehicles_for_route<'a>(
        &'a self,
        route_id: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<VehiclePosition>>> {
        self.vehicle_calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok(vec![vehicle("1_4361", route_id)]) }.boxed()
    }

    fn fetch_route_schedule<'a>(
        &'a self,
        route_id: &'a str,
        _date: Option<NaiveDate>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<RouteSchedule>> {
        async move {
            Ok(RouteSchedule {
                route_id: route_id.into(),
                date: NOW_MS,
                entries: vec![],
                situations: vec![],
            })
        }
        .boxed()
    }

    fn fetch_stop_schedule<'a>(
        &'a self,
        stop_id: &'a str,
        _date: Option<NaiveDate>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<StopSchedule>> {
        async move {
            Ok(StopSchedule {
                stop_id: stop_id.into(),
                date: NOW_MS,
                entries: vec![],
                situations: vec![Situation {
                    id: "alert-1".into(),
                    summary: Some("Detour on 3rd Ave".into()),
                    description: None,
                    severity: Some("warning".into()),
                    reason: None,
                    url: None,
                    active_windows: vec![],
                    affected_route_ids: vec!["1_100275".into()],
                    affected_stop_ids: vec![stop_id.into()],
                }],
            })
        }
        .boxed()
    }

    fn fetch_arrivals<'a>(
        &'a self,
        stop_id: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Vec<ArrivalDeparture>>> {
        async move {
            Ok(vec![ArrivalDeparture {
                route_id: "1_100275".into(),
                route_short_name: Some("8".into()),
                trip_id: "1_trip".into(),
                trip_headsign: Some("Mount Baker".into()),
                stop_id: stop_id.into(),
                vehicle_id: Some("1_4361".into()),
                scheduled_arrival: NOW_MS + 300_000,
                predicted_arrival: Some(NOW_MS + 360_000),
                scheduled_departure: NOW_MS + 300_000,
                predicted_departure: None,
                number_of_stops_away: Some(3),
            }])
        }
        .boxed()
    }
}

/// A POI source returning fixed places, or failing every call.
struct FakePoiSource {
    name: &'static str,
    places: Vec<Place>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakePoiSource {
    fn ok(name: &'static str, places: Vec<Place>) -> Self {
        Self {
            name,
            places,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            name,
            places: vec![],
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

impl PoiSource for FakePoiSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fetch_pois<'a>(
        &'a self,
        _query: &'a PoiQuery,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<PoiPage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if self.fail {
                Err(ProviderError::Http {
                    provider: "overpass",
                    status: 504,
                    message: "Gateway Timeout".into(),
                })
            } else {
                Ok(PoiPage::complete(self.places.clone()))
            }
        }
        .boxed()
    }
}

struct FakeDirections;

impl DirectionsApi for FakeDirections {
    fn get_directions<'a>(
        &'a self,
        start: LatLng,
        end: LatLng,
        mode: TravelMode,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ProviderResult<Route>> {
        async move {
            Ok(Route {
                id: "route-fake-1".into(),
                mode,
                start,
                end,
                geometry: vec![start.to_coordinate(), end.to_coordinate()],
                distance: 1250.0,
                duration: 900.0,
                legs: vec![],
            })
        }
        .boxed()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn oba_stop_place(stop_id: &str) -> Place {
    let mut place = Place::new(
        format!("oba-{}", stop_id),
        "3rd Ave & Pike St",
        "bus_stop",
        LatLng::new(47.6097, -122.3381),
    );
    place.is_oba_stop = true;
    place
}

fn clock() -> SharedClock {
    Arc::new(ManualClock::new(NOW_MS))
}

struct Harness {
    app: SlyMapsApp,
    transit: Arc<FakeTransit>,
    overpass: Arc<FakePoiSource>,
    oba_pois: Arc<FakePoiSource>,
}

fn harness(config: AppConfig) -> Harness {
    let transit = Arc::new(FakeTransit::default());
    let overpass = Arc::new(FakePoiSource::failing("overpass"));
    let oba_pois = Arc::new(FakePoiSource::ok(
        "onebusaway",
        vec![oba_stop_place("1_75403"), oba_stop_place("1_75403")],
    ));

    let providers = Providers {
        transit: transit.clone(),
        poi_sources: vec![overpass.clone(), oba_pois.clone()],
        directions: Some(Arc::new(FakeDirections)),
        planner: None,
        geocoder: None,
    };
    let app = SlyMapsApp::with_providers(providers, config, clock());

    Harness {
        app,
        transit,
        overpass,
        oba_pois,
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Loading a transit route fills the store, activates it and notifies
/// subscribers; route details are cached for the next load.
#[tokio::test]
async fn test_load_transit_route_populates_store() {
    let h = harness(AppConfig::default());
    let notifications = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notifications);
    let _subscription = h.app.route_store().subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let cancel = CancellationToken::new();
    let entity = h
        .app
        .routing()
        .load_transit_route("1_100275", &cancel)
        .await
        .unwrap();

    assert_eq!(entity.id, "1_100275");
    assert!(entity.is_active);
    assert!(!entity.is_loading);
    assert_eq!(entity.selected_segment_index, Some(0));
    assert_eq!(entity.selected_stops().map(<[_]>::len), Some(2));
    assert_eq!(entity.vehicles.as_ref().map(Vec::len), Some(1));
    assert!(notifications.load(Ordering::SeqCst) >= 3);

    let state = h.app.route_store().state();
    assert_eq!(state.active_route_id.as_deref(), Some("1_100275"));

    h.app
        .routing()
        .load_transit_route("1_100275", &cancel)
        .await
        .unwrap();
    assert_eq!(h.transit.details_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.transit.vehicle_calls.load(Ordering::SeqCst), 2);
}

/// A failing source is dropped from the fan-out; the merged page is
/// deduplicated, cached and written to the place store.
#[tokio::test]
async fn test_nearby_pois_survive_partial_failure() {
    let h = harness(AppConfig::default());
    let query = PoiQuery::new(LatLng::new(47.6097, -122.3381), 400);
    let cancel = CancellationToken::new();

    let page = h.app.places().nearby_pois(&query, &cancel).await.unwrap();
    assert_eq!(page.pois.len(), 1);
    assert_eq!(page.pois[0].id, "oba-1_75403");

    let state = h.app.place_store().state();
    assert_eq!(state.nearby_pois.len(), 1);
    assert!(state.nearby_error.is_none());
    assert!(!state.is_loading_nearby);

    h.app.places().nearby_pois(&query, &cancel).await.unwrap();
    assert_eq!(h.overpass.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.oba_pois.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.app.poi_cache().len(), 1);
}

/// Selecting a stop fills its arrivals and alerts sections.
#[tokio::test]
async fn test_enrich_stop_fills_popup_sections() {
    let h = harness(AppConfig::default());
    let cancel = CancellationToken::new();

    h.app
        .places()
        .enrich_place(oba_stop_place("1_75403"), &cancel)
        .await;

    let arrivals = h.app.place_store().section(SECTION_ARRIVALS).unwrap();
    assert_eq!(arrivals.status, SectionStatus::Success);
    let data = arrivals.data.unwrap();
    assert_eq!(data[0]["trip_headsign"], "Mount Baker");

    let alerts = h.app.place_store().section(SECTION_ALERTS).unwrap();
    assert_eq!(alerts.status, SectionStatus::Success);
    assert_eq!(alerts.data.unwrap().as_array().map(Vec::len), Some(1));

    h.app.places().clear_selection();
    assert!(h.app.place_store().selected_place().is_none());
}

/// Directions and transit routes share one active selection.
#[tokio::test]
async fn test_active_route_moves_between_features() {
    let h = harness(AppConfig::default());
    let cancel = CancellationToken::new();
    let start = LatLng::new(47.6097, -122.3381);
    let end = LatLng::new(47.6205, -122.3493);

    let directions_id = h
        .app
        .routing()
        .directions(start, end, TravelMode::Walking, &cancel)
        .await
        .unwrap();
    let state = h.app.route_store().state();
    assert_eq!(state.active_route_id.as_deref(), Some(directions_id.as_str()));
    assert_eq!(state.start, Some(start));
    assert_eq!(state.end, Some(end));

    h.app
        .routing()
        .load_transit_route("1_100275", &cancel)
        .await
        .unwrap();

    let state = h.app.route_store().state();
    assert_eq!(state.routes.len(), 2);
    assert_eq!(state.active_route_id.as_deref(), Some("1_100275"));
    assert!(!state.routes[&directions_id].is_active);
    assert_eq!(state.routes.values().filter(|r| r.is_active).count(), 1);

    let evicted = h.app.route_store().evict_lru(1);
    assert_eq!(evicted, vec![directions_id]);
}

/// Missing planner surfaces as a configuration error at call time.
#[tokio::test]
async fn test_unconfigured_planner_errors_at_call_time() {
    let h = harness(AppConfig::default());
    let request = TripRequest::new(
        LatLng::new(47.6, -122.3),
        LatLng::new(47.7, -122.3),
    );

    let err = h
        .app
        .routing()
        .plan_transit(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not configured"));
    assert_eq!(h.app.route_store().route_count(), 0);
}

/// The home location survives a restart through the preferences file.
#[test]
fn test_home_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let config = AppConfig::default()
        .with_preferences_path(dir.path().join("preferences.json"))
        .with_search_debounce(Duration::from_millis(10));

    let first = harness(config.clone());
    first
        .app
        .set_home(
            HomeLocation::new("Home", LatLng::new(47.6097, -122.3331))
                .with_address("1st Ave, Seattle"),
        )
        .unwrap();

    let second = harness(config);
    let home = second.app.home().unwrap();
    assert_eq!(home.name, "Home");
    assert_eq!(home.address.as_deref(), Some("1st Ave, Seattle"));
    assert_eq!(second.app.place_store().state().home, Some(home));
}
