//! Application bootstrap implementation.
//!
//! `SlyMapsApp` wires the shared pieces together in one place: one clock,
//! one rate limiter for OneBusAway, one POI cache, the two stores, and the
//! query coordinators that write into them.

use std::sync::Arc;

use tracing::{info, warn};

use super::config::AppConfig;
use super::error::AppError;
use crate::cache::TtlCache;
use crate::clock::{system_clock, SharedClock};
use crate::config::ConfigFile;
use crate::model::PoiPage;
use crate::provider::{
    DirectionsApi, Geocoder, MapboxProvider, NominatimProvider, OneBusAwayProvider, OtpProvider,
    OverpassProvider, PoiSource, ReqwestClient, TransitApi, TripPlanner,
};
use crate::query::{PlaceQueries, RoutingQueries, TransitQueries};
use crate::rate_limit::RateLimiter;
use crate::store::{HomeLocation, PlaceStore, PreferencesStore, RouteStore};

/// The provider adapters an application runs against.
///
/// [`SlyMapsApp::from_config`] fills this with the real HTTP adapters;
/// tests pass fakes through [`SlyMapsApp::with_providers`].
#[derive(Clone)]
pub struct Providers {
    pub transit: Arc<dyn TransitApi>,
    /// Queried concurrently for nearby POIs.
    pub poi_sources: Vec<Arc<dyn PoiSource>>,
    pub directions: Option<Arc<dyn DirectionsApi>>,
    pub planner: Option<Arc<dyn TripPlanner>>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl Providers {
    /// Build the HTTP adapters described by `config`.
    ///
    /// Missing credentials do not fail here. The affected adapter reports a
    /// configuration error when it is first called.
    pub fn from_config(
        config: &ConfigFile,
        app_config: &AppConfig,
        clock: SharedClock,
    ) -> Result<Self, AppError> {
        let client = ReqwestClient::new()?;
        let rate_limiter = Arc::new(RateLimiter::new(app_config.rate_limit, clock));

        let onebusaway = Arc::new(
            OneBusAwayProvider::new(
                client.clone(),
                config.onebusaway.api_key.clone().unwrap_or_default(),
                rate_limiter,
            )
            .with_base_url(config.onebusaway.base_url.clone()),
        );

        let overpass: Arc<dyn PoiSource> = Arc::new(OverpassProvider::with_options(
            client.clone(),
            config.overpass.url.clone(),
            config.overpass.max_in_flight,
        ));

        let mut nominatim =
            NominatimProvider::new(client.clone()).with_base_url(config.nominatim.url.clone());
        if let Some(user_agent) = &config.nominatim.user_agent {
            nominatim = nominatim.with_user_agent(user_agent.clone());
        }

        let mapbox = MapboxProvider::new(
            client.clone(),
            config.mapbox.access_token.clone().unwrap_or_default(),
        )
        .with_base_url(config.mapbox.base_url.clone());

        let otp = OtpProvider::new(client, config.otp.url.clone().unwrap_or_default());

        if config.onebusaway.api_key.is_none() {
            warn!("No OneBusAway API key configured; transit queries will fail");
        }

        Ok(Self {
            transit: Arc::clone(&onebusaway) as Arc<dyn TransitApi>,
            poi_sources: vec![overpass, onebusaway as Arc<dyn PoiSource>],
            directions: Some(Arc::new(mapbox)),
            planner: Some(Arc::new(otp)),
            geocoder: Some(Arc::new(nominatim)),
        })
    }
}

/// SlyMaps application: stores plus the coordinators that fill them.
///
/// # Example
///
/// ```ignore
/// use slymaps::app::SlyMapsApp;
/// use slymaps::config::ConfigFile;
///
/// let app = SlyMapsApp::from_config(&ConfigFile::load()?)?;
/// let handle = app.transit().route_details("1_100224");
/// let details = handle.fetch().await?;
/// ```
pub struct SlyMapsApp {
    config: AppConfig,
    clock: SharedClock,
    route_store: Arc<RouteStore>,
    place_store: Arc<PlaceStore>,
    poi_cache: Arc<TtlCache<PoiPage>>,
    transit: Arc<TransitQueries>,
    places: Arc<PlaceQueries>,
    routing: Arc<RoutingQueries>,
    geocoder: Option<Arc<dyn Geocoder>>,
    preferences: Option<PreferencesStore>,
}

impl SlyMapsApp {
    /// Build the application with real providers and the system clock.
    pub fn from_config(config: &ConfigFile) -> Result<Self, AppError> {
        let app_config = AppConfig::from_config_file(config);
        let clock = system_clock();
        let providers = Providers::from_config(config, &app_config, clock.clone())?;
        Ok(Self::with_providers(providers, app_config, clock))
    }

    /// Build the application around the given providers.
    ///
    /// A saved home location is loaded into the place store. Unreadable
    /// preferences are logged and ignored.
    pub fn with_providers(providers: Providers, config: AppConfig, clock: SharedClock) -> Self {
        info!(
            poi_sources = providers.poi_sources.len(),
            directions = providers.directions.is_some(),
            planner = providers.planner.is_some(),
            geocoder = providers.geocoder.is_some(),
            "Starting SlyMaps"
        );

        let route_store = Arc::new(RouteStore::new(clock.clone()));
        let place_store = Arc::new(PlaceStore::new(clock.clone()));
        let poi_cache = Arc::new(TtlCache::new(config.cache, clock.clone()));

        let transit = Arc::new(TransitQueries::new(
            providers.transit,
            config.query_cache_capacity,
            clock.clone(),
        ));

        let mut places = PlaceQueries::new(
            providers.poi_sources,
            Arc::clone(&poi_cache),
            Arc::clone(&place_store),
        )
        .with_transit(Arc::clone(&transit))
        .with_search_debounce(config.search_debounce);
        if let Some(geocoder) = &providers.geocoder {
            places = places.with_geocoder(Arc::clone(geocoder));
        }

        let mut routing =
            RoutingQueries::new(Arc::clone(&route_store)).with_transit(Arc::clone(&transit));
        if let Some(directions) = providers.directions {
            routing = routing.with_directions(directions);
        }
        if let Some(planner) = providers.planner {
            routing = routing.with_planner(planner);
        }

        let preferences = config.preferences_path.clone().map(PreferencesStore::new);

        let app = Self {
            config,
            clock,
            route_store,
            place_store,
            poi_cache,
            transit,
            places: Arc::new(places),
            routing: Arc::new(routing),
            geocoder: providers.geocoder,
            preferences,
        };
        app.restore_home();
        app
    }

    fn restore_home(&self) {
        let Some(preferences) = &self.preferences else {
            return;
        };
        match preferences.load() {
            Ok(saved) => {
                if let Some(home) = &saved.home {
                    info!(name = %home.name, "Restored home location");
                }
                self.place_store.set_home(saved.home);
            }
            Err(e) => warn!(error = %e, "Ignoring unreadable preferences"),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn route_store(&self) -> &Arc<RouteStore> {
        &self.route_store
    }

    pub fn place_store(&self) -> &Arc<PlaceStore> {
        &self.place_store
    }

    pub fn poi_cache(&self) -> &Arc<TtlCache<PoiPage>> {
        &self.poi_cache
    }

    pub fn transit(&self) -> &Arc<TransitQueries> {
        &self.transit
    }

    pub fn places(&self) -> &Arc<PlaceQueries> {
        &self.places
    }

    pub fn routing(&self) -> &Arc<RoutingQueries> {
        &self.routing
    }

    pub fn geocoder(&self) -> Option<&Arc<dyn Geocoder>> {
        self.geocoder.as_ref()
    }

    pub fn home(&self) -> Option<HomeLocation> {
        self.place_store.home()
    }

    /// Save `home` and show it in the place store.
    pub fn set_home(&self, home: HomeLocation) -> Result<(), AppError> {
        self.persist_home(Some(home.clone()))?;
        info!(name = %home.name, position = %home.position, "Home location set");
        self.place_store.set_home(Some(home));
        Ok(())
    }

    pub fn clear_home(&self) -> Result<(), AppError> {
        self.persist_home(None)?;
        info!("Home location cleared");
        self.place_store.set_home(None);
        Ok(())
    }

    fn persist_home(&self, home: Option<HomeLocation>) -> Result<(), AppError> {
        let Some(preferences) = &self.preferences else {
            return Ok(());
        };
        let mut saved = preferences.load()?;
        saved.home = home;
        preferences.save(&saved)?;
        Ok(())
    }

    /// Drop expired POI cache entries, returning how many were removed.
    pub fn sweep_caches(&self) -> usize {
        self.poi_cache.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::geo::LatLng;
    use crate::query::FakeTransit;
    use tempfile::TempDir;

    fn providers() -> Providers {
        Providers {
            transit: Arc::new(FakeTransit::default()),
            poi_sources: Vec::new(),
            directions: None,
            planner: None,
            geocoder: None,
        }
    }

    fn clock() -> SharedClock {
        Arc::new(ManualClock::new(1_700_000_000_000))
    }

    #[test]
    fn test_home_round_trips_through_preferences() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::default().with_preferences_path(dir.path().join("prefs.json"));

        let app = SlyMapsApp::with_providers(providers(), config.clone(), clock());
        assert!(app.home().is_none());

        let home = HomeLocation::new("Home", LatLng::new(47.61, -122.33)).with_address("1st Ave");
        app.set_home(home.clone()).unwrap();
        assert_eq!(app.place_store().home(), Some(home.clone()));

        let restarted = SlyMapsApp::with_providers(providers(), config.clone(), clock());
        assert_eq!(restarted.home(), Some(home));

        restarted.clear_home().unwrap();
        let again = SlyMapsApp::with_providers(providers(), config, clock());
        assert!(again.home().is_none());
    }

    #[test]
    fn test_malformed_preferences_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let app = SlyMapsApp::with_providers(
            providers(),
            AppConfig::default().with_preferences_path(&path),
            clock(),
        );
        assert!(app.home().is_none());
        assert!(matches!(
            app.set_home(HomeLocation::new("Home", LatLng::new(0.0, 0.0))),
            Err(AppError::Preferences(_))
        ));
    }

    #[test]
    fn test_home_without_preferences_path() {
        let app = SlyMapsApp::with_providers(providers(), AppConfig::default(), clock());
        app.set_home(HomeLocation::new("Home", LatLng::new(1.0, 2.0)))
            .unwrap();
        assert_eq!(app.home().map(|h| h.name), Some("Home".to_string()));
    }

    #[test]
    fn test_real_providers_from_default_config() {
        let config = AppConfig::default();
        let providers = Providers::from_config(&ConfigFile::default(), &config, clock()).unwrap();
        assert_eq!(providers.poi_sources.len(), 2);
        assert!(providers.directions.is_some());

        let app = SlyMapsApp::with_providers(providers, config, clock());
        assert!(app.geocoder().is_some());
        assert_eq!(app.route_store().route_count(), 0);
        assert_eq!(app.sweep_caches(), 0);
    }
}
