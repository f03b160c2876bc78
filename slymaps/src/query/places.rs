//! Nearby POIs, place search and popup enrichment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::geo::LatLng;
use crate::model::{dedupe_pois, Place, PoiPage, PoiQuery};
use crate::provider::{cancellable, Geocoder, PoiSource, ProviderError, ProviderResult};
use crate::rate_limit::Debouncer;
use crate::store::PlaceStore;

use super::transit::TransitQueries;

/// Popup section with the reverse-geocoded address.
pub const SECTION_ADDRESS: &str = "address";
/// Popup section with upcoming arrivals (transit stops only).
pub const SECTION_ARRIVALS: &str = "arrivals";
/// Popup section with service alerts (transit stops only).
pub const SECTION_ALERTS: &str = "alerts";

/// Default quiet period before a search runs.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Query coordinator for places.
pub struct PlaceQueries {
    sources: Vec<Arc<dyn PoiSource>>,
    geocoder: Option<Arc<dyn Geocoder>>,
    transit: Option<Arc<TransitQueries>>,
    cache: Arc<TtlCache<PoiPage>>,
    store: Arc<PlaceStore>,
    search_debouncer: Debouncer,
    nearby_generation: AtomicU64,
}

impl PlaceQueries {
    pub fn new(
        sources: Vec<Arc<dyn PoiSource>>,
        cache: Arc<TtlCache<PoiPage>>,
        store: Arc<PlaceStore>,
    ) -> Self {
        Self {
            sources,
            geocoder: None,
            transit: None,
            cache,
            store,
            search_debouncer: Debouncer::new(DEFAULT_SEARCH_DEBOUNCE),
            nearby_generation: AtomicU64::new(0),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_transit(mut self, transit: Arc<TransitQueries>) -> Self {
        self.transit = Some(transit);
        self
    }

    pub fn with_search_debounce(mut self, delay: Duration) -> Self {
        self.search_debouncer = Debouncer::new(delay);
        self
    }

    pub fn store(&self) -> &Arc<PlaceStore> {
        &self.store
    }

    /// Fetch POIs from every source concurrently and merge them.
    ///
    /// A source that fails is logged and left out; the call only fails
    /// when every source failed, and then nothing is cached. Results are
    /// deduplicated by id, cached under [`PoiQuery::cache_key`], and written
    /// to the place store unless a newer lookup started meanwhile.
    pub async fn nearby_pois(
        &self,
        query: &PoiQuery,
        cancel: &CancellationToken,
    ) -> ProviderResult<PoiPage> {
        let generation = self.nearby_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let is_current = || self.nearby_generation.load(Ordering::SeqCst) == generation;
        let key = query.cache_key();

        if let Some(page) = self.cache.get(&key) {
            tracing::debug!(%key, pois = page.pois.len(), "POI cache hit");
            if is_current() {
                self.store.set_nearby_pois(page.pois.clone());
            }
            return Ok(page);
        }

        tracing::debug!(%key, sources = self.sources.len(), "POI cache miss");
        self.store.set_loading_nearby(true);

        let results = join_all(
            self.sources
                .iter()
                .map(|source| source.fetch_pois(query, cancel)),
        )
        .await;

        if cancel.is_cancelled() {
            if is_current() {
                self.store.set_loading_nearby(false);
            }
            return Err(ProviderError::Cancelled);
        }

        let mut pois = Vec::new();
        let mut has_more = false;
        let mut next_page: Option<u32> = None;
        let mut first_error = None;
        let mut succeeded = 0;

        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(page) => {
                    succeeded += 1;
                    has_more |= page.has_more;
                    next_page = match (next_page, page.next_page) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    pois.extend(page.pois);
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "POI source failed, omitting");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if succeeded == 0 {
            if let Some(error) = first_error {
                if is_current() {
                    self.store.set_nearby_error(error.to_string());
                }
                return Err(error);
            }
        }

        let page = PoiPage {
            pois: dedupe_pois(pois),
            has_more,
            next_page,
        };
        self.cache.set(key, page.clone(), None);

        if is_current() {
            self.store.set_nearby_pois(page.pois.clone());
        } else {
            tracing::debug!("Superseded POI lookup, not publishing");
        }
        Ok(page)
    }

    /// Free-text place search, debounced.
    ///
    /// Returns `None` when a newer search superseded this one. An empty
    /// query clears the search results immediately.
    pub async fn search(
        &self,
        text: &str,
        near: Option<(LatLng, u32)>,
        limit: usize,
    ) -> Option<ProviderResult<Vec<Place>>> {
        let text = text.trim().to_string();
        if text.is_empty() {
            self.search_debouncer.cancel();
            self.store.clear_search();
            return Some(Ok(Vec::new()));
        }

        let Some(geocoder) = self.geocoder.clone() else {
            return Some(Err(ProviderError::config(
                "search",
                "no geocoder configured",
            )));
        };
        let store = Arc::clone(&self.store);

        self.search_debouncer
            .call(move || async move {
                let cancel = CancellationToken::new();
                let result = geocoder.search_places(&text, near, limit, &cancel).await;
                match &result {
                    Ok(places) => store.set_search_results(text.clone(), places.clone()),
                    Err(e) => tracing::warn!(query = %text, error = %e, "Place search failed"),
                }
                result
            })
            .await
    }

    /// Select `place` and fill its popup sections.
    ///
    /// Every place gets an address section when a geocoder is configured;
    /// transit stops also get arrivals and alerts. Sections are fetched
    /// concurrently. Results for a place that has since been deselected are
    /// dropped by the store.
    pub async fn enrich_place(&self, place: Place, cancel: &CancellationToken) {
        let stop_id = place.oba_stop_id().map(str::to_string);

        let mut sections = Vec::new();
        if self.geocoder.is_some() {
            sections.push(SECTION_ADDRESS);
        }
        if stop_id.is_some() && self.transit.is_some() {
            sections.push(SECTION_ARRIVALS);
            sections.push(SECTION_ALERTS);
        }

        let place_id = place.id.clone();
        let position = place.position();
        self.store.select_place(Some(place), &sections);

        let address = async {
            if let Some(geocoder) = &self.geocoder {
                self.run_section(&place_id, SECTION_ADDRESS, async {
                    let result = geocoder.reverse(position, cancel).await?;
                    Ok(result.map(|r| r.display_name))
                })
                .await;
            }
        };

        let arrivals = async {
            if let (Some(transit), Some(stop_id)) = (&self.transit, &stop_id) {
                self.run_section(
                    &place_id,
                    SECTION_ARRIVALS,
                    cancellable(cancel, transit.arrivals(stop_id).fetch()),
                )
                .await;
            }
        };

        let alerts = async {
            if let (Some(transit), Some(stop_id)) = (&self.transit, &stop_id) {
                self.run_section(
                    &place_id,
                    SECTION_ALERTS,
                    cancellable(cancel, transit.situations(stop_id, None)),
                )
                .await;
            }
        };

        tokio::join!(address, arrivals, alerts);
    }

    /// Clear the selected place and its popup.
    pub fn clear_selection(&self) {
        self.store.select_place(None, &[]);
    }

    async fn run_section<T, F>(&self, place_id: &str, section_id: &str, fetch: F)
    where
        T: Serialize,
        F: std::future::Future<Output = ProviderResult<T>>,
    {
        if !self.store.begin_section(place_id, section_id) {
            return;
        }
        match fetch.await {
            Ok(data) => match serde_json::to_value(data) {
                Ok(value) => {
                    self.store.resolve_section(place_id, section_id, value);
                }
                Err(e) => {
                    self.store.reject_section(place_id, section_id, e.to_string());
                }
            },
            Err(ProviderError::Cancelled) => {
                self.store.abandon_section(place_id, section_id);
            }
            Err(e) => {
                tracing::debug!(place_id, section_id, error = %e, "Popup section failed");
                self.store.reject_section(place_id, section_id, e.to_string());
            }
        }
    }
}
