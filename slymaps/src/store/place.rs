//! Nearby POIs, search results, selection and popup sections.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::model::{Place, PopupSection, SectionStatus};

use super::observable::{Observable, Subscription};
use super::persist::HomeLocation;

/// Snapshot of the place store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceState {
    pub nearby_pois: Vec<Place>,
    pub is_loading_nearby: bool,
    pub nearby_error: Option<String>,
    pub search_query: Option<String>,
    pub search_results: Vec<Place>,
    pub selected_place: Option<Place>,
    /// Sections of the selected place's popup, by section id.
    pub popup_sections: BTreeMap<String, PopupSection>,
    pub home: Option<HomeLocation>,
}

impl PlaceState {
    fn is_selected(&self, place_id: &str) -> bool {
        self.selected_place
            .as_ref()
            .is_some_and(|place| place.id == place_id)
    }
}

/// Observable store for everything place-related.
///
/// Popup section updates name the place they belong to. An update for a
/// place that is no longer selected is dropped, so a slow fetch cannot
/// write into the popup of a newer selection.
pub struct PlaceStore {
    inner: Observable<PlaceState>,
    clock: SharedClock,
}

impl PlaceStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Observable::new(PlaceState::default()),
            clock,
        }
    }

    pub fn state(&self) -> Arc<PlaceState> {
        self.inner.state()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlaceState) + Send + Sync + 'static,
    {
        self.inner.subscribe(listener)
    }

    pub fn set_loading_nearby(&self, loading: bool) {
        self.inner.update(|state| state.is_loading_nearby = loading);
    }

    pub fn set_nearby_pois(&self, pois: Vec<Place>) {
        self.inner.update(|state| {
            state.nearby_pois = pois;
            state.is_loading_nearby = false;
            state.nearby_error = None;
        });
    }

    pub fn set_nearby_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.inner.update(|state| {
            state.nearby_error = Some(error);
            state.is_loading_nearby = false;
        });
    }

    pub fn set_search_results(&self, query: impl Into<String>, results: Vec<Place>) {
        let query = query.into();
        self.inner.update(|state| {
            state.search_query = Some(query);
            state.search_results = results;
        });
    }

    pub fn clear_search(&self) {
        self.inner.update(|state| {
            state.search_query = None;
            state.search_results.clear();
        });
    }

    /// Select a place, or clear the selection with `None`.
    ///
    /// Always drops every popup section; for a new selection, each of
    /// `section_ids` starts out idle.
    pub fn select_place(&self, place: Option<Place>, section_ids: &[&str]) {
        self.inner.update(|state| {
            state.popup_sections.clear();
            if place.is_some() {
                for id in section_ids {
                    state
                        .popup_sections
                        .insert((*id).to_string(), PopupSection::idle(*id));
                }
            }
            state.selected_place = place;
        });
    }

    pub fn selected_place(&self) -> Option<Place> {
        self.inner.state().selected_place.clone()
    }

    pub fn section(&self, section_id: &str) -> Option<PopupSection> {
        self.inner.state().popup_sections.get(section_id).cloned()
    }

    /// Mark a section as loading. Returns false if `place_id` is no longer
    /// selected.
    pub fn begin_section(&self, place_id: &str, section_id: &str) -> bool {
        self.update_section(place_id, section_id, |section, _| {
            section.status = SectionStatus::Loading;
            section.error = None;
        })
    }

    pub fn resolve_section(
        &self,
        place_id: &str,
        section_id: &str,
        data: serde_json::Value,
    ) -> bool {
        self.update_section(place_id, section_id, |section, now| {
            section.status = SectionStatus::Success;
            section.data = Some(data);
            section.error = None;
            section.last_fetched = Some(now);
        })
    }

    pub fn reject_section(
        &self,
        place_id: &str,
        section_id: &str,
        error: impl Into<String>,
    ) -> bool {
        let error = error.into();
        self.update_section(place_id, section_id, |section, now| {
            section.status = SectionStatus::Error;
            section.error = Some(error);
            section.last_fetched = Some(now);
        })
    }

    /// Return a loading section to `Idle` when its fetch was cancelled.
    /// Data from an earlier fetch is kept.
    pub fn abandon_section(&self, place_id: &str, section_id: &str) -> bool {
        self.update_section(place_id, section_id, |section, _| {
            if section.status == SectionStatus::Loading {
                section.status = SectionStatus::Idle;
            }
        })
    }

    fn update_section(
        &self,
        place_id: &str,
        section_id: &str,
        f: impl FnOnce(&mut PopupSection, i64),
    ) -> bool {
        let now = self.clock.now_ms();
        let applied = self
            .inner
            .try_update(|state| {
                if !state.is_selected(place_id) {
                    return Err(());
                }
                let section = state
                    .popup_sections
                    .entry(section_id.to_string())
                    .or_insert_with(|| PopupSection::idle(section_id));
                f(section, now);
                Ok(())
            })
            .is_ok();

        if !applied {
            tracing::debug!(place_id, section_id, "Dropped popup update for deselected place");
        }
        applied
    }

    pub fn set_home(&self, home: Option<HomeLocation>) {
        self.inner.update(|state| state.home = home);
    }

    pub fn home(&self) -> Option<HomeLocation> {
        self.inner.state().home.clone()
    }
}
