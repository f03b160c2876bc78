//! Route entities, the active selection, and navigation endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::clock::{EpochMillis, SharedClock};
use crate::geo::LatLng;
use crate::model::{RouteEntity, RoutePatch, RoutePatchError};

use super::observable::{Observable, Subscription};

/// Snapshot of the route store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteState {
    pub routes: HashMap<String, Arc<RouteEntity>>,
    pub active_route_id: Option<String>,
    pub start: Option<LatLng>,
    pub end: Option<LatLng>,
}

impl RouteState {
    pub fn active_route(&self) -> Option<&Arc<RouteEntity>> {
        self.active_route_id
            .as_ref()
            .and_then(|id| self.routes.get(id))
    }

    fn set_active(&mut self, id: Option<&str>, now: EpochMillis) {
        if let Some(previous) = self.active_route_id.take() {
            if let Some(route) = self.routes.get_mut(&previous) {
                Arc::make_mut(route).is_active = false;
            }
        }
        if let Some(id) = id {
            if let Some(route) = self.routes.get_mut(id) {
                let route = Arc::make_mut(route);
                route.is_active = true;
                route.last_accessed = now;
                self.active_route_id = Some(id.to_string());
            }
        }
    }

    /// Bring `active_route_id` in line with a route's `is_active` flag after
    /// a patch touched it.
    fn sync_active(&mut self, id: &str, now: EpochMillis) {
        let Some(route) = self.routes.get(id) else {
            return;
        };
        let is_current = self.active_route_id.as_deref() == Some(id);
        if route.is_active && !is_current {
            self.set_active(Some(id), now);
        } else if !route.is_active && is_current {
            self.active_route_id = None;
        }
    }
}

/// Input to [`RouteStore::add_route`].
#[derive(Debug, Clone, Default)]
pub struct RouteDraft {
    /// Caller-chosen id. Generated when absent.
    pub id: Option<String>,
    pub patch: RoutePatch,
}

impl RouteDraft {
    pub fn new(patch: RoutePatch) -> Self {
        Self { id: None, patch }
    }

    pub fn with_id(id: impl Into<String>, patch: RoutePatch) -> Self {
        Self {
            id: Some(id.into()),
            patch,
        }
    }
}

/// Generate a store-local route id: `route_<ms>_<9 lowercase alphanumerics>`.
pub fn generate_route_id(now: EpochMillis) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|byte| (byte as char).to_ascii_lowercase())
        .collect();
    format!("route_{}_{}", now, suffix)
}

/// Central store of route entities.
///
/// Every mutation is one atomic snapshot swap: a reader never sees the
/// table, the selection and the coordinates out of step.
pub struct RouteStore {
    inner: Observable<RouteState>,
    clock: SharedClock,
}

impl RouteStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: Observable::new(RouteState::default()),
            clock,
        }
    }

    pub fn state(&self) -> Arc<RouteState> {
        self.inner.state()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RouteState) + Send + Sync + 'static,
    {
        self.inner.subscribe(listener)
    }

    /// Insert a route and return its id.
    ///
    /// An existing route with the same caller id is replaced.
    pub fn add_route(&self, draft: RouteDraft) -> Result<String, RoutePatchError> {
        let now = self.clock.now_ms();
        let id = draft.id.unwrap_or_else(|| generate_route_id(now));

        let mut entity = RouteEntity::new(id.clone(), now);
        draft.patch.validate(&entity)?;
        draft.patch.apply(&mut entity);

        self.inner.update(|state| {
            if state.routes.contains_key(&id) && state.active_route_id.as_deref() == Some(&id) {
                state.active_route_id = None;
            }
            state.routes.insert(id.clone(), Arc::new(entity));
            state.sync_active(&id, now);
        });

        tracing::debug!(route_id = %id, "Route added");
        Ok(id)
    }

    pub fn get_route(&self, id: &str) -> Option<Arc<RouteEntity>> {
        self.inner.state().routes.get(id).cloned()
    }

    /// Merge `patch` into a route. Returns `Ok(false)` for an unknown id.
    pub fn update_route(&self, id: &str, patch: RoutePatch) -> Result<bool, RoutePatchError> {
        let now = self.clock.now_ms();
        let result = self.inner.try_update(|state| {
            let Some(route) = state.routes.get_mut(id) else {
                return Err(None);
            };
            patch.validate(route).map_err(Some)?;
            let route = Arc::make_mut(route);
            patch.apply(route);
            route.last_accessed = now;
            state.sync_active(id, now);
            Ok(())
        });

        match result {
            Ok(()) => Ok(true),
            Err(None) => Ok(false),
            Err(Some(err)) => Err(err),
        }
    }

    /// Remove a route; clears the selection when it was active.
    pub fn delete_route(&self, id: &str) -> bool {
        let removed = self.inner.update(|state| {
            let removed = state.routes.remove(id).is_some();
            if state.active_route_id.as_deref() == Some(id) {
                state.active_route_id = None;
            }
            removed
        });
        if removed {
            tracing::debug!(route_id = %id, "Route deleted");
        }
        removed
    }

    /// Make `id` the active route, or clear the selection with `None`.
    ///
    /// Returns false when `id` is unknown; the selection is left as is.
    pub fn select_route(&self, id: Option<&str>) -> bool {
        let now = self.clock.now_ms();
        self.inner.update(|state| match id {
            Some(id) if !state.routes.contains_key(id) => false,
            _ => {
                state.set_active(id, now);
                true
            }
        })
    }

    pub fn active_route_id(&self) -> Option<String> {
        self.inner.state().active_route_id.clone()
    }

    pub fn active_route(&self) -> Option<Arc<RouteEntity>> {
        self.inner.state().active_route().cloned()
    }

    pub fn set_route_coordinates(&self, start: Option<LatLng>, end: Option<LatLng>) {
        self.inner.update(|state| {
            state.start = start;
            state.end = end;
        });
    }

    pub fn route_coordinates(&self) -> (Option<LatLng>, Option<LatLng>) {
        let state = self.inner.state();
        (state.start, state.end)
    }

    /// Drop every route, the selection and the coordinates in one step.
    pub fn clear_all_routes(&self) {
        self.inner.update(|state| *state = RouteState::default());
        tracing::debug!("All routes cleared");
    }

    pub fn set_loading(&self, id: &str, loading: bool) -> bool {
        self.inner.update(|state| match state.routes.get_mut(id) {
            Some(route) => {
                Arc::make_mut(route).is_loading = loading;
                true
            }
            None => false,
        })
    }

    /// Routes ordered least recently accessed first.
    pub fn routes_by_lru(&self) -> Vec<Arc<RouteEntity>> {
        let mut routes: Vec<_> = self.inner.state().routes.values().cloned().collect();
        routes.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then_with(|| a.id.cmp(&b.id))
        });
        routes
    }

    /// Evict least recently accessed routes until at most `keep` remain.
    /// The active route is never evicted. Returns the evicted ids.
    pub fn evict_lru(&self, keep: usize) -> Vec<String> {
        let evicted = self.inner.update(|state| {
            let excess = state.routes.len().saturating_sub(keep);
            if excess == 0 {
                return Vec::new();
            }

            let mut candidates: Vec<(EpochMillis, String)> = state
                .routes
                .values()
                .filter(|route| state.active_route_id.as_deref() != Some(route.id.as_str()))
                .map(|route| (route.last_accessed, route.id.clone()))
                .collect();
            candidates.sort();

            let evicted: Vec<String> = candidates
                .into_iter()
                .take(excess)
                .map(|(_, id)| id)
                .collect();
            for id in &evicted {
                state.routes.remove(id);
            }
            evicted
        });

        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "Evicted least recently used routes");
        }
        evicted
    }

    pub fn route_count(&self) -> usize {
        self.inner.state().routes.len()
    }
}
