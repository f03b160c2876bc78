//! Route entities and typed merge patches.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::EpochMillis;
use crate::model::directions::Route;
use crate::model::transit::{
    ObaRoute, RouteBranch, RouteSegment, ScheduleEntry, TransitStop, VehiclePosition,
};

/// One planned or displayed route.
///
/// A route may carry transit data (`oba_route` and the shape fields), a
/// turn-by-turn `mapbox_route`, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntity {
    pub id: String,
    pub created_at: EpochMillis,
    pub last_accessed: EpochMillis,
    pub oba_route: Option<ObaRoute>,
    pub segments: Option<Vec<RouteSegment>>,
    pub branches: Option<Vec<RouteBranch>>,
    pub stops_by_segment: Option<Vec<Vec<TransitStop>>>,
    /// First segment.
    pub geometry: Option<RouteSegment>,
    pub vehicles: Option<Vec<VehiclePosition>>,
    pub selected_segment_index: Option<usize>,
    /// All stops across segments, in segment order.
    pub stops: Option<Vec<TransitStop>>,
    pub schedule: Option<Vec<ScheduleEntry>>,
    pub mapbox_route: Option<Route>,
    pub is_active: bool,
    pub is_loading: bool,
}

impl RouteEntity {
    pub(crate) fn new(id: String, now: EpochMillis) -> Self {
        Self {
            id,
            created_at: now,
            last_accessed: now,
            oba_route: None,
            segments: None,
            branches: None,
            stops_by_segment: None,
            geometry: None,
            vehicles: None,
            selected_segment_index: None,
            stops: None,
            schedule: None,
            mapbox_route: None,
            is_active: false,
            is_loading: false,
        }
    }

    /// Segment currently displayed, falling back to the first one.
    pub fn selected_segment(&self) -> Option<&RouteSegment> {
        let segments = self.segments.as_ref()?;
        segments.get(self.selected_segment_index.unwrap_or(0))
    }

    /// Stops of the displayed segment.
    pub fn selected_stops(&self) -> Option<&[TransitStop]> {
        let stops = self.stops_by_segment.as_ref()?;
        stops
            .get(self.selected_segment_index.unwrap_or(0))
            .map(Vec::as_slice)
    }
}

/// Reasons a [`RoutePatch`] is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutePatchError {
    #[error("segment index {index} out of range ({available} segments)")]
    SegmentOutOfRange { index: usize, available: usize },

    #[error("stops_by_segment has {stops} groups but route has {segments} segments")]
    MismatchedSegments { segments: usize, stops: usize },

    #[error("transit route metadata is immutable once set ({existing} → {incoming})")]
    ObaRouteImmutable { existing: String, incoming: String },
}

/// Shallow field-wise update for a [`RouteEntity`].
///
/// `None` fields leave the entity untouched. Collections are replaced, not
/// merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePatch {
    pub oba_route: Option<ObaRoute>,
    pub segments: Option<Vec<RouteSegment>>,
    pub branches: Option<Vec<RouteBranch>>,
    pub stops_by_segment: Option<Vec<Vec<TransitStop>>>,
    pub vehicles: Option<Vec<VehiclePosition>>,
    pub selected_segment_index: Option<usize>,
    /// Drop the selected segment. Ignored when `selected_segment_index` is set.
    pub clear_selected_segment: bool,
    pub stops: Option<Vec<TransitStop>>,
    pub schedule: Option<Vec<ScheduleEntry>>,
    pub mapbox_route: Option<Route>,
    pub is_active: Option<bool>,
    pub is_loading: Option<bool>,
}

impl RoutePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn oba_route(mut self, route: ObaRoute) -> Self {
        self.oba_route = Some(route);
        self
    }

    pub fn segments(mut self, segments: Vec<RouteSegment>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn branches(mut self, branches: Vec<RouteBranch>) -> Self {
        self.branches = Some(branches);
        self
    }

    pub fn stops_by_segment(mut self, stops: Vec<Vec<TransitStop>>) -> Self {
        self.stops_by_segment = Some(stops);
        self
    }

    pub fn vehicles(mut self, vehicles: Vec<VehiclePosition>) -> Self {
        self.vehicles = Some(vehicles);
        self
    }

    pub fn selected_segment_index(mut self, index: usize) -> Self {
        self.selected_segment_index = Some(index);
        self
    }

    pub fn clear_selected_segment(mut self) -> Self {
        self.clear_selected_segment = true;
        self
    }

    pub fn stops(mut self, stops: Vec<TransitStop>) -> Self {
        self.stops = Some(stops);
        self
    }

    pub fn schedule(mut self, schedule: Vec<ScheduleEntry>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn mapbox_route(mut self, route: Route) -> Self {
        self.mapbox_route = Some(route);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }

    pub fn loading(mut self, loading: bool) -> Self {
        self.is_loading = Some(loading);
        self
    }

    /// Check the patch against the entity it will be merged into.
    pub fn validate(&self, target: &RouteEntity) -> Result<(), RoutePatchError> {
        if let (Some(existing), Some(incoming)) = (&target.oba_route, &self.oba_route) {
            if existing.id != incoming.id {
                return Err(RoutePatchError::ObaRouteImmutable {
                    existing: existing.id.clone(),
                    incoming: incoming.id.clone(),
                });
            }
        }

        let segment_count = self
            .segments
            .as_ref()
            .or(target.segments.as_ref())
            .map(Vec::len);

        if let (Some(segments), Some(stops)) = (self.segments.as_ref(), &self.stops_by_segment) {
            if segments.len() != stops.len() {
                return Err(RoutePatchError::MismatchedSegments {
                    segments: segments.len(),
                    stops: stops.len(),
                });
            }
        }

        let index = match self.selected_segment_index {
            Some(index) => Some(index),
            None if self.clear_selected_segment => None,
            None if self.segments.is_some() => target.selected_segment_index,
            None => None,
        };
        if let Some(index) = index {
            let available = segment_count.unwrap_or(0);
            if index >= available {
                return Err(RoutePatchError::SegmentOutOfRange { index, available });
            }
        }

        Ok(())
    }

    /// Merge into `target`. Call [`RoutePatch::validate`] first.
    ///
    /// Keeps the derived views in step: `geometry` follows the first
    /// segment, and `stops` is flattened from `stops_by_segment` unless the
    /// patch sets it explicitly.
    pub(crate) fn apply(self, target: &mut RouteEntity) {
        if self.oba_route.is_some() && target.oba_route.is_none() {
            target.oba_route = self.oba_route;
        }
        if let Some(segments) = self.segments {
            target.geometry = segments.first().cloned();
            target.segments = Some(segments);
        }
        if let Some(branches) = self.branches {
            target.branches = Some(branches);
        }
        if let Some(stops_by_segment) = self.stops_by_segment {
            if self.stops.is_none() {
                target.stops = Some(stops_by_segment.iter().flatten().cloned().collect());
            }
            target.stops_by_segment = Some(stops_by_segment);
        }
        if let Some(vehicles) = self.vehicles {
            target.vehicles = Some(vehicles);
        }
        if let Some(index) = self.selected_segment_index {
            target.selected_segment_index = Some(index);
        } else if self.clear_selected_segment {
            target.selected_segment_index = None;
        }
        if let Some(stops) = self.stops {
            target.stops = Some(stops);
        }
        if let Some(schedule) = self.schedule {
            target.schedule = Some(schedule);
        }
        if let Some(route) = self.mapbox_route {
            target.mapbox_route = Some(route);
        }
        if let Some(active) = self.is_active {
            target.is_active = active;
        }
        if let Some(loading) = self.is_loading {
            target.is_loading = loading;
        }
    }
}
