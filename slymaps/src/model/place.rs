//! Place / point-of-interest records.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// A point of interest from any provider.
///
/// Ids are provider-namespaced (`overpass-node-123`, `oba-1_75403`,
/// `nominatim-456`) so lists from different providers can be merged and
/// deduplicated without collisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Backed by a OneBusAway stop.
    #[serde(default)]
    pub is_oba_stop: bool,
    /// Sourced from OpenStreetMap data rather than a transit feed.
    #[serde(default)]
    pub is_native_poi: bool,
    /// Source-specific tags (OSM tags, OBA stop code, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Place {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        position: LatLng,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            latitude: position.lat,
            longitude: position.lng,
            description: None,
            address: None,
            is_oba_stop: false,
            is_native_poi: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    /// The provider-local id for OneBusAway stops (`oba-1_123` → `1_123`).
    pub fn oba_stop_id(&self) -> Option<&str> {
        if self.is_oba_stop {
            self.id.strip_prefix("oba-")
        } else {
            None
        }
    }
}

/// Parameters for a nearby-POI lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiQuery {
    pub center: LatLng,
    /// Search radius in meters.
    pub radius_m: u32,
    /// Category filter (`restaurant`, `cafe`, `park`, ...). `None` means any.
    pub category: Option<String>,
    /// Zero-based page.
    pub page: u32,
}

impl PoiQuery {
    pub fn new(center: LatLng, radius_m: u32) -> Self {
        Self {
            center,
            radius_m,
            category: None,
            page: 0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Stringified parameter set used as the POI cache key.
    ///
    /// Two structurally equal queries share a cache entry regardless of the
    /// call site that issued them.
    pub fn cache_key(&self) -> String {
        format!(
            "pois:{:.5}:{:.5}:{}:{}:{}",
            self.center.lat,
            self.center.lng,
            self.radius_m,
            self.category.as_deref().unwrap_or("*"),
            self.page
        )
    }
}

/// One page of POI results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoiPage {
    pub pois: Vec<Place>,
    pub has_more: bool,
    pub next_page: Option<u32>,
}

impl PoiPage {
    pub fn complete(pois: Vec<Place>) -> Self {
        Self {
            pois,
            has_more: false,
            next_page: None,
        }
    }
}

/// Deduplicate places by id, keeping the first occurrence.
pub fn dedupe_pois<I>(places: I) -> Vec<Place>
where
    I: IntoIterator<Item = Place>,
{
    let mut seen = HashSet::new();
    places
        .into_iter()
        .filter(|place| seen.insert(place.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, name: &str) -> Place {
        Place::new(id, name, "cafe", LatLng::new(47.6, -122.3))
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let first = vec![place("a", "first a"), place("b", "b")];
        let second = vec![place("a", "second a"), place("c", "c")];

        let merged = dedupe_pois(first.into_iter().chain(second));

        let ids: Vec<_> = merged.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[0].name, "first a");
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_pois(Vec::new()).is_empty());
    }

    #[test]
    fn test_cache_key_distinguishes_parameters() {
        let base = PoiQuery::new(LatLng::new(47.6, -122.3), 500);
        assert_ne!(base.cache_key(), base.clone().with_category("cafe").cache_key());
        assert_ne!(base.cache_key(), base.clone().with_page(1).cache_key());
        assert_eq!(base.cache_key(), base.clone().cache_key());
    }

    #[test]
    fn test_oba_stop_id() {
        let mut stop = place("oba-1_75403", "Pine St");
        assert_eq!(stop.oba_stop_id(), None);
        stop.is_oba_stop = true;
        assert_eq!(stop.oba_stop_id(), Some("1_75403"));
    }
}
