//! Observable application state.
//!
//! Stores own the normalized entities that queries write into and that
//! consumers render. Each store publishes immutable snapshots; consumers
//! either read [`state()`](RouteStore::state) on demand or register a
//! listener with `subscribe`.
//!
//! | Store | Holds |
//! |-------|-------|
//! | [`RouteStore`] | Route entities, active route, navigation endpoints |
//! | [`PlaceStore`] | Nearby POIs, search results, selection, popup sections, home |
//! | [`PreferencesStore`] | Persisted home location |

mod observable;
mod persist;
mod place;
mod route;

pub use observable::{Observable, Subscription};
pub use persist::{HomeLocation, PersistError, Preferences, PreferencesStore};
pub use place::{PlaceState, PlaceStore};
pub use route::{generate_route_id, RouteDraft, RouteState, RouteStore};
