//! Application wiring.
//!
//! [`SlyMapsApp`] owns the shared clock, POI cache, stores and query
//! coordinators, and restores the saved home location at startup.
//!
//! ```text
//! ┌──────────────────────────── SlyMapsApp ────────────────────────────┐
//! │                                                                     │
//! │  TransitQueries ──► OneBusAway (rate limited)                       │
//! │  PlaceQueries ────► Overpass + OneBusAway fan-out ──► TtlCache      │
//! │        │            Nominatim (search, address)                     │
//! │        └──────────► PlaceStore ◄── PreferencesStore (home)          │
//! │  RoutingQueries ──► Mapbox / OTP / OneBusAway ──► RouteStore        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use slymaps::app::SlyMapsApp;
//!
//! let app = SlyMapsApp::from_config(&config)?;
//! let _sub = app.route_store().subscribe(|state| println!("{} routes", state.routes.len()));
//! app.routing().load_transit_route("1_100224", &cancel).await?;
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::{Providers, SlyMapsApp};
pub use config::AppConfig;
pub use error::AppError;
