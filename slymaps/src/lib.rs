//! SlyMaps - route and transit data orchestration
//!
//! This library gathers transit, routing and place data from OneBusAway,
//! OpenTripPlanner, Mapbox Directions, Overpass and Nominatim, normalizes it,
//! caches it, and keeps it in observable stores that a map front end (or the
//! `slymaps` CLI) renders.
//!
//! Start with [`app::SlyMapsApp`], which wires the providers, caches, query
//! coordinators and stores together.

pub mod app;
pub mod cache;
pub mod clock;
pub mod config;
pub mod geo;
pub mod logging;
pub mod model;
pub mod provider;
pub mod query;
pub mod rate_limit;
pub mod store;
