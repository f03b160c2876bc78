//! Query coordinators.
//!
//! Coordinators bind provider calls to cache keys and freshness policies,
//! and write normalized results into the stores. Each keyed query is a
//! [`QueryHandle`] exposing a [`QueryState`] (data, loading, error) plus
//! `fetch` / `refetch`.
//!
//! | Coordinator | Queries | Policy |
//! |-------------|---------|--------|
//! | [`TransitQueries`] | nearby transit | fresh 5 min, 1 retry |
//! | | route details | cached until invalidated |
//! | | vehicles | polled every 30 s while watched |
//! | | stop / route schedules, situations, arrivals | on demand |
//! | [`PlaceQueries`] | nearby POIs | fan-out, TTL cache |
//! | | search | debounced |
//! | | popup enrichment | per-section state |
//! | [`RoutingQueries`] | directions, transit plans, transit routes | written to the route store |
//!
//! Every fetch bumps a per-query generation. A result that arrives after a
//! newer fetch started is dropped, and dropping a handle cancels its
//! in-flight request and stops polling.

mod cache;
mod handle;
mod places;
mod policy;
mod routing;
mod state;
mod transit;

pub use cache::{CachedQuery, QueryCache};
pub use handle::{Fetcher, QueryHandle};
pub use places::{
    PlaceQueries, DEFAULT_SEARCH_DEBOUNCE, SECTION_ADDRESS, SECTION_ALERTS, SECTION_ARRIVALS,
};
pub use policy::{QueryPolicy, RetryPolicy};
pub use routing::{PlannedTrip, RoutingError, RoutingQueries, RoutingResult, VehicleFollow};
pub use state::{QueryState, QueryStatus};
pub use transit::TransitQueries;

#[cfg(test)]
pub(crate) use transit::tests::FakeTransit;

/// Default capacity of each per-feature query cache.
pub const DEFAULT_QUERY_CACHE_CAPACITY: u64 = 500;
