//! Directions, transit plans and transit routes written into the route store.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::geo::LatLng;
use crate::model::{RouteEntity, RoutePatch, RoutePatchError, TransitPlan, TravelMode, VehiclePosition};
use crate::provider::{cancellable, DirectionsApi, ProviderError, TripPlanner, TripRequest};
use crate::store::{RouteDraft, RouteStore};

use super::handle::QueryHandle;
use super::transit::TransitQueries;

/// Errors from routing operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("route update rejected: {0}")]
    Patch(#[from] RoutePatchError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;

/// A transit plan and the route entity created for its best itinerary.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTrip {
    pub plan: TransitPlan,
    /// `None` when the planner found no itinerary.
    pub route_id: Option<String>,
}

/// Query coordinator that turns provider routes into route entities.
pub struct RoutingQueries {
    directions: Option<Arc<dyn DirectionsApi>>,
    planner: Option<Arc<dyn TripPlanner>>,
    transit: Option<Arc<TransitQueries>>,
    store: Arc<RouteStore>,
}

impl RoutingQueries {
    pub fn new(store: Arc<RouteStore>) -> Self {
        Self {
            directions: None,
            planner: None,
            transit: None,
            store,
        }
    }

    pub fn with_directions(mut self, directions: Arc<dyn DirectionsApi>) -> Self {
        self.directions = Some(directions);
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn TripPlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_transit(mut self, transit: Arc<TransitQueries>) -> Self {
        self.transit = Some(transit);
        self
    }

    pub fn store(&self) -> &Arc<RouteStore> {
        &self.store
    }

    /// Turn-by-turn directions, stored as the active route.
    pub async fn directions(
        &self,
        start: LatLng,
        end: LatLng,
        mode: TravelMode,
        cancel: &CancellationToken,
    ) -> RoutingResult<String> {
        let api = self
            .directions
            .as_ref()
            .ok_or_else(|| ProviderError::config("directions", "no directions provider configured"))?;

        self.store.set_route_coordinates(Some(start), Some(end));
        let route = api.get_directions(start, end, mode, cancel).await?;
        tracing::info!(
            route_id = %route.id,
            mode = %route.mode,
            distance_m = route.distance,
            "Directions loaded"
        );

        let id = route.id.clone();
        let id = self.store.add_route(RouteDraft::with_id(
            id,
            RoutePatch::new().mapbox_route(route).active(true),
        ))?;
        Ok(id)
    }

    /// Plan a transit trip; the first itinerary becomes the active route.
    pub async fn plan_transit(
        &self,
        request: &TripRequest,
        cancel: &CancellationToken,
    ) -> RoutingResult<PlannedTrip> {
        let planner = self
            .planner
            .as_ref()
            .ok_or_else(|| ProviderError::config("otp", "no trip planner configured"))?;

        self.store
            .set_route_coordinates(Some(request.from), Some(request.to));
        let plan = planner.plan_transit(request, cancel).await?;

        let Some(best) = plan.itineraries.first() else {
            tracing::info!("Trip planner returned no itineraries");
            return Ok(PlannedTrip {
                plan,
                route_id: None,
            });
        };

        let route = best.to_route(request.from, request.to);
        tracing::info!(
            route_id = %route.id,
            itineraries = plan.itineraries.len(),
            summary = %best.summary(),
            "Transit plan loaded"
        );
        let route_id = self.store.add_route(RouteDraft::with_id(
            route.id.clone(),
            RoutePatch::new().mapbox_route(route).active(true),
        ))?;

        Ok(PlannedTrip {
            plan,
            route_id: Some(route_id),
        })
    }

    /// Load a OneBusAway route into the store and make it active.
    ///
    /// The entity is keyed by the OneBusAway route id. Shape and stops come
    /// from the route details query; a vehicle snapshot is added when
    /// available, and a vehicle failure does not fail the load. A selected
    /// segment survives a reload while it is still in range.
    pub async fn load_transit_route(
        &self,
        route_id: &str,
        cancel: &CancellationToken,
    ) -> RoutingResult<Arc<RouteEntity>> {
        let transit = self.require_transit()?;

        if !self.store.set_loading(route_id, true) {
            self.store.add_route(RouteDraft::with_id(
                route_id,
                RoutePatch::new().loading(true),
            ))?;
        }

        let details = match cancellable(cancel, transit.route_details(route_id).fetch()).await {
            Ok(details) => details,
            Err(e) => {
                self.store.set_loading(route_id, false);
                return Err(e.into());
            }
        };

        let available = details.segments.len();
        let previous = self
            .store
            .get_route(route_id)
            .and_then(|route| route.selected_segment_index);
        let mut patch = RoutePatch::new()
            .oba_route(details.route)
            .branches(details.branches)
            .stops_by_segment(details.stops_by_segment)
            .segments(details.segments);
        patch = match previous {
            Some(index) if index < available => patch.selected_segment_index(index),
            _ if available > 0 => patch.selected_segment_index(0),
            _ => patch.clear_selected_segment(),
        };

        if let Err(e) = self.store.update_route(route_id, patch) {
            self.store.set_loading(route_id, false);
            return Err(e.into());
        }

        let vehicles_watch = transit.watch_vehicles(route_id);
        let mut finish = RoutePatch::new().loading(false);
        match cancellable(cancel, vehicles_watch.fetch()).await {
            Ok(vehicles) => finish = finish.vehicles(vehicles),
            Err(e) => {
                tracing::warn!(route_id, error = %e, "Vehicle positions unavailable");
            }
        }
        drop(vehicles_watch);

        self.store.update_route(route_id, finish)?;
        self.store.select_route(Some(route_id));

        let entity = self
            .store
            .get_route(route_id)
            .ok_or_else(|| ProviderError::NotFound(format!("route {} was removed", route_id)))?;
        tracing::info!(
            route_id,
            segments = entity.segments.as_ref().map_or(0, Vec::len),
            vehicles = entity.vehicles.as_ref().map_or(0, Vec::len),
            "Transit route loaded"
        );
        Ok(entity)
    }

    /// Keep a stored route's vehicles in step with the 30-second vehicle
    /// poll until the returned guard is dropped.
    pub fn follow_vehicles(&self, route_id: &str) -> RoutingResult<VehicleFollow> {
        let transit = self.require_transit()?;
        let handle = transit.watch_vehicles(route_id);
        let mut updates = handle.subscribe();
        let store = Arc::clone(&self.store);
        let id = route_id.to_string();

        let task = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let vehicles = updates.borrow_and_update().data.clone();
                if let Some(vehicles) = vehicles {
                    match store.update_route(&id, RoutePatch::new().vehicles(vehicles)) {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!(route_id = %id, "Followed route removed, stopping");
                            break;
                        }
                        Err(e) => tracing::warn!(route_id = %id, error = %e, "Vehicle update rejected"),
                    }
                }
            }
        });

        Ok(VehicleFollow { handle, task })
    }

    fn require_transit(&self) -> RoutingResult<&Arc<TransitQueries>> {
        self.transit
            .as_ref()
            .ok_or_else(|| ProviderError::config("onebusaway", "no transit provider configured").into())
    }
}

/// Live vehicle feed for a stored route. Dropping it stops polling.
pub struct VehicleFollow {
    handle: QueryHandle<Vec<VehiclePosition>>,
    task: JoinHandle<()>,
}

impl VehicleFollow {
    pub fn query(&self) -> &QueryHandle<Vec<VehiclePosition>> {
        &self.handle
    }

    /// Fetch now instead of waiting for the next poll.
    pub async fn refresh(&self) -> RoutingResult<Vec<VehiclePosition>> {
        Ok(self.handle.refetch().await?)
    }
}

impl Drop for VehicleFollow {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::geo::Coordinate;
    use crate::model::{LegPlace, Route, RouteLeg, TransitItinerary, TransitLeg};
    use crate::provider::ProviderResult;
    use crate::query::transit::tests::FakeTransit;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::time::Duration;

    struct FakeDirections;

    impl DirectionsApi for FakeDirections {
        fn get_directions<'a>(
            &'a self,
            start: LatLng,
            end: LatLng,
            mode: TravelMode,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<Route>> {
            async move {
                Ok(Route {
                    id: Route::generate_id(),
                    mode,
                    start,
                    end,
                    geometry: vec![start.to_coordinate(), end.to_coordinate()],
                    distance: 500.0,
                    duration: 400.0,
                    legs: vec![RouteLeg {
                        summary: "Pine St".into(),
                        distance: 500.0,
                        duration: 400.0,
                        steps: vec![],
                    }],
                })
            }
            .boxed()
        }
    }

    struct FakePlanner {
        itineraries: usize,
    }

    impl TripPlanner for FakePlanner {
        fn plan_transit<'a>(
            &'a self,
            request: &'a TripRequest,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<TransitPlan>> {
            let geometry: Vec<Coordinate> =
                vec![request.from.to_coordinate(), request.to.to_coordinate()];
            let leg = TransitLeg {
                mode: "BUS".into(),
                transit_leg: true,
                from: LegPlace {
                    name: "A".into(),
                    position: request.from,
                },
                to: LegPlace {
                    name: "B".into(),
                    position: request.to,
                },
                start_time: 0,
                end_time: 600_000,
                distance: 2_000.0,
                duration: 600.0,
                route_short_name: Some("49".into()),
                route_long_name: None,
                headsign: Some("Downtown".into()),
                agency_name: None,
                geometry: geometry.clone(),
                instruction: "Take bus 49 towards Downtown, get off at B".into(),
            };
            let itinerary = TransitItinerary {
                start_time: 0,
                end_time: 600_000,
                duration: 600.0,
                walk_distance: 0.0,
                transfers: 0,
                legs: vec![leg],
                geometry,
            };
            let itineraries = vec![itinerary; self.itineraries];
            async move { Ok(TransitPlan { itineraries }) }.boxed()
        }
    }

    fn store() -> Arc<RouteStore> {
        Arc::new(RouteStore::new(Arc::new(ManualClock::new(0))))
    }

    fn transit() -> (Arc<TransitQueries>, Arc<FakeTransit>) {
        let api = Arc::new(FakeTransit::default());
        let queries = TransitQueries::new(api.clone(), 10, Arc::new(ManualClock::new(0)));
        (Arc::new(queries), api)
    }

    #[tokio::test]
    async fn test_directions_become_active_route() {
        let routing = RoutingQueries::new(store()).with_directions(Arc::new(FakeDirections));
        let start = LatLng::new(47.61, -122.34);
        let end = LatLng::new(47.62, -122.32);

        let id = routing
            .directions(start, end, TravelMode::Walking, &CancellationToken::new())
            .await
            .unwrap();

        assert!(id.starts_with("route-"));
        let active = routing.store().active_route().unwrap();
        assert_eq!(active.id, id);
        let route = active.mapbox_route.as_ref().unwrap();
        assert_eq!(route.distance, 500.0);
        assert_eq!(route.duration, 400.0);
        assert_eq!(routing.store().route_coordinates(), (Some(start), Some(end)));
    }

    #[tokio::test]
    async fn test_directions_unconfigured() {
        let routing = RoutingQueries::new(store());
        let err = routing
            .directions(
                LatLng::new(0.0, 0.0),
                LatLng::new(1.0, 1.0),
                TravelMode::Driving,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RoutingError::Provider(ProviderError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_plan_transit_stores_best_itinerary() {
        let routing =
            RoutingQueries::new(store()).with_planner(Arc::new(FakePlanner { itineraries: 2 }));
        let request = TripRequest::new(LatLng::new(47.6, -122.3), LatLng::new(47.7, -122.3));

        let trip = routing
            .plan_transit(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(trip.plan.itineraries.len(), 2);
        let route_id = trip.route_id.unwrap();
        let entity = routing.store().get_route(&route_id).unwrap();
        let route = entity.mapbox_route.as_ref().unwrap();
        assert_eq!(route.mode, TravelMode::Transit);
        assert_eq!(route.legs[0].summary, "49");
        assert!(entity.is_active);
    }

    #[tokio::test]
    async fn test_plan_without_itineraries() {
        let routing =
            RoutingQueries::new(store()).with_planner(Arc::new(FakePlanner { itineraries: 0 }));
        let request = TripRequest::new(LatLng::new(0.0, 0.0), LatLng::new(0.1, 0.1));
        let trip = routing
            .plan_transit(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert!(trip.route_id.is_none());
        assert_eq!(routing.store().route_count(), 0);
    }

    #[tokio::test]
    async fn test_load_transit_route() {
        let (transit, api) = transit();
        let routing = RoutingQueries::new(store()).with_transit(transit);

        let entity = routing
            .load_transit_route("1_49", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(entity.id, "1_49");
        assert_eq!(entity.oba_route.as_ref().unwrap().display_name(), "49");
        assert_eq!(entity.segments.as_ref().unwrap().len(), 2);
        assert_eq!(entity.selected_segment_index, Some(0));
        assert_eq!(entity.stops.as_ref().unwrap().len(), 4);
        assert_eq!(entity.vehicles.as_ref().unwrap().len(), 1);
        assert!(entity.geometry.is_some());
        assert!(!entity.is_loading);
        assert!(entity.is_active);
        assert_eq!(routing.store().active_route_id().as_deref(), Some("1_49"));

        // Second load reuses cached details and keeps the same entity.
        routing
            .load_transit_route("1_49", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            api.details_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert_eq!(routing.store().route_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_keeps_valid_segment_selection() {
        let (transit, api) = transit();
        let routing = RoutingQueries::new(store()).with_transit(Arc::clone(&transit));
        let cancel = CancellationToken::new();

        routing.load_transit_route("1_49", &cancel).await.unwrap();
        routing
            .store()
            .update_route("1_49", RoutePatch::new().selected_segment_index(1))
            .unwrap();

        transit.invalidate_route_details(Some("1_49"));
        let entity = routing.load_transit_route("1_49", &cancel).await.unwrap();
        assert_eq!(entity.selected_segment_index, Some(1));

        api.no_shapes.store(true, std::sync::atomic::Ordering::SeqCst);
        transit.invalidate_route_details(Some("1_49"));
        let entity = routing.load_transit_route("1_49", &cancel).await.unwrap();
        assert_eq!(entity.selected_segment_index, None);
        assert!(entity.segments.as_ref().unwrap().is_empty());
        assert!(!entity.is_loading);
    }

    #[tokio::test]
    async fn test_load_transit_route_cancelled() {
        let (transit, _api) = transit();
        let routing = RoutingQueries::new(store()).with_transit(transit);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = routing.load_transit_route("1_49", &cancel).await.unwrap_err();
        assert_eq!(err, RoutingError::Provider(ProviderError::Cancelled));
        assert!(!routing.store().get_route("1_49").unwrap().is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_vehicles_updates_store() {
        let (transit, api) = transit();
        let routing = RoutingQueries::new(store()).with_transit(transit);
        routing
            .load_transit_route("1_49", &CancellationToken::new())
            .await
            .unwrap();

        let follow = routing.follow_vehicles("1_49").unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        let vehicles = routing.store().get_route("1_49").unwrap().vehicles.clone().unwrap();
        assert_eq!(vehicles[0].vehicle_id, "v1");

        drop(follow);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(
            api.vehicle_calls.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }
}
