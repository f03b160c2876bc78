//! Realtime transit queries.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::clock::SharedClock;
use crate::geo::LatLng;
use crate::model::{
    ArrivalDeparture, NearbyTransit, RouteDetails, RouteSchedule, Situation, StopSchedule,
    VehiclePosition,
};
use crate::provider::{ProviderResult, TransitApi};

use super::cache::QueryCache;
use super::handle::{Fetcher, QueryHandle};
use super::policy::QueryPolicy;

const ROUTE_DETAILS_PREFIX: &str = "route-details:";

fn date_key(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "today".to_string())
}

/// Query coordinator for OneBusAway-backed data.
///
/// Each data kind gets its own [`QueryCache`] and key namespace, so keys
/// never collide across features.
pub struct TransitQueries {
    api: Arc<dyn TransitApi>,
    nearby: Arc<QueryCache<NearbyTransit>>,
    details: Arc<QueryCache<RouteDetails>>,
    vehicles: Arc<QueryCache<Vec<VehiclePosition>>>,
    stop_schedules: Arc<QueryCache<StopSchedule>>,
    route_schedules: Arc<QueryCache<RouteSchedule>>,
    arrivals: Arc<QueryCache<Vec<ArrivalDeparture>>>,
}

impl TransitQueries {
    pub fn new(api: Arc<dyn TransitApi>, capacity: u64, clock: SharedClock) -> Self {
        Self {
            api,
            nearby: Arc::new(QueryCache::new(capacity, Arc::clone(&clock))),
            details: Arc::new(QueryCache::new(capacity, Arc::clone(&clock))),
            vehicles: Arc::new(QueryCache::new(capacity, Arc::clone(&clock))),
            stop_schedules: Arc::new(QueryCache::new(capacity, Arc::clone(&clock))),
            route_schedules: Arc::new(QueryCache::new(capacity, Arc::clone(&clock))),
            arrivals: Arc::new(QueryCache::new(capacity, clock)),
        }
    }

    pub fn api(&self) -> &Arc<dyn TransitApi> {
        &self.api
    }

    /// Stops and routes around `center`. Fresh for five minutes.
    pub fn nearby_transit(&self, center: LatLng, radius_m: u32) -> QueryHandle<NearbyTransit> {
        let api = Arc::clone(&self.api);
        let fetcher: Fetcher<NearbyTransit> = Arc::new(move |cancel: CancellationToken| {
            let api = Arc::clone(&api);
            async move { api.fetch_nearby_transit(center, radius_m, &cancel).await }.boxed()
        });
        QueryHandle::new(
            format!("nearby-transit:{}:{}", center, radius_m),
            fetcher,
            QueryPolicy::nearby_transit(),
            Arc::clone(&self.nearby),
        )
    }

    /// Shape and stops of a route. Cached until invalidated.
    pub fn route_details(&self, route_id: &str) -> QueryHandle<RouteDetails> {
        let api = Arc::clone(&self.api);
        let id = route_id.to_string();
        let fetcher: Fetcher<RouteDetails> = Arc::new(move |cancel: CancellationToken| {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.fetch_route_details(&id, &cancel).await }.boxed()
        });
        QueryHandle::new(
            format!("{}{}", ROUTE_DETAILS_PREFIX, route_id),
            fetcher,
            QueryPolicy::route_details(),
            Arc::clone(&self.details),
        )
    }

    /// Drop cached route details for one route, or all with `None`.
    pub fn invalidate_route_details(&self, route_id: Option<&str>) {
        match route_id {
            Some(id) => self
                .details
                .invalidate(&format!("{}{}", ROUTE_DETAILS_PREFIX, id)),
            None => {
                self.details.invalidate_prefix(ROUTE_DETAILS_PREFIX);
            }
        }
    }

    /// Vehicle positions for a route, refreshed every 30 seconds for as
    /// long as the returned handle lives.
    pub fn watch_vehicles(&self, route_id: &str) -> QueryHandle<Vec<VehiclePosition>> {
        let api = Arc::clone(&self.api);
        let id = route_id.to_string();
        let fetcher: Fetcher<Vec<VehiclePosition>> = Arc::new(move |cancel: CancellationToken| {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.fetch_vehicles_for_route(&id, &cancel).await }.boxed()
        });
        QueryHandle::new(
            format!("vehicles:{}", route_id),
            fetcher,
            QueryPolicy::vehicles(),
            Arc::clone(&self.vehicles),
        )
    }

    pub fn stop_schedule(&self, stop_id: &str, date: Option<NaiveDate>) -> QueryHandle<StopSchedule> {
        let api = Arc::clone(&self.api);
        let id = stop_id.to_string();
        let fetcher: Fetcher<StopSchedule> = Arc::new(move |cancel: CancellationToken| {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.fetch_stop_schedule(&id, date, &cancel).await }.boxed()
        });
        QueryHandle::new(
            format!("stop-schedule:{}:{}", stop_id, date_key(date)),
            fetcher,
            QueryPolicy::on_demand(),
            Arc::clone(&self.stop_schedules),
        )
    }

    pub fn route_schedule(
        &self,
        route_id: &str,
        date: Option<NaiveDate>,
    ) -> QueryHandle<RouteSchedule> {
        let api = Arc::clone(&self.api);
        let id = route_id.to_string();
        let fetcher: Fetcher<RouteSchedule> = Arc::new(move |cancel: CancellationToken| {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.fetch_route_schedule(&id, date, &cancel).await }.boxed()
        });
        QueryHandle::new(
            format!("route-schedule:{}:{}", route_id, date_key(date)),
            fetcher,
            QueryPolicy::on_demand(),
            Arc::clone(&self.route_schedules),
        )
    }

    /// Service alerts for a stop, taken from its schedule response.
    ///
    /// A schedule that referenced no situations yields an empty list.
    pub async fn situations(
        &self,
        stop_id: &str,
        date: Option<NaiveDate>,
    ) -> ProviderResult<Vec<Situation>> {
        let schedule = self.stop_schedule(stop_id, date).fetch().await?;
        Ok(schedule.situations)
    }

    pub fn arrivals(&self, stop_id: &str) -> QueryHandle<Vec<ArrivalDeparture>> {
        let api = Arc::clone(&self.api);
        let id = stop_id.to_string();
        let fetcher: Fetcher<Vec<ArrivalDeparture>> = Arc::new(move |cancel: CancellationToken| {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.fetch_arrivals(&id, &cancel).await }.boxed()
        });
        QueryHandle::new(
            format!("arrivals:{}", stop_id),
            fetcher,
            QueryPolicy::on_demand(),
            Arc::clone(&self.arrivals),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{ObaRoute, RouteSegment, TransitStop};
    use crate::provider::ProviderError;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) fn oba_route(id: &str) -> ObaRoute {
        ObaRoute {
            id: id.into(),
            short_name: Some("49".into()),
            long_name: Some("Broadway".into()),
            description: None,
            agency_id: Some("1".into()),
            agency_name: Some("Metro Transit".into()),
            color: None,
            text_color: None,
            route_type: Some(3),
            url: None,
        }
    }

    pub(crate) fn stop(id: &str) -> TransitStop {
        TransitStop {
            id: id.into(),
            name: format!("Stop {}", id),
            code: None,
            position: LatLng::new(47.61, -122.32),
            direction: None,
            route_ids: vec![],
        }
    }

    pub(crate) fn vehicle(id: &str, route_id: &str) -> VehiclePosition {
        VehiclePosition {
            vehicle_id: id.into(),
            trip_id: None,
            route_id: route_id.into(),
            position: LatLng::new(47.6, -122.3),
            orientation: None,
            headsign: None,
            next_stop_id: None,
            phase: None,
            schedule_deviation_secs: None,
            predicted: true,
            last_update: 0,
        }
    }

    /// In-memory transit API counting calls per operation.
    #[derive(Default)]
    pub(crate) struct FakeTransit {
        pub details_calls: AtomicUsize,
        pub vehicle_calls: AtomicUsize,
        pub nearby_calls: AtomicUsize,
        pub situations: Mutex<Vec<Situation>>,
        pub fail_nearby: Mutex<Option<ProviderError>>,
        /// Serve route details without shapes or stop groupings.
        pub no_shapes: AtomicBool,
    }

    impl TransitApi for FakeTransit {
        fn fetch_nearby_transit<'a>(
            &'a self,
            _center: LatLng,
            _radius_m: u32,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<NearbyTransit>> {
            self.nearby_calls.fetch_add(1, Ordering::SeqCst);
            let failure = self.fail_nearby.lock().clone();
            async move {
                match failure {
                    Some(err) => Err(err),
                    None => Ok(NearbyTransit {
                        stops: vec![stop("1_100")],
                        routes: vec![oba_route("1_49")],
                    }),
                }
            }
            .boxed()
        }

        fn fetch_route<'a>(
            &'a self,
            route_id: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<ObaRoute>> {
            async move { Ok(oba_route(route_id)) }.boxed()
        }

        fn fetch_route_details<'a>(
            &'a self,
            route_id: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<RouteDetails>> {
            self.details_calls.fetch_add(1, Ordering::SeqCst);
            let no_shapes = self.no_shapes.load(Ordering::SeqCst);
            async move {
                if no_shapes {
                    return Ok(RouteDetails {
                        route: oba_route(route_id),
                        branches: vec![],
                        segments: vec![],
                        stops_by_segment: vec![],
                    });
                }
                Ok(RouteDetails {
                    route: oba_route(route_id),
                    branches: vec![],
                    segments: vec![
                        RouteSegment {
                            coordinates: vec![[-122.3, 47.6], [-122.31, 47.61]],
                        },
                        RouteSegment {
                            coordinates: vec![[-122.31, 47.61], [-122.3, 47.6]],
                        },
                    ],
                    stops_by_segment: vec![vec![stop("a"), stop("b")], vec![stop("b"), stop("a")]],
                })
            }
            .boxed()
        }

        fn fetch_vehicles_for_route<'a>(
            &'a self,
            route_id: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<Vec<VehiclePosition>>> {
            let n = self.vehicle_calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(vec![vehicle(&format!("v{}", n), route_id)]) }.boxed()
        }

        fn fetch_route_schedule<'a>(
            &'a self,
            route_id: &'a str,
            _date: Option<NaiveDate>,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<RouteSchedule>> {
            async move {
                Ok(RouteSchedule {
                    route_id: route_id.into(),
                    date: 0,
                    entries: vec![],
                    situations: vec![],
                })
            }
            .boxed()
        }

        fn fetch_stop_schedule<'a>(
            &'a self,
            stop_id: &'a str,
            _date: Option<NaiveDate>,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<StopSchedule>> {
            let situations = self.situations.lock().clone();
            async move {
                Ok(StopSchedule {
                    stop_id: stop_id.into(),
                    date: 0,
                    entries: vec![],
                    situations,
                })
            }
            .boxed()
        }

        fn fetch_arrivals<'a>(
            &'a self,
            stop_id: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, ProviderResult<Vec<ArrivalDeparture>>> {
            async move {
                Ok(vec![ArrivalDeparture {
                    route_id: "1_49".into(),
                    route_short_name: Some("49".into()),
                    trip_id: "t1".into(),
                    trip_headsign: Some("Downtown".into()),
                    stop_id: stop_id.into(),
                    vehicle_id: None,
                    scheduled_arrival: 1_000,
                    predicted_arrival: None,
                    scheduled_departure: 1_000,
                    predicted_departure: None,
                    number_of_stops_away: Some(2),
                }])
            }
            .boxed()
        }
    }

    fn queries() -> (TransitQueries, Arc<FakeTransit>, Arc<ManualClock>) {
        let api = Arc::new(FakeTransit::default());
        let clock = Arc::new(ManualClock::new(0));
        (
            TransitQueries::new(api.clone(), 100, clock.clone()),
            api,
            clock,
        )
    }

    #[tokio::test]
    async fn test_route_details_cached_until_invalidated() {
        let (queries, api, clock) = queries();

        queries.route_details("1_49").fetch().await.unwrap();
        clock.advance(Duration::from_secs(24 * 3600));
        queries.route_details("1_49").fetch().await.unwrap();
        assert_eq!(api.details_calls.load(Ordering::SeqCst), 1);

        queries.invalidate_route_details(Some("1_49"));
        queries.route_details("1_49").fetch().await.unwrap();
        assert_eq!(api.details_calls.load(Ordering::SeqCst), 2);

        queries.route_details("1_8").fetch().await.unwrap();
        queries.invalidate_route_details(None);
        queries.route_details("1_8").fetch().await.unwrap();
        assert_eq!(api.details_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_nearby_transit_freshness() {
        let (queries, api, clock) = queries();
        let center = LatLng::new(47.6, -122.3);

        let handle = queries.nearby_transit(center, 500);
        handle.fetch().await.unwrap();
        clock.advance(Duration::from_secs(60));
        queries.nearby_transit(center, 500).fetch().await.unwrap();
        assert_eq!(api.nearby_calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(300));
        queries.nearby_transit(center, 500).fetch().await.unwrap();
        assert_eq!(api.nearby_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nearby_transit_retries_once() {
        let (queries, api, _clock) = queries();
        *api.fail_nearby.lock() = Some(ProviderError::Network("offline".into()));

        let handle = queries.nearby_transit(LatLng::new(0.0, 0.0), 100);
        assert!(handle.fetch().await.is_err());
        assert_eq!(api.nearby_calls.load(Ordering::SeqCst), 2);
        assert!(handle.state().is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vehicle_watch_polls_until_dropped() {
        let (queries, api, _clock) = queries();

        let watch = queries.watch_vehicles("1_49");
        let first = watch.fetch().await.unwrap();
        assert_eq!(first[0].vehicle_id, "v0");

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(api.vehicle_calls.load(Ordering::SeqCst), 3);
        assert_eq!(watch.state().data.unwrap()[0].vehicle_id, "v2");

        drop(watch);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.vehicle_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_situations_from_schedule() {
        let (queries, api, _clock) = queries();
        assert!(queries.situations("1_100", None).await.unwrap().is_empty());

        api.situations.lock().push(Situation {
            id: "s1".into(),
            summary: Some("Detour".into()),
            description: None,
            severity: None,
            reason: None,
            url: None,
            active_windows: vec![],
            affected_route_ids: vec!["1_49".into()],
            affected_stop_ids: vec![],
        });
        let situations = queries.situations("1_100", None).await.unwrap();
        assert_eq!(situations.len(), 1);
        assert_eq!(situations[0].summary.as_deref(), Some("Detour"));
    }

    #[tokio::test]
    async fn test_schedule_keys_include_date() {
        let (queries, _api, _clock) = queries();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1);
        let handle = queries.route_schedule("1_49", date);
        assert_eq!(handle.key(), "route-schedule:1_49:2024-03-01");
        assert_eq!(queries.stop_schedule("1_1", None).key(), "stop-schedule:1_1:today");
        assert_eq!(handle.fetch().await.unwrap().route_id, "1_49");
    }

    #[tokio::test]
    async fn test_arrivals() {
        let (queries, _api, _clock) = queries();
        let arrivals = queries.arrivals("1_100").fetch().await.unwrap();
        assert_eq!(arrivals[0].stop_id, "1_100");
    }
}
