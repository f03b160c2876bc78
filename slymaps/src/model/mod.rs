//! Entity shapes shared by providers, queries and stores.

mod directions;
mod place;
mod popup;
mod route;
mod transit;

pub use directions::{
    GeocodeResult, LegPlace, Route, RouteLeg, RouteStep, TransitItinerary, TransitLeg,
    TransitPlan, TravelMode,
};
pub use place::{dedupe_pois, Place, PoiPage, PoiQuery};
pub use popup::{PopupSection, SectionStatus};
pub use route::{RouteEntity, RoutePatch, RoutePatchError};
pub use transit::{
    ArrivalDeparture, NearbyTransit, ObaRoute, RouteBranch, RouteDetails, RouteSchedule,
    RouteSegment, ScheduleEntry, Situation, StopSchedule, TransitStop, VehiclePosition,
};
