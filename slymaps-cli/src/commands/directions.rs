//! Directions and plan commands - routes written into the route store.

use slymaps::geo::LatLng;
use slymaps::model::TravelMode;
use slymaps::provider::TripRequest;

use super::common::{format_distance, format_duration, format_time};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the directions command.
pub struct DirectionsArgs {
    pub from: LatLng,
    pub to: LatLng,
    pub mode: TravelMode,
    pub steps: bool,
    pub log_level: Option<String>,
}

/// Arguments for the plan command.
pub struct PlanArgs {
    pub from: LatLng,
    pub to: LatLng,
    pub itineraries: u32,
    pub log_level: Option<String>,
}

/// Run the directions command.
pub fn run_directions(args: DirectionsArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("directions");
    let app = runner.create_app()?;

    runner.run_cancellable(|cancel| async move {
        let route_id = app
            .routing()
            .directions(args.from, args.to, args.mode, &cancel)
            .await?;

        let entity = app
            .route_store()
            .get_route(&route_id)
            .ok_or_else(|| CliError::NotFound(format!("route {}", route_id)))?;
        let Some(route) = &entity.mapbox_route else {
            return Err(CliError::NotFound(format!("geometry for route {}", route_id)));
        };

        println!(
            "{} from {} to {}: {}, {}",
            route.mode,
            route.start,
            route.end,
            format_distance(route.distance),
            format_duration(route.duration)
        );
        if args.steps {
            for leg in &route.legs {
                if !leg.summary.is_empty() {
                    println!();
                    println!("  via {}", leg.summary);
                }
                for step in &leg.steps {
                    println!(
                        "  {:>8}  {}",
                        format_distance(step.distance),
                        step.instruction
                    );
                }
            }
        }
        Ok::<(), CliError>(())
    })
}

/// Run the plan command.
pub fn run_plan(args: PlanArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("plan");
    let app = runner.create_app()?;

    runner.run_cancellable(|cancel| async move {
        let request = TripRequest::new(args.from, args.to).with_itineraries(args.itineraries);
        let trip = app.routing().plan_transit(&request, &cancel).await?;

        if trip.plan.itineraries.is_empty() {
            return Err(CliError::NotFound(format!(
                "transit itinerary from {} to {}",
                args.from, args.to
            )));
        }

        for (i, itinerary) in trip.plan.itineraries.iter().enumerate() {
            println!(
                "Option {}: {} - {} ({}, {} transfers, {} walking)",
                i + 1,
                format_time(itinerary.start_time),
                format_time(itinerary.end_time),
                format_duration(itinerary.duration),
                itinerary.transfers,
                format_distance(itinerary.walk_distance)
            );
            for leg in &itinerary.legs {
                println!("    {}  {}", format_time(leg.start_time), leg.instruction);
            }
            println!();
        }
        if let Some(route_id) = trip.route_id {
            println!("Option 1 is the active route ({})", route_id);
        }
        Ok::<(), CliError>(())
    })
}
