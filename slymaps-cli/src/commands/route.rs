//! Route command - load a OneBusAway route with its shape, stops and vehicles.

use super::common::{format_time, print_stop};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the route command.
pub struct RouteArgs {
    pub route_id: String,
    /// Print every stop of the selected segment.
    pub stops: bool,
    pub log_level: Option<String>,
}

/// Run the route command.
pub fn run(args: RouteArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("route");
    let app = runner.create_app()?;

    runner.run_cancellable(|cancel| async move {
        let entity = app
            .routing()
            .load_transit_route(&args.route_id, &cancel)
            .await?;

        let name = entity
            .oba_route
            .as_ref()
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| entity.id.clone());
        println!("Route {} ({})", name, entity.id);
        if let Some(route) = &entity.oba_route {
            if let Some(description) = route.description.as_deref().or(route.long_name.as_deref())
            {
                println!("  {}", description);
            }
            if let Some(agency) = &route.agency_name {
                println!("  Agency: {}", agency);
            }
        }

        if let Some(branches) = &entity.branches {
            println!();
            println!("Branches ({})", branches.len());
            for branch in branches {
                println!(
                    "  {:<40} {} stops, {} segments",
                    branch.name,
                    branch.stops.len(),
                    branch.segments.len()
                );
            }
        }

        let segments = entity.segments.as_ref().map_or(0, Vec::len);
        let points: usize = entity
            .segments
            .iter()
            .flatten()
            .map(|s| s.coordinates.len())
            .sum();
        println!();
        println!("Shape: {} segments, {} points", segments, points);

        if args.stops {
            if let Some(stops) = entity.selected_stops() {
                println!();
                println!("Stops on segment {}", entity.selected_segment_index.unwrap_or(0));
                for stop in stops {
                    print_stop(stop);
                }
            }
        }

        match &entity.vehicles {
            Some(vehicles) if !vehicles.is_empty() => {
                println!();
                println!("Vehicles ({})", vehicles.len());
                for v in vehicles {
                    println!(
                        "  {:<12} {}  {}  updated {}",
                        v.vehicle_id,
                        v.position,
                        v.headsign.as_deref().unwrap_or(""),
                        format_time(v.last_update)
                    );
                }
            }
            _ => println!("No vehicles reported"),
        }

        Ok::<(), CliError>(())
    })
}
