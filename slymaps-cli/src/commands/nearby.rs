//! Nearby command - transit stops, routes and places around a point.

use slymaps::geo::LatLng;
use slymaps::model::PoiQuery;
use slymaps::provider::cancellable;

use super::common::{print_place, print_stop};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the nearby command.
pub struct NearbyArgs {
    pub location: LatLng,
    pub radius: u32,
    pub category: Option<String>,
    pub places: bool,
    pub log_level: Option<String>,
}

/// Run the nearby command.
pub fn run(args: NearbyArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("nearby");
    let app = runner.create_app()?;

    runner.run_cancellable(|cancel| async move {
        let handle = app.transit().nearby_transit(args.location, args.radius);
        let nearby = cancellable(&cancel, handle.fetch()).await?;

        println!("Transit within {} m of {}", args.radius, args.location);
        println!();
        println!("Stops ({})", nearby.stops.len());
        for stop in &nearby.stops {
            print_stop(stop);
        }
        println!();
        println!("Routes ({})", nearby.routes.len());
        for route in &nearby.routes {
            println!(
                "  {:<14} {:<8} {}",
                route.id,
                route.display_name(),
                route.agency_name.as_deref().unwrap_or("")
            );
        }

        if args.places {
            let mut query = PoiQuery::new(args.location, args.radius);
            if let Some(category) = &args.category {
                query = query.with_category(category.clone());
            }
            let page = app.places().nearby_pois(&query, &cancel).await?;

            println!();
            println!("Places ({})", page.pois.len());
            for place in &page.pois {
                print_place(place);
            }
            if page.has_more {
                println!("  ... more results available");
            }
        }

        Ok::<(), CliError>(())
    })
}
