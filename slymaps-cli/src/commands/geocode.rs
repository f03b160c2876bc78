//! Geocode and search commands - Nominatim lookups.

use slymaps::geo::LatLng;
use slymaps::model::GeocodeResult;
use slymaps::provider::ProviderError;

use super::common::print_place;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the geocode command.
pub struct GeocodeArgs {
    /// Address text, or `lat,lng` with `reverse`.
    pub query: String,
    pub reverse: bool,
    pub limit: usize,
    pub log_level: Option<String>,
}

/// Arguments for the search command.
pub struct SearchArgs {
    pub text: String,
    pub near: Option<LatLng>,
    pub radius: u32,
    pub limit: usize,
    pub log_level: Option<String>,
}

/// Run the geocode command.
pub fn run_geocode(args: GeocodeArgs) -> Result<(), CliError> {
    let position = if args.reverse {
        Some(
            args.query
                .parse::<LatLng>()
                .map_err(|e| CliError::Config(format!("--reverse expects lat,lng: {}", e)))?,
        )
    } else {
        None
    };

    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("geocode");
    let app = runner.create_app()?;
    let geocoder = app
        .geocoder()
        .cloned()
        .ok_or_else(|| ProviderError::config("nominatim", "no geocoder configured"))?;

    runner.run_cancellable(|cancel| async move {
        let results: Vec<GeocodeResult> = match position {
            Some(position) => geocoder.reverse(position, &cancel).await?.into_iter().collect(),
            None => geocoder.geocode(&args.query, args.limit, &cancel).await?,
        };

        if results.is_empty() {
            return Err(CliError::NotFound(format!("address '{}'", args.query)));
        }
        for result in &results {
            print_result(result);
        }
        Ok::<(), CliError>(())
    })
}

/// Run the search command.
pub fn run_search(args: SearchArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("search");
    let app = runner.create_app()?;

    runner.block_on(async move {
        let near = args.near.map(|center| (center, args.radius));
        let places = match app.places().search(&args.text, near, args.limit).await {
            Some(result) => result?,
            None => return Ok(()),
        };

        println!("{} results for '{}'", places.len(), args.text);
        for place in &places {
            print_place(place);
        }
        Ok::<(), CliError>(())
    })
}

fn print_result(result: &GeocodeResult) {
    println!("{}", result.display_name);
    println!("  {}", result.position);
    if let Some(category) = &result.category {
        println!("  {}", category);
    }
    for (key, value) in &result.address {
        println!("    {:<14} {}", key, value);
    }
}
