//! SlyMaps CLI - Command-line interface
//!
//! Queries transit, routing and place data through the SlyMaps library and
//! prints what the stores hold.

mod commands;
mod error;
mod runner;

use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use slymaps::geo::LatLng;
use slymaps::model::TravelMode;

use commands::config::ConfigCommands;
use commands::directions::{DirectionsArgs, PlanArgs};
use commands::geocode::{GeocodeArgs, SearchArgs};
use commands::home::HomeAction;
use commands::nearby::NearbyArgs;
use commands::route::RouteArgs;
use commands::schedule::ScheduleArgs;
use commands::vehicles::VehiclesArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "slymaps", version, about = "Realtime transit, routing and nearby places")]
struct Cli {
    /// Log filter, overrides the config file (e.g., debug or slymaps=trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Transit stops and routes (and optionally places) around a point
    Nearby {
        /// Center as lat,lng (e.g., 47.6097,-122.3331)
        #[arg(allow_hyphen_values = true)]
        location: LatLng,

        /// Search radius in metres
        #[arg(long, default_value_t = 500)]
        radius: u32,

        /// Also list places from Overpass and OneBusAway
        #[arg(long)]
        places: bool,

        /// Place category filter (e.g., cafe, restaurant)
        #[arg(long, requires = "places")]
        category: Option<String>,
    },

    /// Load a transit route with its shape, stops and vehicles
    Route {
        /// OneBusAway route id (e.g., 1_100224)
        route_id: String,

        /// List the stops of the selected segment
        #[arg(long)]
        stops: bool,
    },

    /// Realtime vehicle positions for a route
    Vehicles {
        /// OneBusAway route id
        route_id: String,

        /// Keep polling every 30 seconds until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Stop or route timetable, or upcoming arrivals at a stop
    Schedule {
        /// OneBusAway stop id (or route id with --route)
        id: String,

        /// Treat the id as a route
        #[arg(long)]
        route: bool,

        /// Service date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Show realtime arrivals instead of the timetable
        #[arg(long, conflicts_with = "date")]
        arrivals: bool,

        /// Print every row
        #[arg(long)]
        all: bool,
    },

    /// Turn-by-turn directions between two points
    Directions {
        /// Start as lat,lng
        #[arg(allow_hyphen_values = true)]
        from: LatLng,

        /// Destination as lat,lng
        #[arg(allow_hyphen_values = true)]
        to: LatLng,

        /// driving, driving-traffic, walking, cycling or transit
        #[arg(long, default_value = "driving")]
        mode: TravelMode,

        /// Print each step
        #[arg(long)]
        steps: bool,
    },

    /// Plan a transit trip with OpenTripPlanner
    Plan {
        /// Start as lat,lng
        #[arg(allow_hyphen_values = true)]
        from: LatLng,

        /// Destination as lat,lng
        #[arg(allow_hyphen_values = true)]
        to: LatLng,

        /// Number of itineraries to request
        #[arg(long, default_value_t = 3)]
        itineraries: u32,
    },

    /// Look up an address, or a position with --reverse
    Geocode {
        /// Address text, or lat,lng with --reverse
        #[arg(allow_hyphen_values = true)]
        query: String,

        /// Reverse geocode a lat,lng position
        #[arg(long)]
        reverse: bool,

        /// Maximum results
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Free-text place search
    Search {
        /// Search text
        text: String,

        /// Bias results around lat,lng
        #[arg(long, allow_hyphen_values = true)]
        near: Option<LatLng>,

        /// Radius around --near in metres
        #[arg(long, default_value_t = 5000)]
        radius: u32,

        /// Maximum results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show, set or clear the saved home location
    Home {
        #[command(subcommand)]
        action: HomeAction,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let log_level = cli.log_level;

    match cli.command {
        Commands::Nearby {
            location,
            radius,
            places,
            category,
        } => commands::nearby::run(NearbyArgs {
            location,
            radius,
            category,
            places,
            log_level,
        }),
        Commands::Route { route_id, stops } => commands::route::run(RouteArgs {
            route_id,
            stops,
            log_level,
        }),
        Commands::Vehicles { route_id, watch } => commands::vehicles::run(VehiclesArgs {
            route_id,
            watch,
            log_level,
        }),
        Commands::Schedule {
            id,
            route,
            date,
            arrivals,
            all,
        } => commands::schedule::run(ScheduleArgs {
            id,
            route,
            date,
            arrivals,
            all,
            log_level,
        }),
        Commands::Directions {
            from,
            to,
            mode,
            steps,
        } => commands::directions::run_directions(DirectionsArgs {
            from,
            to,
            mode,
            steps,
            log_level,
        }),
        Commands::Plan {
            from,
            to,
            itineraries,
        } => commands::directions::run_plan(PlanArgs {
            from,
            to,
            itineraries,
            log_level,
        }),
        Commands::Geocode {
            query,
            reverse,
            limit,
        } => commands::geocode::run_geocode(GeocodeArgs {
            query,
            reverse,
            limit,
            log_level,
        }),
        Commands::Search {
            text,
            near,
            radius,
            limit,
        } => commands::geocode::run_search(SearchArgs {
            text,
            near,
            radius,
            limit,
            log_level,
        }),
        Commands::Home { action } => commands::home::run(action, log_level.as_deref()),
        Commands::Config { command } => commands::config::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "slymaps",
            "directions",
            "-33.8688,151.2093",
            "-33.8568,151.2153",
            "--mode",
            "walk",
        ])
        .unwrap();
        match cli.command {
            Commands::Directions { from, mode, .. } => {
                assert_eq!(from, LatLng::new(-33.8688, 151.2093));
                assert_eq!(mode, TravelMode::Walking);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_schedule_date() {
        let cli =
            Cli::try_parse_from(["slymaps", "schedule", "1_75403", "--date", "2024-03-01"]).unwrap();
        match cli.command {
            Commands::Schedule { date, route, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1));
                assert!(!route);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_category_requires_places() {
        assert!(Cli::try_parse_from([
            "slymaps",
            "nearby",
            "47.6,-122.3",
            "--category",
            "cafe"
        ])
        .is_err());
    }

    #[test]
    fn test_home_set_defaults() {
        let cli = Cli::try_parse_from(["slymaps", "home", "set", "47.6,-122.3"]).unwrap();
        match cli.command {
            Commands::Home {
                action: HomeAction::Set { name, address, .. },
            } => {
                assert_eq!(name, "Home");
                assert!(address.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
