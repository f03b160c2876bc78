//! Home location CLI commands.

use clap::Subcommand;
use slymaps::geo::LatLng;
use slymaps::store::HomeLocation;
use tracing::warn;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Home subcommands.
#[derive(Debug, Subcommand)]
pub enum HomeAction {
    /// Show the saved home location
    Show,

    /// Save a home location
    Set {
        /// Position as lat,lng (e.g., 47.6097,-122.3331)
        #[arg(allow_hyphen_values = true)]
        location: LatLng,

        /// Display name
        #[arg(long, default_value = "Home")]
        name: String,

        /// Street address; looked up from the position when omitted
        #[arg(long)]
        address: Option<String>,
    },

    /// Forget the saved home location
    Clear,
}

/// Run a home subcommand.
pub fn run(action: HomeAction, log_level: Option<&str>) -> Result<(), CliError> {
    let runner = CliRunner::new(log_level)?;
    runner.log_startup("home");
    let app = runner.create_app()?;

    match action {
        HomeAction::Show => {
            match app.home() {
                Some(home) => print_home(&home),
                None => println!("(not set)"),
            }
            Ok(())
        }
        HomeAction::Set {
            location,
            name,
            address,
        } => {
            let geocoder = app.geocoder().cloned();
            let address = match (address, geocoder) {
                (Some(address), _) => Some(address),
                (None, None) => None,
                (None, Some(geocoder)) => runner.run_cancellable(|cancel| async move {
                    match geocoder.reverse(location, &cancel).await {
                        Ok(result) => Ok(result.map(|r| r.display_name)),
                        Err(e) => {
                            warn!(error = %e, "Address lookup failed, saving without address");
                            Ok::<_, CliError>(None)
                        }
                    }
                })?,
            };

            let mut home = HomeLocation::new(name, location);
            if let Some(address) = address {
                home = home.with_address(address);
            }
            app.set_home(home.clone())?;
            println!("Saved home location");
            print_home(&home);
            Ok(())
        }
        HomeAction::Clear => {
            app.clear_home()?;
            println!("Cleared home location");
            Ok(())
        }
    }
}

fn print_home(home: &HomeLocation) {
    println!("{}", home.name);
    println!("  {}", home.position);
    if let Some(address) = &home.address {
        println!("  {}", address);
    }
}
