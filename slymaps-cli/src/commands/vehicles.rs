//! Vehicles command - realtime vehicle positions for a route.

use slymaps::clock::EpochMillis;
use slymaps::model::VehiclePosition;
use slymaps::provider::{cancellable, ProviderError};

use super::common::{format_relative, format_time};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the vehicles command.
pub struct VehiclesArgs {
    pub route_id: String,
    /// Keep printing each 30-second poll until interrupted.
    pub watch: bool,
    pub log_level: Option<String>,
}

/// Run the vehicles command.
pub fn run(args: VehiclesArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("vehicles");
    let app = runner.create_app()?;

    runner.run_cancellable(|cancel| async move {
        let handle = app.transit().watch_vehicles(&args.route_id);
        let vehicles = cancellable(&cancel, handle.fetch()).await?;
        print_vehicles(&args.route_id, &vehicles, app.clock().now_ms());

        if !args.watch {
            return Ok(());
        }

        println!();
        println!("Watching route {} (Ctrl-C to stop)", args.route_id);
        let mut updates = handle.subscribe();
        updates.mark_unchanged();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    if state.is_fetching {
                        continue;
                    }
                    match (state.data, state.error) {
                        (_, Some(error)) => eprintln!("Update failed: {}", error),
                        (Some(vehicles), None) => {
                            println!();
                            print_vehicles(&args.route_id, &vehicles, app.clock().now_ms());
                        }
                        (None, None) => {}
                    }
                }
            }
        }

        Ok::<(), CliError>(())
    })
    .or_else(|e| match e {
        CliError::Provider(ProviderError::Cancelled) => Ok(()),
        other => Err(other),
    })
}

fn print_vehicles(route_id: &str, vehicles: &[VehiclePosition], now: EpochMillis) {
    println!(
        "{} vehicles on route {} at {}",
        vehicles.len(),
        route_id,
        format_time(now)
    );
    for v in vehicles {
        let deviation = match v.schedule_deviation_secs {
            Some(secs) if secs > 60 => format!("{} min late", secs / 60),
            Some(secs) if secs < -60 => format!("{} min early", -secs / 60),
            Some(_) => "on time".to_string(),
            None => "no schedule".to_string(),
        };
        println!(
            "  {:<12} {}  {:<28} {:<12} seen {}",
            v.vehicle_id,
            v.position,
            v.headsign.as_deref().unwrap_or(""),
            deviation,
            format_relative(v.last_update, now)
        );
    }
}
