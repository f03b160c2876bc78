//! Schedule command - stop or route timetables, upcoming arrivals and alerts.

use chrono::NaiveDate;
use slymaps::model::{ScheduleEntry, Situation};
use slymaps::provider::cancellable;

use super::common::{format_relative, format_time};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Number of timetable rows printed unless `--all` is given.
const DEFAULT_ROWS: usize = 20;

/// Arguments for the schedule command.
pub struct ScheduleArgs {
    /// Stop id, or route id with `route`.
    pub id: String,
    pub route: bool,
    pub date: Option<NaiveDate>,
    /// Show realtime arrivals instead of the timetable (stops only).
    pub arrivals: bool,
    pub all: bool,
    pub log_level: Option<String>,
}

/// Run the schedule command.
pub fn run(args: ScheduleArgs) -> Result<(), CliError> {
    if args.route && args.arrivals {
        return Err(CliError::Config(
            "--arrivals applies to stops, not routes".to_string(),
        ));
    }

    let runner = CliRunner::new(args.log_level.as_deref())?;
    runner.log_startup("schedule");
    let app = runner.create_app()?;
    let limit = if args.all { usize::MAX } else { DEFAULT_ROWS };

    runner.run_cancellable(|cancel| async move {
        let transit = app.transit();

        if args.arrivals {
            let arrivals = cancellable(&cancel, transit.arrivals(&args.id).fetch()).await?;
            let now = app.clock().now_ms();
            println!("Arrivals at stop {}", args.id);
            if arrivals.is_empty() {
                println!("  No upcoming arrivals");
            }
            for a in arrivals.iter().take(limit) {
                let realtime = if a.predicted_arrival.is_some() { "*" } else { " " };
                println!(
                    "  {:<6} {:<30} {} {}{}",
                    a.route_short_name.as_deref().unwrap_or(&a.route_id),
                    a.trip_headsign.as_deref().unwrap_or(""),
                    format_time(a.best_arrival()),
                    format_relative(a.best_arrival(), now),
                    realtime
                );
            }
            return Ok(());
        }

        let (entries, situations) = if args.route {
            let schedule =
                cancellable(&cancel, transit.route_schedule(&args.id, args.date).fetch()).await?;
            println!("Schedule for route {}", schedule.route_id);
            (schedule.entries, schedule.situations)
        } else {
            let schedule =
                cancellable(&cancel, transit.stop_schedule(&args.id, args.date).fetch()).await?;
            println!("Schedule for stop {}", schedule.stop_id);
            (schedule.entries, schedule.situations)
        };

        print_entries(&entries, limit);
        print_situations(&situations);
        Ok::<(), CliError>(())
    })
}

fn print_entries(entries: &[ScheduleEntry], limit: usize) {
    if entries.is_empty() {
        println!("  No service");
        return;
    }
    for entry in entries.iter().take(limit) {
        println!(
            "  {}  {:<10} {:<14} {}",
            format_time(entry.departure_time),
            entry.route_id.as_deref().unwrap_or(""),
            entry.stop_id,
            entry.headsign.as_deref().unwrap_or("")
        );
    }
    if entries.len() > limit {
        println!("  ... {} more (use --all)", entries.len() - limit);
    }
}

fn print_situations(situations: &[Situation]) {
    if situations.is_empty() {
        return;
    }
    println!();
    println!("Alerts ({})", situations.len());
    for situation in situations {
        println!(
            "  [{}] {}",
            situation.severity.as_deref().unwrap_or("info"),
            situation.summary.as_deref().unwrap_or(&situation.id)
        );
        if let Some(description) = &situation.description {
            println!("      {}", description);
        }
    }
}
