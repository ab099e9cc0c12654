use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Datelike;
use clap::{Parser, Subcommand};

use pepper_collect::fetch::HttpFetcher;
use pepper_collect::pipeline::RunStats;
use pepper_collect::sources::{backend, mensa, report, route, telemetry, timetable};
use pepper_collect::{logging, settings};

#[derive(Parser)]
#[command(name = "pepper_collect", about = "Data collectors for the campus robot")]
struct Cli {
    /// Settings file (default: ./pepper.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timetables of all course sets, or of one
    Timetable {
        /// Calendar week (default: current ISO week)
        #[arg(long)]
        cw: Option<u32>,
        /// Course name or short code, e.g. "WI"
        #[arg(long, requires = "semester")]
        course: Option<String>,
        #[arg(long, requires = "course")]
        semester: Option<u32>,
    },
    /// Cafeteria menu as JSON plus the printable plan
    Mensa {
        #[arg(long)]
        skip_pdf: bool,
    },
    /// Route metadata for every room, both accessibility modes
    Routes {
        /// Output file (default: <output dir>/route_data.json)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Download route videos for every room, both accessibility modes
    Videos {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Send synthetic conversation data to the collector
    Dummy {
        #[arg(short = 'n', default_value = "1000")]
        count: usize,
        /// Send to the production backend instead of localhost
        #[arg(short, long)]
        prod: bool,
    },
    /// Weekly usage summary tables from the backend
    Report {
        #[arg(long, default_value = "7")]
        days: u32,
        /// Query the local backend instead of production
        #[arg(long)]
        sandbox: bool,
    },
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = settings::load(cli.config.as_deref())?;
    let fetcher = HttpFetcher::new(&settings.http)?;

    let result = match cli.command {
        Commands::Timetable { cw, course, semester } => {
            let week = cw.unwrap_or_else(|| chrono::Local::now().iso_week().week());
            let selection = timetable::Selection { course, semester };
            let stats = timetable::run(&settings, &fetcher, week, &selection, true)?;
            print_stats("timetables", &stats);
            Ok(())
        }
        Commands::Mensa { skip_pdf } => mensa::run(&settings, &fetcher, skip_pdf),
        Commands::Routes { out } => {
            let (path, stats) = route::run_metadata(&settings, &fetcher, out.as_deref(), true)?;
            print_stats("routes", &stats);
            println!("Route metadata saved to {}", path.display());
            Ok(())
        }
        Commands::Videos { dir } => {
            let stats = route::run_videos(&settings, &fetcher, dir.as_deref(), true)?;
            print_stats("videos", &stats);
            Ok(())
        }
        Commands::Dummy { count, prod } => {
            let summary = telemetry::run(&settings, &fetcher, count, prod)?;
            println!("Done: {} sent, {} failed.", summary.sent, summary.failed);
            Ok(())
        }
        Commands::Report { days, sandbox } => {
            let client = backend::BackendClient::from_settings(&fetcher, &settings.backend, !sandbox);
            let (dir, written) = report::run(&settings, &client, days)?;
            println!("Wrote {} summary tables to {}", written, dir.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_stats(what: &str, s: &RunStats) {
    println!(
        "Done: {} {} ({} written, {} merged, {} without data, {} errors).",
        s.total, what, s.written, s.merged, s.no_data, s.failed
    );
}

/// `4.2s`, `3m 5s`, `1h 0m 12s`
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_read_at_a_glance() {
        assert_eq!(format_duration(Duration::from_millis(4_200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(185)), "3m 5s");
        assert_eq!(format_duration(Duration::from_secs(3_612)), "1h 0m 12s");
    }
}
