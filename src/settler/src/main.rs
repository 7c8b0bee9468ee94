//! Settler - periodic settlement worker for the sportsbook.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::time::sleep;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sportsbook::{Config, Database, FinalStats, Fixture, ScorePair};

mod commands;
mod cycle;
mod metrics;

use cycle::Settler;
use metrics::{CycleReport, SessionTotals};

/// Settler - settles wagers on finished matches
#[derive(Parser, Debug)]
#[command(name = "settler")]
#[command(about = "Settle wagers on finished soccer matches")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Seconds between cycles (default: SETTLE_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Days to keep finished matches (default: RETENTION_DAYS)
    #[arg(long)]
    retention_days: Option<i64>,

    /// Skip removing empty markets and purging old matches
    #[arg(long)]
    skip_cleanup: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a fixture (or move an unplayed one)
    Fixture {
        #[arg(long)]
        match_id: i64,
        #[arg(long)]
        league: String,
        #[arg(long)]
        home: String,
        #[arg(long)]
        away: String,
        /// Kickoff time, RFC 3339 (e.g. 2025-03-01T15:00:00Z)
        #[arg(long)]
        kickoff: DateTime<Utc>,
    },

    /// Record the final statistics of a match
    Finish {
        #[arg(long)]
        match_id: i64,
        /// Half-time score as "home-away"
        #[arg(long)]
        halftime: Option<ScorePair>,
        /// Full-time score as "home-away"
        #[arg(long)]
        fulltime: Option<ScorePair>,
        #[arg(long)]
        corners: Option<ScorePair>,
        #[arg(long)]
        cards: Option<ScorePair>,
    },

    /// Import bookmaker offers for a match from a JSON file
    Import {
        #[arg(long)]
        match_id: i64,
        #[arg(long)]
        offers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with RUST_LOG env var support (default: info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let mut args = Args::parse();

    // Load config and connect to database
    let config = Config::from_env()?;
    let db = Database::connect(&config).await?;
    db.health_check().await?;
    db.migrate().await?;
    info!("Database connected");

    if let Some(command) = args.command.take() {
        return run_command(&db, command).await;
    }

    let interval_secs = args.interval_secs.unwrap_or(config.settle_interval_secs);
    let retention_days = args.retention_days.unwrap_or(config.retention_days);
    if retention_days < 0 {
        anyhow::bail!("retention_days ({}) cannot be negative", retention_days);
    }
    let retention = (!args.skip_cleanup).then(|| chrono::Duration::days(retention_days));

    print_banner(&args, interval_secs, retention_days);

    let settler = Settler::new(db, retention);
    let mut totals = SessionTotals::default();

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = run_loop(&settler, &mut totals, args.once, interval_secs) => {
            if let Err(e) = result {
                error!("Error in main loop: {}", e);
            }
        }
        _ = shutdown => {}
    }

    totals.print_summary();

    Ok(())
}

async fn run_command(db: &Database, command: Command) -> Result<()> {
    match command {
        Command::Fixture {
            match_id,
            league,
            home,
            away,
            kickoff,
        } => {
            let fixture = Fixture::scheduled(match_id, &league, &home, &away, kickoff);
            commands::register_fixture(db, &fixture).await
        }
        Command::Finish {
            match_id,
            halftime,
            fulltime,
            corners,
            cards,
        } => {
            let stats = FinalStats {
                halftime,
                fulltime,
                corners,
                cards,
            };
            commands::finish_match(db, match_id, &stats, Utc::now()).await
        }
        Command::Import { match_id, offers } => {
            commands::import_offers(db, match_id, &offers).await?;
            Ok(())
        }
    }
}

/// Report interval for quiet periods (1 hour).
const REPORT_INTERVAL_SECS: u64 = 60 * 60;

/// Run settlement cycles until stopped.
async fn run_loop(
    settler: &Settler,
    totals: &mut SessionTotals,
    once: bool,
    interval_secs: u64,
) -> Result<()> {
    let mut last_report = Instant::now();

    loop {
        let cycle = settler.run_cycle().await?;
        totals.add(&cycle);

        if !cycle.is_idle() {
            log_cycle(&cycle);
            last_report = Instant::now();
        } else if last_report.elapsed().as_secs() >= REPORT_INTERVAL_SECS {
            info!(
                "[SETTLE] Idle | {} cycles | {} matches settled so far",
                totals.cycles, totals.matches_settled
            );
            last_report = Instant::now();
        }

        if once {
            break;
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }

    Ok(())
}

fn log_cycle(cycle: &CycleReport) {
    info!(
        "Cycle: {}ms (query: {}ms, prune: {}ms, settle: {}ms, purge: {}ms) | Matches: {}/{} ({} failed) | Wagers: {} | Users: {} | Staked: ${} | Paid: ${} | Purged: {}",
        cycle.total_cycle_ms,
        cycle.query_ms,
        cycle.prune_ms,
        cycle.settle_ms,
        cycle.purge_ms,
        cycle.matches_settled,
        cycle.matches_found,
        cycle.matches_failed,
        cycle.wagers_settled,
        cycle.users_credited,
        cycle.total_staked,
        cycle.total_paid,
        cycle.matches_purged
    );
}

/// Print startup banner.
fn print_banner(args: &Args, interval_secs: u64, retention_days: i64) {
    println!(
        r#"
═══════════════════════════════════════════════════════════════
  SPORTSBOOK SETTLER
═══════════════════════════════════════════════════════════════
  Mode:             {}
  Interval:         {}s
  Cleanup:          {}
═══════════════════════════════════════════════════════════════
"#,
        if args.once { "single cycle" } else { "loop" },
        interval_secs,
        if args.skip_cleanup {
            "disabled".to_string()
        } else {
            format!("keep {} days", retention_days)
        },
    );
}
