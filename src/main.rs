// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use effort_core::{
    EffortOverloadEngine, EngineConfig, InMemoryLedger, LedgerSnapshot, Period,
    ResolutionCoordinator,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Resolves effort overloads in a JSON ledger snapshot.
#[derive(Parser, Debug)]
#[command(name = "effort-adjust", version, about)]
struct Cli {
    /// Ledger snapshot to read (and write back unless --dry-run)
    #[arg(long)]
    ledger: PathBuf,

    #[arg(long)]
    year: i32,

    #[arg(long)]
    month: u32,

    /// Resolve only this person
    #[arg(long, conflicts_with = "work_package")]
    person: Option<String>,

    /// Resolve everyone assigned to this work package (post-import trigger)
    #[arg(long)]
    work_package: Option<String>,

    /// Compute and print results without saving the snapshot
    #[arg(long)]
    dry_run: bool,
}

fn load_snapshot(path: &Path) -> Result<LedgerSnapshot> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger snapshot {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse ledger snapshot {}", path.display()))
}

fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write ledger snapshot {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("Failed to load EFFORT_* configuration")?;
    info!("Engine configuration loaded: {:?}", config);

    let period = Period::new(cli.year, cli.month)?;
    let ledger = InMemoryLedger::new(load_snapshot(&cli.ledger)?);
    let engine = Arc::new(EffortOverloadEngine::new(Arc::new(ledger.clone()), config));

    let coordinator = ResolutionCoordinator::new(engine);

    let output = match (&cli.person, &cli.work_package) {
        (Some(person_id), _) => {
            let result = coordinator
                .adjust_monthly_overload(person_id, period.year, period.month)
                .await?;
            serde_json::to_string_pretty(&result)?
        }
        (None, Some(work_package_id)) => {
            let report = coordinator.adjust_after_import(work_package_id, period).await?;
            serde_json::to_string_pretty(&report)?
        }
        (None, None) => {
            let report = coordinator.adjust_period(period).await?;
            if report.failures() > 0 {
                warn!("{} of {} persons could not be resolved", report.failures(), report.entries.len());
            }
            serde_json::to_string_pretty(&report)?
        }
    };
    println!("{}", output);

    let batches = ledger.persisted_batches()?.len();
    if cli.dry_run {
        info!("Dry run: {} batches computed, snapshot not saved", batches);
    } else if batches > 0 {
        save_snapshot(&cli.ledger, &ledger.snapshot()?)?;
        info!("Saved {} batches to {}", batches, cli.ledger.display());
    } else {
        info!("Nothing to save");
    }
    Ok(())
}
