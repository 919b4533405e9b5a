use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use source_reconcile::{
    load_data_dir, write_json, CanonicalRegistry, FileDecisionStore, Matcher, ReconcileConfig,
    ReconciliationEngine, StdinInput,
};

/// Merge supplier lists from several scrapers into one canonical list
#[derive(Debug, Parser)]
#[command(name = "source-reconcile", version)]
struct Cli {
    /// Directory with one <source>.json per source
    #[arg(long, env = "RECONCILE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Decision log (default: <data-dir>/combine_selections.csv)
    #[arg(long)]
    decisions: Option<PathBuf>,

    /// Source that seeds the canonical registry
    #[arg(long)]
    target: Option<String>,

    /// JSON config file; flags override its values
    #[arg(long, env = "RECONCILE_CONFIG")]
    config: Option<PathBuf>,

    /// Combined JSON output
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write a SQLite database
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<ReconcileConfig> {
        let mut config = match &self.config {
            Some(path) => ReconcileConfig::from_file(path)?,
            None => ReconcileConfig::default(),
        };

        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(file) = self.decisions {
            config.decision_file = Some(file);
        }
        if let Some(target) = self.target {
            config.target_source = target;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(sqlite) = self.sqlite {
            config.sqlite = Some(sqlite);
        }
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.into_config()?;
    run(&config)
}

fn run(config: &ReconcileConfig) -> Result<()> {
    println!("🔗 Source Reconcile v{}", source_reconcile::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load sources
    println!("\n📂 Loading sources from {:?}...", config.data_dir);
    let shapes = config.shape_registry()?;
    let loaded = load_data_dir(
        &config.data_dir,
        &config.target_source,
        &shapes,
        &config.duplicate_exceptions,
    )
    .with_context(|| format!("Failed to load data directory: {:?}", config.data_dir))?;
    println!(
        "✓ {} canonical records from {}, {} other sources",
        loaded.canonical.len(),
        loaded.target,
        loaded.sources.len()
    );

    // 2. Seed registry
    let mut registry = CanonicalRegistry::from_target(loaded.canonical);

    // 3. Reconcile
    let decision_path = config.decision_path();
    info!(path = %decision_path.display(), "using decision log");
    let mut store = FileDecisionStore::new(&decision_path);
    let mut input = StdinInput;

    let report = ReconciliationEngine::new(Matcher::with_policy(config.matching), &mut store, &mut input)
        .reconcile(&loaded.sources, &mut registry)
        .with_context(|| format!("Reconciliation failed (decision log: {:?})", decision_path))?;

    if report.aborted {
        warn!(run_id = %report.run_id, "run stopped by operator, writing partial result");
    }

    // 4. Export
    println!("\n💾 Writing {} canonical records...", registry.len());
    write_json(&registry, &config.output)?;
    println!("✓ {:?}", config.output);

    if let Some(path) = &config.sqlite {
        export_sqlite(&registry, &report, path)?;
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🔑 Fingerprint: {}", registry.fingerprint()?);

    Ok(())
}

#[cfg(feature = "sqlite")]
fn export_sqlite(
    registry: &CanonicalRegistry,
    report: &source_reconcile::ReconciliationReport,
    path: &std::path::Path,
) -> Result<()> {
    let export = source_reconcile::write_sqlite(registry, report, path)?;
    println!("✓ {:?}: inserted {}, already present {}", path, export.inserted, export.duplicates);
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn export_sqlite(
    _registry: &CanonicalRegistry,
    _report: &source_reconcile::ReconciliationReport,
    path: &std::path::Path,
) -> Result<()> {
    eprintln!("❌ SQLite export not available for {:?}", path);
    eprintln!("   Rebuild with: cargo build --features sqlite");
    Ok(())
}
