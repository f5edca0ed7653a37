//! FleetAudit - engineering-quality assessor for fleets of local repos
//!
//! Discovers version-controlled repositories under the configured base
//! directories, runs the registered analysis agents against each under
//! strict call/byte budgets, and writes per-repo and aggregate JSON
//! reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, discovery, output setup)
//!   2 - Run finished but at least one repository failed

mod agents;
mod analysis;
mod budget;
mod cli;
mod config;
mod discovery;
mod llm;
mod models;
mod report;
mod scheduler;
mod selector;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::Repository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("FleetAudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_fleet(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .fleetaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".fleetaudit.toml");

    if path.exists() {
        eprintln!("⚠️  .fleetaudit.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .fleetaudit.toml")?;

    println!("✅ Created .fleetaudit.toml with default settings.");
    println!("   Edit it to customize base directories, budgets, and the model.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete fleet analysis. Returns exit code (0 or 2).
async fn run_fleet(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    let config = Arc::new(config);

    // Step 1: Discover repositories
    println!(
        "🔍 Discovering repositories under: {}",
        config.discovery.base_dirs.join(", ")
    );
    let repositories = discovery::discover(&config)?;
    println!("   Found {} repositories", repositories.len());

    if repositories.is_empty() {
        println!("\nNothing to analyze.");
        return Ok(0);
    }

    // Handle --dry-run: discover, select, and exit
    if args.dry_run {
        return handle_dry_run(&config, &repositories);
    }

    // Step 2: Initialize the agents
    println!("\n🤖 Initializing agents...");
    println!("   Model: {}", config.model.name);
    println!("   Endpoint: {}", config.model.endpoint_url);
    println!("   Workers: {}", config.scheduler.max_concurrency);
    println!(
        "   Budget: {} calls / {} snippet bytes / {} files per repo",
        config.budget.max_calls_per_repo,
        config.selector.max_snippet_bytes,
        config.selector.max_files_per_repo
    );

    let client = Arc::new(llm::LlmClient::new(config.model.clone())?);
    let agent_set = agents::registry(&config, client);
    let agent_names: Vec<_> = agent_set.iter().map(|a| a.name()).collect();
    println!("   Agents: {}", agent_names.join(", "));

    let writer = report::ReportWriter::new(&config.output)
        .context("Failed to prepare output directories")?;

    // Ctrl-C becomes the global stop signal: no new repository tasks start,
    // in-flight tasks get the configured grace period.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Interrupt received; stopping after in-flight work...");
            let _ = stop_tx.send(true);
        }
    });

    // Step 3: Run the fleet
    println!("\n🔬 Analyzing fleet...\n");
    let mut fleet_scheduler = scheduler::ConcurrencyScheduler::new(
        Arc::clone(&config),
        agent_set,
        writer.clone(),
    );
    if !args.quiet {
        let pb = ProgressBar::new(repositories.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        fleet_scheduler = fleet_scheduler.with_progress(pb);
    }

    let aggregate = fleet_scheduler.run(repositories, stop_rx).await;
    let duration = start_time.elapsed().as_secs_f64();

    // Step 4: Persist the aggregate
    match writer.write_aggregate(&aggregate) {
        Ok(path) => println!("\n🧾 Aggregate JSON written to: {}", path.display()),
        Err(e) => error!("Aggregate report not persisted: {}", e),
    }
    println!("📝 Per-repo reports in: {}", config.output.per_repo_dir);

    if config.output.write_summary {
        let markdown = report::generate_markdown_summary(&aggregate);
        let summary_path = PathBuf::from(&config.output.aggregate_path).with_extension("md");
        match std::fs::write(&summary_path, markdown) {
            Ok(()) => println!("📄 Fleet summary written to: {}", summary_path.display()),
            Err(e) => error!("Fleet summary not persisted: {}", e),
        }
    }

    // Print summary
    let summary = &aggregate.summary;
    println!("\n📊 Fleet Summary:");
    println!("   Repositories: {}", summary.total_repositories);
    println!(
        "   - ✅ Complete: {} | ⚠️  Partial: {} | ❌ Failed: {}",
        summary.complete, summary.partially_failed, summary.failed
    );
    println!("   Duration: {:.1}s", duration);

    if summary.failed > 0 {
        warn!("{} repositories failed", summary.failed);
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: show what would be analyzed, make no LLM calls.
fn handle_dry_run(config: &Config, repositories: &[Repository]) -> Result<i32> {
    println!("\n🔍 Dry run: selecting files (no LLM calls)...\n");

    let selector = selector::FileSelector::new(config.selector.clone());

    for repo in repositories {
        let candidates = selector.candidates(repo);
        println!(
            "   📦 {} [{}] — {} of {} files selected",
            repo.name,
            repo.source,
            candidates.len(),
            repo.file_count
        );
        for candidate in &candidates {
            println!("      📄 {} ({} bytes)", candidate.path, candidate.size);
        }
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .fleetaudit.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
