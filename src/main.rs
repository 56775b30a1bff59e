//! veriscan: on-device malware detection engine.
//!
//! This is the main entry point for the CLI application.

use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use veriscan::core::config::Config;
use veriscan::core::error::{Error, Result};
use veriscan::core::types::DigestAlgorithm;
use veriscan::detection::SignatureDatabase;
use veriscan::realtime::{RealtimeEvent, RealtimeMonitor};
use veriscan::scanner::{BatchSummary, ConsoleProgressReporter, ScanEngine, ScanEvent, ScanResult};
use veriscan::ui::cli::{Cli, Commands, ConfigAction, DbAction, DomainAction, OutputFormat};
use veriscan::utils::logging::{init_logging, LogConfig};
use walkdir::WalkDir;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.suggestion() {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = Config::load_or_default();
    if let Some(path) = cli.database.clone() {
        config.database.database_path = Some(path);
    }

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from_config(&config)
    };
    init_logging(log_config)?;

    log::info!("veriscan v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Scan { paths, no_follow }) => {
            run_scan(&config, paths, !no_follow, cli.format, cli.verbose).await
        }
        Some(Commands::Watch { directory }) => run_watch(&config, directory, cli.format).await,
        Some(Commands::Db { action }) => run_db(&config, action, cli.format),
        Some(Commands::Config { action }) => run_config(action, &config),
        Some(Commands::Info) => run_info(&config),
        None => {
            println!("veriscan - On-device Malware Detection");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  veriscan db import feed.json   Load signatures");
            println!("  veriscan scan <path>...        Scan files and directories");
            println!("  veriscan watch <dir>           Monitor a directory");
            Ok(())
        }
    }
}

fn open_database(config: &Config) -> Result<Arc<SignatureDatabase>> {
    let db = SignatureDatabase::open(&config.database)?;
    let stats = db.get_stats();
    log::debug!(
        "Signature database ready: {} signatures (loaded: {})",
        stats.total_signatures,
        stats.loaded
    );
    Ok(Arc::new(db))
}

/// Expand directories into the files below them.
fn collect_files(paths: &[PathBuf], follow_links: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path).follow_links(follow_links);
            for entry in walker.into_iter() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                    Ok(_) => {}
                    Err(e) => log::debug!("Skipping unreadable entry: {}", e),
                }
            }
        } else {
            // Missing paths are reported as ERROR results by the engine.
            files.push(path.clone());
        }
    }
    files
}

/// Drain engine events until the batch completes.
fn collect_findings(events: Receiver<ScanEvent>) -> (Option<BatchSummary>, Vec<ScanResult>) {
    let mut findings = Vec::new();
    while let Ok(event) = events.recv() {
        match event {
            ScanEvent::ThreatDetected(result) => findings.push(result),
            ScanEvent::Completed(summary) => return (Some(summary), findings),
            _ => {}
        }
    }
    (None, findings)
}

async fn run_scan(
    config: &Config,
    paths: Vec<PathBuf>,
    follow_links: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let db = open_database(config)?;
    let engine = ScanEngine::new(config, db)?;

    let files = collect_files(&paths, follow_links);
    log::info!("Found {} files to scan", files.len());

    if format == OutputFormat::Text {
        let reporter = if verbose {
            ConsoleProgressReporter::new().verbose()
        } else {
            ConsoleProgressReporter::new()
        };
        engine.add_listener(reporter);
    }

    let events = engine.subscribe();
    engine.start_scan(files)?;

    let mut collector = tokio::task::spawn_blocking(move || collect_findings(events));
    let collected = tokio::select! {
        res = &mut collector => res,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, stopping scan...");
            let stopper = engine.clone();
            tokio::task::spawn_blocking(move || stopper.stop_scan())
                .await
                .map_err(|e| Error::Internal(format!("Stop task failed: {}", e)))?;
            collector.await
        }
    };
    let (summary, findings) =
        collected.map_err(|e| Error::Internal(format!("Result collector failed: {}", e)))?;
    let summary =
        summary.ok_or_else(|| Error::Internal("Scan ended without a summary".to_string()))?;

    match format {
        OutputFormat::Json => {
            let report = json!({ "summary": summary, "findings": findings });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!();
            println!("=== Scan {} ===", if summary.cancelled { "Cancelled" } else { "Complete" });
            println!("Batch ID:        {}", summary.batch_id);
            println!("Files Scanned:   {} / {}", summary.files_scanned, summary.total_files);
            println!("Bytes Scanned:   {}", summary.bytes_scanned);
            println!("Threats:         {}", summary.threats_detected);
            println!("Suspicious:      {}", summary.suspicious);
            println!("Clean:           {}", summary.clean);
            println!("Skipped:         {}", summary.skipped);
            println!("Errors:          {}", summary.errors);
            println!("Duration:        {} ms", summary.duration_ms);

            if !findings.is_empty() {
                println!();
                println!("Findings:");
                for result in &findings {
                    println!("  {}", result);
                }
            }
        }
    }

    Ok(())
}

async fn run_watch(config: &Config, directory: PathBuf, format: OutputFormat) -> Result<()> {
    let db = open_database(config)?;
    let engine = ScanEngine::new(config, db)?;
    let monitor = RealtimeMonitor::new(engine, &config.realtime)?;

    monitor.add_listener(move |event: &RealtimeEvent| match event {
        RealtimeEvent::ThreatDetected(_, result) => match format {
            OutputFormat::Json => match serde_json::to_string(result) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Failed to serialize result: {}", e),
            },
            OutputFormat::Text => println!("[!] {}", result),
        },
        RealtimeEvent::Error(message) => eprintln!("Monitor error: {}", message),
        RealtimeEvent::MonitoringStarted(root) => {
            eprintln!("Watching {} (Ctrl-C to stop)", root.display())
        }
        RealtimeEvent::MonitoringStopped => eprintln!("Monitoring stopped"),
    });

    monitor.start_monitoring(&directory)?;
    tokio::signal::ctrl_c().await?;
    monitor.stop_monitoring();
    Ok(())
}

fn run_db(config: &Config, action: DbAction, format: OutputFormat) -> Result<()> {
    let db = open_database(config)?;
    let db_path = config.database.database_file();

    match action {
        DbAction::Import { feed } => {
            let result = db.import_feed(&feed)?;
            db.save_to_disk(&db_path)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Text => {
                    println!("{}", result);
                    for error in &result.errors {
                        println!("  skipped: {}", error);
                    }
                    println!("Saved to {}", db_path.display());
                }
            }
        }
        DbAction::Stats => {
            let stats = db.get_stats();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("Database:        {}", db_path.display());
                    println!("Loaded:          {}", stats.loaded);
                    println!(
                        "Feed Version:    {}",
                        stats.feed_version.as_deref().unwrap_or("-")
                    );
                    println!("Signatures:      {}", stats.total_signatures);
                    println!("Exact Index:     {}", stats.exact_signatures);
                    println!("Domains (est.):  {}", stats.approximate_domains);
                    for alg in &stats.algorithms {
                        println!(
                            "  {:<8} indexed {:>10}  filter ~{:>10}  ({} bits, k={})",
                            alg.algorithm.to_string(),
                            alg.indexed_digests,
                            alg.approximate_filter_elements,
                            alg.filter_bits,
                            alg.filter_hashes
                        );
                    }
                }
            }
        }
        DbAction::Check { digest, algorithm } => {
            let digest = digest.trim().to_lowercase();
            let algorithm = match algorithm {
                Some(name) => DigestAlgorithm::from_str(&name),
                None => DigestAlgorithm::from_hex_len(digest.len()),
            }
            .ok_or_else(|| anyhow::anyhow!("Cannot determine digest algorithm for '{}'", digest))?;

            let maybe = db.might_contain(&digest, algorithm);
            let signature = db.get_signature(&digest, algorithm);
            match format {
                OutputFormat::Json => {
                    let report = json!({
                        "digest": digest,
                        "algorithm": algorithm,
                        "filter_hit": maybe,
                        "signature": signature,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Text => match signature {
                    Some(sig) => println!(
                        "MATCH ({}): {} [{}] {}",
                        algorithm, sig.name, sig.threat_level, sig.description
                    ),
                    None if maybe => println!(
                        "No exact match ({}); filter reports possible membership",
                        algorithm
                    ),
                    None => println!("Not found ({})", algorithm),
                },
            }
        }
        DbAction::Domain { action } => match action {
            DomainAction::Add { domain } => {
                db.add_malicious_domain(&domain);
                db.save_to_disk(&db_path)?;
                println!("Added {}", domain);
            }
            DomainAction::Check { domain } => {
                let listed = db.is_domain_malicious(&domain);
                match format {
                    OutputFormat::Json => {
                        println!("{}", json!({ "domain": domain, "malicious": listed }))
                    }
                    OutputFormat::Text if listed => println!("{} is listed as malicious", domain),
                    OutputFormat::Text => println!("{} is not listed", domain),
                }
            }
        },
    }

    Ok(())
}

fn run_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Reset { yes } => {
            if !yes {
                println!("This replaces {} with defaults.", Config::default_config_path().display());
                println!("Re-run with --yes to confirm.");
                return Ok(());
            }
            log::info!("Resetting configuration to defaults...");
            Config::default().save(&Config::default_config_path())?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", Config::default_config_path().display());
        }
    }
    Ok(())
}

fn run_info(config: &Config) -> Result<()> {
    println!("veriscan - On-device Malware Detection");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Config Path:      {}", Config::default_config_path().display());
    println!("Data Directory:   {}", Config::data_dir().display());
    println!("Database:         {}", config.database.database_file().display());
    println!();
    println!("Scan Settings:");
    println!("  Max File Size:  {} MB", config.scan.max_file_size_mb);
    println!("  Scan Archives:  {}", config.scan.scan_archives);
    println!("  Threads:        {}", config.scan.worker_threads);
    println!();
    println!("Heuristics:");
    println!("  Entropy:        > {}", config.heuristics.entropy_threshold);
    println!("  Threshold:      > {}", config.heuristics.suspicious_threshold);
    println!();
    println!("Realtime:");
    println!("  Cooldown:       {} ms", config.realtime.cooldown_ms);
    println!("  Threads:        {}", config.realtime.worker_threads);
    Ok(())
}
