//! # newscrawl
//!
//! Crawls news sites for keywords and writes the matching articles as CSV
//! and JSON lines.
//!
//! ## Usage
//!
//! ```sh
//! newscrawl -c targets.yaml -o ./out
//! ```
//!
//! ## Architecture
//!
//! 1. **Configuration**: load and validate targets from YAML
//! 2. **Crawling**: per target, open a session and walk every keyword's listing pages
//! 3. **Output**: write each target's records under `out/YYYY/MM/DD/`
//! 4. **Summary**: print per-keyword counts and termination reasons
//!
//! Ctrl-C stops the crawl after the item in flight; records gathered so far
//! are still written.

use chrono::Local;
use clap::Parser;
use newscrawl::cli::Cli;
use newscrawl::config::CrawlConfig;
use newscrawl::orchestrator::crawl_all;
use newscrawl::outputs::write_target;
use newscrawl::utils::ensure_writable_dir;
use std::error::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newscrawl starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // Early check: fail before crawling if results could not be saved
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let config = CrawlConfig::load(&args.config)?;
    let mut targets = config.targets;
    if !args.targets.is_empty() {
        for wanted in &args.targets {
            if !targets.iter().any(|t| &t.name == wanted) {
                warn!(target = %wanted, "No such target in configuration");
            }
        }
        targets.retain(|t| args.targets.contains(&t.name));
    }
    if let Some(max_pages) = args.max_pages {
        for target in &mut targets {
            target.max_pages = max_pages.max(1);
        }
    }
    info!(count = targets.len(), "Targets selected");

    // ---- Cancellation ----
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current item");
            on_interrupt.cancel();
        }
    });

    // ---- Crawl ----
    let outcomes = crawl_all(&targets, &cancel).await;

    // ---- Output & summary ----
    let run_date = Local::now().date_naive();
    let mut total_records = 0;
    let mut failed_targets = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(run) => {
                total_records += run.store.len();
                match write_target(
                    &run.store,
                    &args.output_dir,
                    run_date,
                    &outcome.target,
                    args.format,
                )
                .await
                {
                    Ok(paths) => {
                        for path in paths {
                            info!(target = %outcome.target, path = %path.display(), "Output written");
                        }
                    }
                    Err(e) => error!(target = %outcome.target, error = %e, "Failed to write output"),
                }
                print!("{}", run.report);
            }
            Err(e) => {
                failed_targets += 1;
                println!("{}: not crawled ({e})", outcome.target);
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        records = total_records,
        failed_targets,
        cancelled = cancel.is_cancelled(),
        "Execution complete"
    );

    Ok(())
}
