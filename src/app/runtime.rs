use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use batch_fetch_core::{BatchJob, DirectorySink, HttpFetcher, JobReport, load_target_file};
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::progress_manager::ProgressDisplay;
use crate::app::{config_manager, exit_handler, terminal, validation};
use crate::cli::Args;

pub(crate) async fn run() -> Result<ProcessExit> {
    let args = Args::parse();
    let resolved = config_manager::resolve_config(&args)?;

    let no_color = terminal::is_no_color_requested(&args);
    terminal::init_tracing(resolved.log_level, no_color);
    debug!(?args, "CLI arguments parsed");
    if resolved.loaded_from_file {
        debug!(path = ?resolved.config_path, "Loaded config file");
    }

    validation::ensure_input_file(&resolved.input_file)?;
    validation::ensure_output_dir(&resolved.output_dir)?;

    let targets = load_target_file(&resolved.input_file)?;
    info!(
        targets = targets.len(),
        input = %resolved.input_file.display(),
        output = %resolved.output_dir.display(),
        "Batch fetch starting"
    );

    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    let sink = DirectorySink::new(resolved.output_dir.clone());
    let job = BatchJob::new(Arc::new(fetcher), Arc::new(sink), resolved.job.clone());

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());

    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        &args,
        terminal::is_dumb_terminal(),
    );
    let mut progress = ProgressDisplay::new(show_progress, targets.len());

    let mut run = job.run(targets, cancel)?;
    while let Some((target, outcome)) = run.next_event().await {
        progress.observe(&target, &outcome);
    }
    progress.finish();
    let report = run.finish().await?;
    interrupt.abort();

    log_summary(&report);
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{json}");
    }

    Ok(exit_handler::determine_exit_outcome(&report))
}

/// Cancels the job on the first Ctrl+C.
fn spawn_interrupt_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling remaining fetches");
            cancel.cancel();
        }
    })
}

fn log_summary(report: &JobReport) {
    for (kind, count) in report.kind_counts() {
        debug!(kind = %kind, count, "Failures by kind");
    }
    let abandoned = report.abandoned().count();
    if abandoned > 0 {
        warn!(abandoned, "Job cancelled before every URL finished");
    }
    info!(
        total = report.total,
        written = report.written(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        retries = report.retries,
        state = ?report.state,
        "Batch fetch complete"
    );
}
