// ABOUTME: Command-line entry point for the ad copy batch runner
// ABOUTME: Plans row batches, drives the runner with live progress, and supports retrying failures

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use adcopy_runner::config::AppConfig;
use adcopy_runner::remote::{BatchPayload, RemoteClient};
use adcopy_runner::report::{self, Summary};
use adcopy_runner::scheduler::{partition_rows, JobDescriptor, JobStatus, Runner, StopPolicy};

/// Runs with more batches than this ask for confirmation first.
const CONFIRM_THRESHOLD: usize = 25;

#[derive(Parser, Debug)]
#[command(name = "adcopy-runner")]
#[command(version)]
#[command(about = "Generate ad copy for spreadsheet rows in batches that fit the host's time limit")]
#[command(propagate_version = true)]
struct Cli {
    /// Log every job transition and debug output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how a row range will be split into batches, without running anything
    Plan {
        #[command(flatten)]
        rows: RowArgs,

        /// Rows per batch
        #[arg(long, default_value_t = adcopy_runner::config::DEFAULT_BATCH_SIZE)]
        batch_size: u32,

        /// Print batches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate ad copy for a row range
    Run {
        #[command(flatten)]
        rows: RowArgs,

        #[command(flatten)]
        runner: RunnerArgs,

        /// Rows per batch (overrides config)
        #[arg(long)]
        batch_size: Option<u32>,
    },

    /// Re-run the failed and cancelled batches of a previous results file
    Retry {
        /// Results file written by a previous run
        #[arg(long)]
        from: PathBuf,

        #[command(flatten)]
        runner: RunnerArgs,
    },
}

#[derive(Args, Debug)]
struct RowArgs {
    /// First spreadsheet row to process
    #[arg(long)]
    start_row: u32,

    /// Last spreadsheet row to process (inclusive)
    #[arg(long)]
    end_row: u32,
}

#[derive(Args, Debug)]
struct RunnerArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "adcopy-runner.toml")]
    config: PathBuf,

    /// Base URL of the remote command endpoint (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Remote command each batch invokes (overrides config)
    #[arg(long)]
    command: Option<String>,

    /// Maximum batches in flight at once (overrides config)
    #[arg(long)]
    max_running: Option<usize>,

    /// On Ctrl-C, mark in-flight batches cancelled instead of waiting for them
    #[arg(long)]
    abandon_on_stop: bool,

    /// Write final job records as JSON to this file
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Skip the confirmation prompt for large runs
    #[arg(long, short = 'y')]
    yes: bool,
}

impl RunnerArgs {
    fn load_config(&self, batch_size: Option<u32>, verbose: bool) -> Result<AppConfig> {
        let mut config = AppConfig::load(&self.config)?;
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(command) = &self.command {
            config.command = command.clone();
        }
        if let Some(max_running) = self.max_running {
            config.max_running_jobs = max_running;
        }
        if let Some(batch_size) = batch_size {
            config.batch_size = batch_size;
        }
        if self.abandon_on_stop {
            config.stop_policy = StopPolicy::Abandon;
        }
        config.tracing |= verbose;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Plan {
            rows,
            batch_size,
            json,
        } => plan(rows, batch_size, json),
        Commands::Run {
            rows,
            runner,
            batch_size,
        } => {
            let config = runner.load_config(batch_size, cli.verbose)?;
            let descriptors = partition_rows(rows.start_row, rows.end_row, config.batch_size)?
                .into_iter()
                .map(|d| JobDescriptor {
                    id: d.id,
                    payload: BatchPayload::from(d.payload),
                })
                .collect();
            execute(config, &runner, descriptors).await
        }
        Commands::Retry { from, runner } => {
            let config = runner.load_config(None, cli.verbose)?;
            let previous = report::load_results(&from)?;
            let descriptors = report::retry_descriptors(previous);
            if descriptors.is_empty() {
                println!("Nothing to retry: every batch in {} completed", from.display());
                return Ok(());
            }
            execute(config, &runner, descriptors).await
        }
    }
}

fn plan(rows: RowArgs, batch_size: u32, json: bool) -> Result<()> {
    let batches = partition_rows(rows.start_row, rows.end_row, batch_size)?;
    if json {
        let ranges: Vec<_> = batches.iter().map(|d| d.payload).collect();
        println!("{}", serde_json::to_string_pretty(&ranges)?);
        return Ok(());
    }

    println!("{:<5} ROWS", "ID");
    for batch in &batches {
        let id = batch.id.map(|id| id.to_string()).unwrap_or_default();
        println!(
            "{:<5} {}-{}",
            id, batch.payload.start_row, batch.payload.end_row
        );
    }
    println!("{} batches of up to {} rows", batches.len(), batch_size);
    Ok(())
}

async fn execute(
    config: AppConfig,
    args: &RunnerArgs,
    descriptors: Vec<JobDescriptor<BatchPayload>>,
) -> Result<()> {
    let total = descriptors.len();
    if total > CONFIRM_THRESHOLD && !args.yes {
        let proceed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Dispatch {} batches to '{}' ({} at a time)?",
                total, config.command, config.max_running_jobs
            ))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            bail!("Aborted by user");
        }
    }

    let client = RemoteClient::new(config.api_base_url.clone(), config.request_timeout())?;
    let runner = Arc::new(Runner::new(Arc::new(client), config.runner_config()));

    let stopper = Arc::clone(&runner);
    let ctrl_c = tokio::spawn(async move {
        let interrupts = Box::pin(stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        }));
        if watch_interrupts(interrupts, || stopper.stop()).await {
            tracing::warn!("Interrupted again, exiting without waiting for running batches");
            std::process::exit(130);
        }
    });

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );
    bar.enable_steady_tick(Duration::from_millis(200));

    let progress = bar.clone();
    let jobs = runner
        .run(&config.command, descriptors, move |job| {
            let rows = format!("rows {}-{}", job.payload.start_row, job.payload.end_row);
            match job.status {
                JobStatus::Running => {
                    progress.set_message(format!("batch {} ({}) running", job.id, rows))
                }
                JobStatus::Complete => progress.inc(1),
                JobStatus::Error => {
                    progress.inc(1);
                    progress.println(format!(
                        "batch {} ({}) failed: {}",
                        job.id,
                        rows,
                        job.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                JobStatus::Cancelled => progress.inc(1),
                JobStatus::Pending => {}
            }
        })
        .await?;
    bar.finish_and_clear();
    ctrl_c.abort();

    print!("{}", report::render_table(&jobs));
    let summary = Summary::of(&jobs);
    println!("{}", summary);

    if let Some(path) = &args.output {
        report::save_results(path, &jobs)?;
        println!("Results written to {}", path.display());
    }

    if !summary.is_success() {
        let hint = match &args.output {
            Some(path) => format!(
                " Re-run them with: adcopy-runner retry --from {}",
                path.display()
            ),
            None => " Pass --output to save results for a retry".to_string(),
        };
        bail!(
            "{} batches did not complete.{}",
            summary.error + summary.cancelled,
            hint
        );
    }
    Ok(())
}

/// Calls `stop` on the first interrupt. Returns true if a second one arrives.
async fn watch_interrupts<S>(mut interrupts: S, stop: impl Fn()) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if interrupts.next().await.is_none() {
        return false;
    }
    tracing::warn!("Interrupted, stopping outstanding batches. Press Ctrl-C again to quit");
    stop();
    interrupts.next().await.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_first_interrupt_stops_second_one_quits() {
        let stops = AtomicUsize::new(0);
        let quit = watch_interrupts(stream::iter([(), ()]), || {
            stops.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert!(quit);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_interrupt_only_stops() {
        let stops = AtomicUsize::new(0);
        let quit = watch_interrupts(stream::iter([()]), || {
            stops.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert!(!quit);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let quit = watch_interrupts(stream::empty(), || {
            stops.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert!(!quit);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
