// crates/dashboard/src/main.rs
//! delineate dashboard binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use delineate_dashboard::render::format_error_entry;
use delineate_dashboard::{ApiClient, Dashboard, DownloadApi, JobTracker, TrackerSettings};
use delineate_observability::{ErrorLog, ObservabilityConfig, TraceParent};
use delineate_types::FileId;

#[derive(Parser)]
#[command(name = "delineate-dashboard")]
#[command(about = "Start downloads and watch them finish")]
#[command(version)]
struct Cli {
    /// Base URL of the delineate API
    #[arg(long, env = "DELINEATE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[arg(long, env = "SENTRY_DSN")]
    sentry_dsn: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct TimerArgs {
    /// Progress estimator period
    #[arg(long, default_value_t = 100)]
    progress_interval_ms: u64,

    /// Status poll period
    #[arg(long, default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Lower bound of the server's simulated latency
    #[arg(long, default_value_t = 10_000)]
    expected_min_ms: u64,

    /// Upper bound of the server's simulated latency
    #[arg(long, default_value_t = 200_000)]
    expected_max_ms: u64,

    /// Give up on a job after this long (default: twice the upper bound)
    #[arg(long)]
    deadline_ms: Option<u64>,
}

impl TimerArgs {
    fn settings(&self) -> TrackerSettings {
        let expected_max = Duration::from_millis(self.expected_max_ms);
        TrackerSettings {
            progress_interval: Duration::from_millis(self.progress_interval_ms.max(1)),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            expected_min: Duration::from_millis(self.expected_min_ms),
            expected_max,
            deadline: self
                .deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(expected_max * 2),
            ..TrackerSettings::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start downloads and track them until they finish
    Track {
        #[arg(required = true)]
        file_ids: Vec<FileId>,
        #[command(flatten)]
        timers: TimerArgs,
    },
    /// Check whether a file is available
    Check { file_id: FileId },
    /// Show the server's job record for a file
    Status { file_id: FileId },
    /// Make the server fail on purpose and show the correlated error entry
    TriggerError {
        #[arg(default_value = "70000")]
        file_id: FileId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _observability = delineate_observability::init(ObservabilityConfig {
        sentry_dsn: cli.sentry_dsn.clone(),
        default_filter: "warn,delineate_dashboard=info".to_string(),
        ..ObservabilityConfig::new("delineate-dashboard")
    });

    let errors = ErrorLog::new();
    let client = ApiClient::new(&cli.api_url, errors.clone()).context("failed to create API client")?;

    match cli.command {
        Commands::Track { file_ids, timers } => {
            let mut tracker = JobTracker::new(Arc::new(client), timers.settings());
            let mut dashboard = Dashboard::new().context("invalid progress template")?;
            for file_id in file_ids {
                tracker.track(file_id);
            }
            dashboard.update(tracker.snapshot());
            tracker.run_until_idle(|jobs| dashboard.update(jobs)).await;
            dashboard.finish();
        }
        Commands::Check { file_id } => {
            if let Ok(response) = client.check(file_id, None).await {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Commands::Status { file_id } => {
            if let Ok(response) = client.fetch_status(file_id, None).await {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Commands::TriggerError { file_id } => {
            let trace = TraceParent::generate();
            println!("traceparent trace id: {}", trace.trace_id());
            if client.trigger_error(file_id, Some(&trace)).await.is_ok() {
                println!("server did not fail");
            }
        }
    }

    print_error_log(&errors);
    Ok(())
}

fn print_error_log(errors: &ErrorLog) {
    if errors.is_empty() {
        return;
    }
    println!("\nErrors ({}):", errors.len());
    for entry in errors.entries() {
        println!("  {}", format_error_entry(&entry));
    }
}
