use lead_scoring_job::config::Config;
use lead_scoring_job::orchestrator::Orchestrator;
use lead_scoring_job::store::PgJobStore;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Opens the append-only job log at `path`, creating its directory if needed.
///
/// # Returns
///
/// * `Ok((writer, guard))` - Non-blocking writer for the log layer. Buffered
///   lines are flushed when `guard` is dropped.
/// * `Err(String)` - Why the file could not be opened.
fn open_log_file(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{}: not a file path", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    // Same file as `rolling::never`, without panicking when it cannot be opened
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| format!("{}: {}", path.display(), e))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Entry point for the nightly scoring job.
///
/// Loads configuration, sets up logging to stdout and the append-only log
/// file, runs the job for today's date and exits with 0 on a completed run or
/// 1 on anything else.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing: stdout plus the append-only job log
    let mut log_file_error = None;
    let mut log_guard = None;
    let file_layer = config
        .log_file
        .as_deref()
        .and_then(|path| match open_log_file(path) {
            Ok((writer, guard)) => {
                log_guard = Some(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
            }
            Err(e) => {
                log_file_error = Some(e);
                None
            }
        });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_scoring_job=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let Some(err) = log_file_error {
        tracing::warn!("Could not open log file {}, logging to stdout only", err);
    }

    tracing::info!("Lead scoring job starting...");

    let job_date = chrono::Local::now().date_naive();
    let orchestrator = Orchestrator::from_config(&config);
    let database_url = config.database_url.clone();

    let outcome = orchestrator
        .run(job_date, || PgJobStore::connect(&database_url))
        .await;

    if let Some(report) = outcome.report() {
        tracing::info!("Run report: {}", serde_json::to_string(report)?);
    }

    let exit_code = outcome.exit_code();
    tracing::info!("Scoring job finished with exit code {}", exit_code);

    // `process::exit` skips destructors; flush the file writer first
    drop(log_guard);
    std::process::exit(exit_code);
}
