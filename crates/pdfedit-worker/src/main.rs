use std::path::PathBuf;
use std::process::ExitCode;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{error, info, warn};
use pdfedit::config::{default_config_path, load_config};
use pdfedit::telemetry::init_logging;
use pdfedit::{Config, JanitorScheduler, PdfEditService, WorkerPool};
use tokio::sync::broadcast;

const DEFAULT_UPLOAD_DIRECTORY: &str = "uploads";

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_config_path)
}

/// Loads the config file, or falls back to defaults when there is none.
fn resolve_config() -> Result<Config, pdfedit::ConfigError> {
    match config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(Config::with_upload_directory(DEFAULT_UPLOAD_DIRECTORY)),
    }
}

fn main() -> ExitCode {
    let config = match resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pdfedit-worker: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(config.log_format) {
        eprintln!("pdfedit-worker: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting pdfedit worker v{}", env!("CARGO_PKG_VERSION"));

    let worker_count = config.worker_count;
    let janitor_interval = config.janitor.interval();
    let service = match PdfEditService::open(config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to open pdfedit service: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        error!("Failed to install Ctrl-C handler: {}", e);
        return ExitCode::FAILURE;
    }

    let pool = WorkerPool::new(service.executor(), service.queue(), worker_count.max(1));

    let scheduler = JanitorScheduler::new(service.janitor(), janitor_interval);
    let (trigger_tx, trigger_rx) = broadcast::channel(4);
    let janitor_handle = scheduler.start(trigger_rx);

    info!("Worker running, press Ctrl-C to stop");

    loop {
        match shutdown_rx.recv_timeout(std::time::Duration::from_secs(1)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                while let Some(result) = pool.try_recv_result() {
                    match (&result.status, &result.error) {
                        (Some(status), None) => {
                            info!("Job {} attempt {}: {}", result.job_id, result.attempt, status)
                        }
                        (Some(status), Some(err)) => warn!(
                            "Job {} attempt {}: {} ({})",
                            result.job_id, result.attempt, status, err
                        ),
                        (None, _) => info!("Job {} discarded", result.job_id),
                    }
                }
            }
        }
    }

    info!("Shutdown requested");
    scheduler.stop();
    let _ = trigger_tx.send(());
    pool.shutdown();
    pool.wait();

    if janitor_handle.join().is_err() {
        error!("Janitor thread panicked");
    }

    info!("pdfedit worker stopped");
    ExitCode::SUCCESS
}
