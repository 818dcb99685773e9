//! Periodic janitor sweeps with an on-demand trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use super::Janitor;

/// Runs [`Janitor::sweep`] every `interval` and whenever a trigger arrives.
pub struct JanitorScheduler {
    janitor: Arc<Janitor>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl JanitorScheduler {
    pub fn new(janitor: Arc<Janitor>, interval: Duration) -> Self {
        Self {
            janitor,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the sweep loop in a background thread.
    /// Accepts a trigger receiver for manual sweep requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let janitor = Arc::clone(&self.janitor);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start janitor runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual janitor sweep triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match janitor.sweep(Utc::now()) {
                        Ok(removed) if !removed.is_empty() => {
                            log::info!("Janitor: {} expired jobs removed", removed.len());
                        }
                        Err(e) => log::error!("Janitor sweep failed: {}", e),
                        _ => {}
                    }
                }
            });

            log::debug!("Janitor scheduler stopped");
        })
    }

    /// Signals the scheduler to stop. The loop notices at its next wakeup;
    /// send a trigger to wake it immediately.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
