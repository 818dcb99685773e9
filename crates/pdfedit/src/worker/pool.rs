use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::error::PdfEditError;
use crate::queue::JobQueue;
use crate::worker::executor::JobExecutor;
use crate::worker::job::JobResult;

/// How long a worker blocks on the queue before re-checking the shutdown flag.
const CONSUME_TIMEOUT: Duration = Duration::from_millis(100);

/// Threads pulling deliveries from the queue and running the executor.
///
/// Results are reported on a bounded channel; when nobody drains it, results
/// are dropped rather than stalling the workers.
pub struct WorkerPool {
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `worker_count` workers.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(executor: Arc<JobExecutor>, queue: Arc<dyn JobQueue>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 16);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let name = format!("worker-{}-{}", std::process::id(), worker_id);
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_executor = Arc::clone(&executor);
            let worker_queue = Arc::clone(&queue);

            let handle = thread::spawn(move || {
                run_worker(
                    &name,
                    worker_executor,
                    worker_queue,
                    result_tx,
                    shutdown_flag,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        match self.result_receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Waits for every worker to finish its current delivery and exit.
    pub fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

fn run_worker(
    name: &str,
    executor: Arc<JobExecutor>,
    queue: Arc<dyn JobQueue>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
) {
    debug!("{} started", name);

    loop {
        if shutdown.load(Ordering::Acquire) {
            debug!("{} received shutdown signal", name);
            break;
        }

        let delivery = match queue.consume(name, CONSUME_TIMEOUT) {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(e) => {
                error!("{} failed to consume from queue: {}", name, e);
                thread::sleep(CONSUME_TIMEOUT);
                continue;
            }
        };

        let request = &delivery.request;
        debug!(
            "{} processing job {} (attempt {}, delivery {})",
            name, request.job_id, request.attempt, delivery.deliveries
        );

        let result = match executor.run(request) {
            Ok(outcome) => Some(JobResult::new(request, outcome.status(), outcome.error())),
            Err(PdfEditError::Consistency(message)) => {
                Some(JobResult::new(request, None, Some(message)))
            }
            Err(e) => {
                // Left unacked: the message is redelivered once its claim expires.
                warn!(
                    "{} could not record outcome of job {}: {}",
                    name, request.job_id, e
                );
                None
            }
        };

        let Some(result) = result else {
            continue;
        };

        if let Err(e) = queue.ack(&delivery.message_id) {
            error!(
                "{} failed to ack message {}: {}",
                name, delivery.message_id, e
            );
        }

        match result_sender.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(result)) => {
                debug!("{} result channel full, dropping result for {}", name, result.job_id);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("{} result channel closed", name);
            }
        }
    }

    debug!("{} stopped", name);
}
