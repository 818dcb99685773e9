pub mod executor;
pub mod job;
pub mod pool;

pub use executor::{JobExecutor, JobFailure, JobOutcome, RetryPolicy};
pub use job::{JobRequest, JobResult};
pub use pool::WorkerPool;
