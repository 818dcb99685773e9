//! Job records and the status state machine.

pub mod pages;
pub mod record;

pub use pages::{PageSet, PageSetError};
pub use record::{InvalidTransition, JobPatch, JobRecord, JobStatus};
