//! Timer engine and the auto-unmute scheduler built on it

mod jobs;
mod unmute;

pub use jobs::{JobCallback, JobFuture, JobScheduler};
pub use unmute::{DEFAULT_UNMUTE_GRACE, MuteScheduler, RejoinOutcome, UNMUTE_RETRY_DELAY};
