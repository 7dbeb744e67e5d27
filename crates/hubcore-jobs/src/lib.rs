//! Background job queue: a lease-based worker pool that drains queued jobs
//! with exponential backoff and dead-lettering, plus the outbox relay that
//! feeds it from the write pipeline's transactional outbox.

pub mod backoff;
pub mod error;
pub mod handlers;
pub mod relay;
pub mod worker;

pub use error::{Error, Result};
pub use relay::{relay_once, run_relay_forever, RelayContext, RelayTargets};
pub use worker::{run_forever, run_lease_reaper, JobContext};
