//! SQLite persistence for the job queue and the status store.
//!
//! - `model`: row views returned by repositories.
//! - `repo`: SQL-only functions over the `jobs`, `job_outcomes` and `link_jobs` tables.
//!
//! Callers import from `backstroke_worker::db`; the repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{ClaimedJob, StoredOutcome};
