//! Row views returned by repositories. No business logic here.

use crate::model::JobId;

/// A job row that has just been claimed by this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: JobId,
    pub kind: String,
    /// JSON-encoded job as it was enqueued.
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutcome {
    pub id: i64,
    pub job_id: JobId,
    pub status: String,
    /// JSON-encoded outcome record.
    pub record: String,
}
