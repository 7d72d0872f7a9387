//! Fork sync worker: claims sync jobs from a queue, opens upstream pull
//! requests on the configured forks and records one outcome per job.

pub mod collaborator;
pub mod config;
pub mod db;
pub mod error;
pub mod gatekeeper;
pub mod git;
pub mod github;
pub mod model;
pub mod paginate;
pub mod pull_request;
pub mod queue;
pub mod resolver;
pub mod unrelated;
pub mod worker;
