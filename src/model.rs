use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub type JobId = i64;
pub type LinkId = i64;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid repository name pattern"));
/// Sequences `git check-ref-format` refuses anywhere in a branch name.
static BRANCH_FORBIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s\x00-\x1f\x7f:~^?*\[\\]|\.\.|@\{|//|/\.")
        .expect("valid branch name pattern")
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Manual,
    Automatic,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Manual => "MANUAL",
            JobKind::Automatic => "AUTOMATIC",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ForkStrategy {
    #[serde(rename = "repo")]
    SingleFork,
    #[serde(rename = "fork-all")]
    ForkAll,
    #[serde(rename = "unrelated-repo")]
    UnrelatedRepo,
}

impl ForkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForkStrategy::SingleFork => "repo",
            ForkStrategy::ForkAll => "fork-all",
            ForkStrategy::UnrelatedRepo => "unrelated-repo",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamDescriptor {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Fork side of a link. `owner`, `repo` and `branch` stay empty under `fork-all`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForkDescriptor {
    #[serde(rename = "type", default)]
    pub strategy: Option<ForkStrategy>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: LinkId,
    #[serde(default)]
    pub name: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub upstream: Option<UpstreamDescriptor>,
    #[serde(default)]
    pub fork: Option<ForkDescriptor>,
    #[serde(default)]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Holder of the link owner's access token. Never mutated by the worker.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    pub access_token: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub user: User,
    pub link: Link,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_request: Option<String>,
}

/// Upstream side of a link once every field is known to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkSpec {
    Single(RepoRef),
    All,
    Unrelated(RepoRef),
}

impl ForkSpec {
    pub fn strategy(&self) -> ForkStrategy {
        match self {
            ForkSpec::Single(_) => ForkStrategy::SingleFork,
            ForkSpec::All => ForkStrategy::ForkAll,
            ForkSpec::Unrelated(_) => ForkStrategy::UnrelatedRepo,
        }
    }
}

/// An actionable link: enabled, with a complete upstream and fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidLink {
    pub id: LinkId,
    pub upstream: Upstream,
    pub fork: ForkSpec,
}

impl Link {
    /// Checks `enabled` first, then completeness of both descriptors.
    pub fn validate(&self) -> Result<ValidLink, SyncError> {
        if !self.enabled {
            return Err(SyncError::LinkDisabled);
        }
        let upstream = self.upstream.as_ref().ok_or(SyncError::IncompleteLink)?;
        let fork = self.fork.as_ref().ok_or(SyncError::IncompleteLink)?;
        let strategy = fork.strategy.ok_or(SyncError::IncompleteLink)?;

        let upstream = Upstream {
            owner: required_name(&upstream.owner)?,
            repo: required_name(&upstream.repo)?,
            branch: required_branch(&upstream.branch)?,
        };

        let fork = match strategy {
            ForkStrategy::ForkAll => ForkSpec::All,
            ForkStrategy::SingleFork => ForkSpec::Single(repo_ref(fork)?),
            ForkStrategy::UnrelatedRepo => ForkSpec::Unrelated(repo_ref(fork)?),
        };

        Ok(ValidLink {
            id: self.id,
            upstream,
            fork,
        })
    }
}

fn repo_ref(fork: &ForkDescriptor) -> Result<RepoRef, SyncError> {
    Ok(RepoRef {
        owner: required_name(&fork.owner)?,
        repo: required_name(&fork.repo)?,
        branch: required_branch(&fork.branch)?,
        private: fork.private,
    })
}

fn required_name(value: &Option<String>) -> Result<String, SyncError> {
    match value.as_deref().map(str::trim) {
        Some(v) if NAME_RE.is_match(v) => Ok(v.to_string()),
        _ => Err(SyncError::IncompleteLink),
    }
}

fn required_branch(value: &Option<String>) -> Result<String, SyncError> {
    match value.as_deref().map(str::trim) {
        Some(v) if is_valid_branch(v) => Ok(v.to_string()),
        _ => Err(SyncError::IncompleteLink),
    }
}

/// Accepts any name git accepts as a branch; rejects what would break a refspec.
pub fn is_valid_branch(name: &str) -> bool {
    !name.is_empty()
        && name != "@"
        && !name.starts_with(&['/', '-', '.'][..])
        && !name.ends_with(&['/', '.'][..])
        && !name.ends_with(".lock")
        && !BRANCH_FORBIDDEN_RE.is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A git fork of the upstream; the upstream branch can be the pull request head.
    Fork,
    /// No shared history; content goes through the bot's branch first.
    Unrelated,
}

/// One repository a pull request will be opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkTarget {
    pub owner: String,
    pub repo: String,
    /// Base branch of the pull request.
    pub branch: String,
    pub private: bool,
    pub kind: TargetKind,
}

impl ForkTarget {
    pub fn from_ref(repo: &RepoRef, kind: TargetKind) -> Self {
        Self {
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            branch: repo.branch.clone(),
            private: repo.private,
            kind,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutcomeStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Ok => "OK",
            OutcomeStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorOutput {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SingleOutput {
    pub is_enabled: bool,
    pub many: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrelated_forks: Option<bool>,
    pub fork_count: usize,
    pub response: String,
}

impl SingleOutput {
    pub fn fork(response: String) -> Self {
        Self {
            is_enabled: true,
            many: false,
            unrelated_forks: None,
            fork_count: 1,
            response,
        }
    }

    pub fn unrelated(response: String) -> Self {
        Self {
            unrelated_forks: Some(true),
            ..Self::fork(response)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    pub total: usize,
    pub successes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForkFailure {
    pub status: OutcomeStatus,
    pub error: String,
}

impl ForkFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManyOutput {
    pub many: bool,
    pub metrics: Metrics,
    pub errors: Vec<ForkFailure>,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OutcomeOutput {
    Error(ErrorOutput),
    Single(SingleOutput),
    Many(ManyOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub status: OutcomeStatus,
    pub output: OutcomeOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_request: Option<String>,
}

impl OutcomeRecord {
    pub fn ok(output: OutcomeOutput, from_request: Option<String>) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            output,
            from_request,
        }
    }

    pub fn error(message: impl Into<String>, from_request: Option<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            output: OutcomeOutput::Error(ErrorOutput {
                error: message.into(),
            }),
            from_request,
        }
    }

    /// Message of an `ERROR` record.
    pub fn error_message(&self) -> Option<&str> {
        match &self.output {
            OutcomeOutput::Error(e) => Some(&e.error),
            _ => None,
        }
    }
}
