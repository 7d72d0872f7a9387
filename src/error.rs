//! Error types shared by the GitHub boundary and the job interpreter.
//!
//! `ApiError` is what the hosting API hands back; `SyncError` is what a job
//! turns into. The `Display` text of a `SyncError` is exactly the message
//! stored in the job's `ERROR` outcome, so wording here is part of the
//! outcome contract.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 422 on pull request creation: one is already open for this head/base.
    #[error("A pull request already exists")]
    AlreadyExists,
    /// Validation failure with code `invalid`; GitHub's way of saying the repository is gone.
    #[error("{message}")]
    Invalid { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid GitHub response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Link is not enabled.")]
    LinkDisabled,
    #[error("Please define both an upstream and fork on this link.")]
    IncompleteLink,
    #[error("This repo opted out of backstroke pull requests")]
    OptedOut,
    #[error("Repository {owner}/{repo} doesn't exist.")]
    RepositoryMissing { owner: String, repo: String },
    #[error("Couldn't search issues on repository {owner}/{repo}: {source}")]
    LabelQuery {
        owner: String,
        repo: String,
        source: ApiError,
    },
    #[error("Couldn't make the {bot} bot user a collaborator on {owner}/{repo}: {source}")]
    Collaborator {
        bot: String,
        owner: String,
        repo: String,
        source: ApiError,
    },
    #[error("Couldn't create pull request on repository {owner}/{repo}: {source}")]
    PullRequest {
        owner: String,
        repo: String,
        source: ApiError,
    },
    #[error("Couldn't get forks for repository {owner}/{repo}: {source}")]
    ListForks {
        owner: String,
        repo: String,
        source: ApiError,
    },
    #[error("Couldn't fork {owner}/{repo} into {bot}: {source}")]
    CreateFork {
        bot: String,
        owner: String,
        repo: String,
        source: ApiError,
    },
    #[error("Couldn't clone {url}: {reason}")]
    Clone { url: String, reason: String },
    #[error("Error received while pushing {bot}/{branch}: {reason}")]
    Push {
        bot: String,
        branch: String,
        reason: String,
    },
    #[error("Couldn't prepare a working directory: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("Malformed job payload: {0}")]
    MalformedJob(#[from] serde_json::Error),
}

impl SyncError {
    /// Maps a failed label lookup; `invalid` or 404 means the repository is missing.
    pub fn from_label_query(owner: &str, repo: &str, source: ApiError) -> Self {
        match source {
            ApiError::Invalid { .. } | ApiError::NotFound { .. } => SyncError::RepositoryMissing {
                owner: owner.to_string(),
                repo: repo.to_string(),
            },
            source => SyncError::LabelQuery {
                owner: owner.to_string(),
                repo: repo.to_string(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_messages_are_exact() {
        assert_eq!(SyncError::LinkDisabled.to_string(), "Link is not enabled.");
        assert_eq!(
            SyncError::IncompleteLink.to_string(),
            "Please define both an upstream and fork on this link."
        );
        assert_eq!(
            SyncError::OptedOut.to_string(),
            "This repo opted out of backstroke pull requests"
        );
    }

    #[test]
    fn pull_request_error_names_target() {
        let err = SyncError::PullRequest {
            owner: "rgaus".into(),
            repo: "biome".into(),
            source: ApiError::status(500, "Unknown Error!"),
        };
        assert_eq!(
            err.to_string(),
            "Couldn't create pull request on repository rgaus/biome: Unknown Error!"
        );
    }

    #[test]
    fn invalid_label_query_means_missing_repository() {
        let err = SyncError::from_label_query(
            "foo",
            "bar",
            ApiError::Invalid {
                message: "Validation Failed".into(),
            },
        );
        assert_eq!(err.to_string(), "Repository foo/bar doesn't exist.");

        let err = SyncError::from_label_query("foo", "bar", ApiError::status(502, "Bad Gateway"));
        assert_eq!(
            err.to_string(),
            "Couldn't search issues on repository foo/bar: Bad Gateway"
        );
    }
}
