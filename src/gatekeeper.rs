//! Opt-out and opt-in checks for candidate forks.
//!
//! A repository signals its choice with an open issue carrying a well-known
//! label. One such issue is enough, so the lookup asks for a single item.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SyncError;
use crate::github::GitHubApi;

pub const OPT_OUT_LABEL: &str = "optout";

#[async_trait]
pub trait OptOutCheck: Send + Sync {
    async fn opted_out(&self, token: &str, owner: &str, repo: &str) -> Result<bool, SyncError>;
}

#[async_trait]
pub trait OptInCheck: Send + Sync {
    async fn opted_in(&self, token: &str, owner: &str, repo: &str) -> Result<bool, SyncError>;
}

/// Looks for an open issue with `label` on the target repository.
#[derive(Clone)]
pub struct LabelGatekeeper {
    api: Arc<dyn GitHubApi>,
    label: String,
}

impl LabelGatekeeper {
    pub fn new(api: Arc<dyn GitHubApi>, label: impl Into<String>) -> Self {
        Self {
            api,
            label: label.into(),
        }
    }

    pub fn opt_out(api: Arc<dyn GitHubApi>) -> Self {
        Self::new(api, OPT_OUT_LABEL)
    }

    pub async fn has_labelled_issue(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<bool, SyncError> {
        let issues = self
            .api
            .list_issues_with_label(token, owner, repo, &self.label, 1)
            .await
            .map_err(|source| SyncError::from_label_query(owner, repo, source))?;
        debug!(owner, repo, label = %self.label, found = issues.len(), "label lookup");
        Ok(!issues.is_empty())
    }
}

#[async_trait]
impl OptOutCheck for LabelGatekeeper {
    async fn opted_out(&self, token: &str, owner: &str, repo: &str) -> Result<bool, SyncError> {
        self.has_labelled_issue(token, owner, repo).await
    }
}

#[async_trait]
impl OptInCheck for LabelGatekeeper {
    async fn opted_in(&self, token: &str, owner: &str, repo: &str) -> Result<bool, SyncError> {
        self.has_labelled_issue(token, owner, repo).await
    }
}
