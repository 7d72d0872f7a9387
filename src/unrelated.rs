//! Moves upstream content into a repository that shares no history with it.
//!
//! The bot forks the target, receives a copy of the upstream branch on a
//! branch named after the upstream owner, and the pull request is then opened
//! from that branch. The clone lives in a temporary directory that is removed
//! when the sync returns, whichever way it returns.
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Url;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::config::BotCredentials;
use crate::error::SyncError;
use crate::git::{GitAuth, GitTransport};
use crate::github::GitHubApi;
use crate::model::{ForkTarget, Upstream};

/// Where temporary clones are created.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    root: Option<PathBuf>,
}

impl Workspace {
    /// `None` means the system temp dir.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn acquire(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("backstroke-");
        match &self.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }
}

/// Refspec pushing the upstream branch to a bot branch named after the upstream owner.
pub fn sync_refspec(upstream: &Upstream) -> String {
    format!(
        "+refs/heads/{}:refs/heads/{}",
        upstream.branch, upstream.owner
    )
}

#[derive(Clone)]
pub struct UnrelatedRepoSync {
    api: Arc<dyn GitHubApi>,
    git: Arc<dyn GitTransport>,
    workspace: Workspace,
    bot: BotCredentials,
    web_base: Url,
}

impl UnrelatedRepoSync {
    pub fn new(
        api: Arc<dyn GitHubApi>,
        git: Arc<dyn GitTransport>,
        workspace: Workspace,
        bot: BotCredentials,
        mut web_base: Url,
    ) -> Self {
        if !web_base.path().ends_with('/') {
            let path = format!("{}/", web_base.path());
            web_base.set_path(&path);
        }
        Self {
            api,
            git,
            workspace,
            bot,
            web_base,
        }
    }

    pub fn repo_url(&self, owner: &str, repo: &str) -> Result<String, SyncError> {
        self.web_base
            .join(&format!("{}/{}", owner, repo))
            .map(String::from)
            .map_err(|err| SyncError::Clone {
                url: format!("{}{}/{}", self.web_base, owner, repo),
                reason: err.to_string(),
            })
    }

    /// On success the bot owns `{bot}/{target.repo}` with branch `{upstream.owner}`
    /// holding the upstream branch's content.
    #[instrument(skip_all, fields(upstream = %format!("{}/{}", upstream.owner, upstream.repo), target = %target.full_name()))]
    pub async fn sync(&self, upstream: &Upstream, target: &ForkTarget) -> Result<(), SyncError> {
        let fork = self
            .api
            .create_fork(&self.bot.token, &target.owner, &target.repo)
            .await
            .map_err(|source| SyncError::CreateFork {
                bot: self.bot.username.clone(),
                owner: target.owner.clone(),
                repo: target.repo.clone(),
                source,
            })?;
        debug!(fork_owner = %fork.owner.login, fork_repo = %fork.name, "bot fork ready");

        let source_url = self.repo_url(&upstream.owner, &upstream.repo)?;
        let remote_url = self.repo_url(&self.bot.username, &fork.name)?;

        let dir = self.workspace.acquire().map_err(SyncError::Workspace)?;
        let checkout = dir.path().join(&upstream.repo);

        self.git
            .clone_repo(&source_url, &upstream.branch, &checkout)
            .await
            .map_err(|err| SyncError::Clone {
                url: source_url.clone(),
                reason: format!("{:#}", err),
            })?;

        let auth = GitAuth {
            username: self.bot.username.clone(),
            token: self.bot.token.clone(),
        };
        let refspec = sync_refspec(upstream);
        if let Err(err) = self
            .git
            .push(&checkout, &remote_url, &refspec, &auth)
            .await
        {
            warn!(error = %format!("{:#}", err), "push to bot fork failed");
            return Err(SyncError::Push {
                bot: self.bot.username.clone(),
                branch: upstream.owner.clone(),
                reason: format!("{:#}", err),
            });
        }

        info!(remote = %remote_url, refspec = %refspec, "pushed upstream into bot fork");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> Upstream {
        Upstream {
            owner: "1egoman".into(),
            repo: "backstroke".into(),
            branch: "master".into(),
        }
    }

    #[test]
    fn refspec_targets_owner_branch() {
        assert_eq!(
            sync_refspec(&upstream()),
            "+refs/heads/master:refs/heads/1egoman"
        );
    }

    #[test]
    fn workspace_dirs_are_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::new(Some(root.path().to_path_buf()));
        let dir = ws.acquire().unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.starts_with(root.path()));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .starts_with("backstroke-"));
        drop(dir);
        assert!(!path.exists());
    }
}
