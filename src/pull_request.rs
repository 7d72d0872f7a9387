//! Opens the upstream→fork pull request, treating "already open" as success.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collaborator;
use crate::config::BotCredentials;
use crate::error::{ApiError, SyncError};
use crate::gatekeeper::OptOutCheck;
use crate::github::{GitHubApi, NewPullRequest};
use crate::model::{ForkTarget, TargetKind, Upstream, User};

pub fn pull_request_title(owner: &str, repo: &str, branch: &str) -> String {
    format!("Update from upstream repo {}/{}@{}", owner, repo, branch)
}

pub fn pull_request_body(owner: &str, repo: &str, branch: &str) -> String {
    format!(
        "Hello!
The remote `{owner}/{repo}@{branch}` has some new changes that aren't in this fork.
So, here they are, ready to be merged! :tada:

If this pull request can be merged without conflict, you can publish your software
with these new changes. Otherwise, fix any merge conflicts by clicking the `Resolve Conflicts`
button.

Have fun!
--------
Created by [Backstroke](http://backstroke.co) (I'm a bot!)
"
    )
}

#[derive(Clone)]
pub struct PullRequestIssuer {
    api: Arc<dyn GitHubApi>,
    opt_out: Arc<dyn OptOutCheck>,
    bot: BotCredentials,
}

impl PullRequestIssuer {
    pub fn new(api: Arc<dyn GitHubApi>, opt_out: Arc<dyn OptOutCheck>, bot: BotCredentials) -> Self {
        Self { api, opt_out, bot }
    }

    /// Head ref of the pull request: the upstream branch for real forks, the
    /// bot's branch named after the upstream owner for unrelated repositories.
    pub fn head_for(&self, upstream: &Upstream, target: &ForkTarget) -> String {
        match target.kind {
            TargetKind::Fork => format!("{}:{}", upstream.owner, upstream.branch),
            TargetKind::Unrelated => format!("{}:{}", self.bot.username, upstream.owner),
        }
    }

    pub fn build(&self, upstream: &Upstream, target: &ForkTarget) -> NewPullRequest {
        NewPullRequest {
            title: pull_request_title(&upstream.owner, &upstream.repo, &upstream.branch),
            head: self.head_for(upstream, target),
            base: target.branch.clone(),
            body: pull_request_body(&upstream.owner, &upstream.repo, &upstream.branch),
            maintainer_can_modify: false,
        }
    }

    /// Resolves with a human-readable confirmation.
    pub async fn create_pull_request(
        &self,
        user: &User,
        upstream: &Upstream,
        target: &ForkTarget,
    ) -> Result<String, SyncError> {
        let owner = target.owner.as_str();
        let repo = target.repo.as_str();

        if self
            .opt_out
            .opted_out(&user.access_token, owner, repo)
            .await?
        {
            warn!(owner, repo, "repo opted out of pull requests");
            return Err(SyncError::OptedOut);
        }

        if target.private {
            info!(owner, repo, bot = %self.bot.username, "fork is private; adding bot as collaborator");
            collaborator::grant_read_access(
                self.api.as_ref(),
                &user.access_token,
                owner,
                repo,
                &self.bot.username,
            )
            .await?;
        }

        let pull = self.build(upstream, target);
        match self
            .api
            .create_pull_request(&self.bot.token, owner, repo, &pull)
            .await
        {
            Ok(created) => {
                info!(owner, repo, number = created.number, head = %pull.head, base = %pull.base, "created pull request");
                Ok(format!("Successfully created pull request on {}/{}", owner, repo))
            }
            Err(ApiError::AlreadyExists) => {
                debug!(owner, repo, upstream_owner = %upstream.owner, upstream_repo = %upstream.repo, "pull request already open");
                Ok(format!("There's already a pull request on {}/{}", owner, repo))
            }
            Err(source) => Err(SyncError::PullRequest {
                owner: owner.to_string(),
                repo: repo.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_names_upstream() {
        assert_eq!(
            pull_request_title("1egoman", "backstroke", "master"),
            "Update from upstream repo 1egoman/backstroke@master"
        );
    }

    #[test]
    fn body_is_deterministic() {
        let body = pull_request_body("1egoman", "backstroke", "master");
        assert!(body.starts_with("Hello!\nThe remote `1egoman/backstroke@master`"));
        assert!(body.contains("(I'm a bot!)"));
        assert_eq!(body, pull_request_body("1egoman", "backstroke", "master"));
    }
}
