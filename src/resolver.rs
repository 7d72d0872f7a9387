use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::SyncError;
use crate::github::{GitHubApi, Repository};
use crate::model::{ForkSpec, ForkTarget, TargetKind, Upstream, User, ValidLink};
use crate::paginate::{paginate, DEFAULT_PAGE_SIZE};

/// Fork targets of one link, in the order they must be acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Single(ForkTarget),
    Many(Vec<ForkTarget>),
    Unrelated(ForkTarget),
}

#[derive(Clone)]
pub struct ForkResolver {
    api: Arc<dyn GitHubApi>,
    page_size: u32,
}

impl ForkResolver {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self {
            api,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[instrument(skip_all, fields(link_id = link.id, strategy = link.fork.strategy().as_str()))]
    pub async fn resolve(&self, user: &User, link: &ValidLink) -> Result<Resolution, SyncError> {
        match &link.fork {
            ForkSpec::Single(fork) => Ok(Resolution::Single(ForkTarget::from_ref(
                fork,
                TargetKind::Fork,
            ))),
            ForkSpec::Unrelated(fork) => Ok(Resolution::Unrelated(ForkTarget::from_ref(
                fork,
                TargetKind::Unrelated,
            ))),
            ForkSpec::All => {
                let forks = self.list_all_forks(user, &link.upstream).await?;
                debug!(count = forks.len(), "resolved forks");
                Ok(Resolution::Many(
                    forks
                        .into_iter()
                        .map(|r| fork_target(r, &link.upstream))
                        .collect(),
                ))
            }
        }
    }

    async fn list_all_forks(
        &self,
        user: &User,
        upstream: &Upstream,
    ) -> Result<Vec<Repository>, SyncError> {
        let api = self.api.as_ref();
        let token = user.access_token.as_str();
        let owner = upstream.owner.as_str();
        let repo = upstream.repo.as_str();
        paginate(self.page_size, move |page| {
            api.list_forks(token, owner, repo, page)
        })
        .await
        .map_err(|source| SyncError::ListForks {
            owner: owner.to_string(),
            repo: repo.to_string(),
            source,
        })
    }
}

/// Fan-out pull requests target the upstream branch name on every fork.
fn fork_target(repo: Repository, upstream: &Upstream) -> ForkTarget {
    ForkTarget {
        owner: repo.owner.login,
        repo: repo.name,
        branch: upstream.branch.clone(),
        private: repo.private,
        kind: TargetKind::Fork,
    }
}
