use tracing::info;

use crate::error::{ApiError, SyncError};
use crate::github::{GitHubApi, Permission};

/// Adds `bot` to `owner/repo` with read-only access, acting with `owner_token`.
///
/// Adding collaborators requires admin rights on the repository; `owner_token`
/// must carry them.
pub async fn grant_read_access(
    api: &dyn GitHubApi,
    owner_token: &str,
    owner: &str,
    repo: &str,
    bot: &str,
) -> Result<(), SyncError> {
    api.add_collaborator(owner_token, owner, repo, bot, Permission::Pull)
        .await
        .map_err(|source| match source {
            ApiError::Invalid { .. } | ApiError::NotFound { .. } => SyncError::RepositoryMissing {
                owner: owner.to_string(),
                repo: repo.to_string(),
            },
            source => SyncError::Collaborator {
                bot: bot.to_string(),
                owner: owner.to_string(),
                repo: repo.to_string(),
                source,
            },
        })?;
    info!(owner, repo, bot, "granted bot read access");
    Ok(())
}
