use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config;
use crate::error::ApiError;
use crate::paginate::PageRequest;

pub mod model;

pub use model::{Issue, NewPullRequest, Permission, PullRequest, Repository};

const USER_AGENT: &str = "backstroke-worker/0.1";
const ACCEPT: &str = "application/vnd.github+json";

/// The slice of the GitHub REST API the worker needs. Every call names the
/// token it acts with, so the same client serves link owners and the bot.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn list_forks(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Vec<Repository>, ApiError>;

    async fn list_issues_with_label(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        label: &str,
        per_page: u32,
    ) -> Result<Vec<Issue>, ApiError>;

    async fn add_collaborator(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        username: &str,
        permission: Permission,
    ) -> Result<(), ApiError>;

    /// A 422 response is reported as `ApiError::AlreadyExists`.
    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, ApiError>;

    /// Forks `owner/repo` into the token's account. Returns the existing fork if there is one.
    async fn create_fork(&self, token: &str, owner: &str, repo: &str)
        -> Result<Repository, ApiError>;

    async fn rate_limit_remaining(&self, token: &str) -> Result<u64, ApiError>;
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn from_config(cfg: &config::GitHub) -> Result<Self> {
        let base_url = Url::parse(&cfg.api_base).context("invalid GitHub API base URL")?;
        Self::with_base_url(base_url, Duration::from_millis(cfg.timeout_ms))
    }

    pub fn with_base_url(mut base_url: Url, timeout: Duration) -> Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self { http, base_url })
    }

    pub fn build_request(
        &self,
        method: Method,
        token: &str,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, ApiError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|err| ApiError::Decode(format!("invalid endpoint {}: {}", path, err)))?;
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("token {}", token))
            .header("Accept", ACCEPT);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn send(&self, request: reqwest::Request) -> Result<Response, ApiError> {
        debug!(method=%request.method(), url=%request.url(), "sending github request");
        let res = self.http.execute(request).await?;
        debug!(status=%res.status(), "github response");
        Ok(res)
    }

    async fn check(res: Response) -> Result<Response, ApiError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
        let res = Self::check(res).await?;
        res.json::<T>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }
}

/// Turns a non-success response into an `ApiError`.
pub fn classify_error(status: StatusCode, body: &str) -> ApiError {
    let parsed: model::ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        });
    if parsed
        .errors
        .iter()
        .any(|e| e.code.as_deref() == Some("invalid"))
    {
        return ApiError::Invalid { message };
    }
    if status == StatusCode::NOT_FOUND {
        return ApiError::NotFound { message };
    }
    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn list_forks(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        page: PageRequest,
    ) -> Result<Vec<Repository>, ApiError> {
        let request = self.build_request(
            Method::GET,
            token,
            &format!("repos/{}/{}/forks", owner, repo),
            &[
                ("page", page.page.to_string()),
                ("per_page", page.per_page.to_string()),
            ],
            None,
        )?;
        let res = self.send(request).await?;
        Self::json(res).await
    }

    async fn list_issues_with_label(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        label: &str,
        per_page: u32,
    ) -> Result<Vec<Issue>, ApiError> {
        let request = self.build_request(
            Method::GET,
            token,
            &format!("repos/{}/{}/issues", owner, repo),
            &[
                ("labels", label.to_string()),
                ("per_page", per_page.to_string()),
            ],
            None,
        )?;
        let res = self.send(request).await?;
        Self::json(res).await
    }

    async fn add_collaborator(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        username: &str,
        permission: Permission,
    ) -> Result<(), ApiError> {
        let body = json!({ "permission": permission.as_str() });
        let request = self.build_request(
            Method::PUT,
            token,
            &format!("repos/{}/{}/collaborators/{}", owner, repo, username),
            &[],
            Some(&body),
        )?;
        let res = self.send(request).await?;
        Self::check(res).await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, ApiError> {
        let body = serde_json::to_value(pull).map_err(|err| ApiError::Decode(err.to_string()))?;
        let request = self.build_request(
            Method::POST,
            token,
            &format!("repos/{}/{}/pulls", owner, repo),
            &[],
            Some(&body),
        )?;
        let res = self.send(request).await?;
        if res.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(ApiError::AlreadyExists);
        }
        Self::json(res).await
    }

    async fn create_fork(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
    ) -> Result<Repository, ApiError> {
        let request = self.build_request(
            Method::POST,
            token,
            &format!("repos/{}/{}/forks", owner, repo),
            &[],
            Some(&json!({})),
        )?;
        let res = self.send(request).await?;
        Self::json(res).await
    }

    async fn rate_limit_remaining(&self, token: &str) -> Result<u64, ApiError> {
        let request = self.build_request(Method::GET, token, "rate_limit", &[], None)?;
        let res = self.send(request).await?;
        let payload: model::RateLimitResponse = Self::json(res).await?;
        Ok(payload.resources.core.remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubClient {
        GitHubClient::with_base_url(
            Url::parse("https://api.github.com").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn build_request_sets_headers_and_query() {
        let request = client()
            .build_request(
                Method::GET,
                "abc",
                "repos/1egoman/backstroke/forks",
                &[("page", "2".into()), ("per_page", "100".into())],
                None,
            )
            .unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url().path(), "/repos/1egoman/backstroke/forks");
        assert_eq!(request.url().query(), Some("page=2&per_page=100"));
        let headers = request.headers();
        assert_eq!(
            headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "token abc"
        );
        assert_eq!(
            headers.get("Accept").and_then(|h| h.to_str().ok()).unwrap(),
            ACCEPT
        );
    }

    #[test]
    fn build_request_keeps_api_prefix() {
        let client = GitHubClient::with_base_url(
            Url::parse("https://ghe.example.com/api/v3").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        let body = json!({ "permission": "pull" });
        let request = client
            .build_request(
                Method::PUT,
                "abc",
                "repos/rgaus/biome/collaborators/backstroke-bot",
                &[],
                Some(&body),
            )
            .unwrap();
        assert_eq!(
            request.url().path(),
            "/api/v3/repos/rgaus/biome/collaborators/backstroke-bot"
        );
        assert_eq!(
            request
                .headers()
                .get("Content-Type")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "application/json"
        );
    }

    #[test]
    fn classify_invalid_code() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"Issue","code":"invalid"}]}"#;
        match classify_error(StatusCode::UNPROCESSABLE_ENTITY, body) {
            ApiError::Invalid { message } => assert_eq!(message, "Validation Failed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn classify_not_found_and_plain_status() {
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#),
            ApiError::NotFound { .. }
        ));
        match classify_error(StatusCode::BAD_GATEWAY, "<html>oops</html>") {
            ApiError::Status { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
