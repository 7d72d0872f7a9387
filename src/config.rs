//! Configuration loader and validator for the fork sync worker.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BOT_USERNAME: &str = "backstroke-bot";
pub const DEFAULT_API_BASE: &str = "https://api.github.com/";
pub const DEFAULT_WEB_BASE: &str = "https://github.com/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("credential not configured: {0}")]
    MissingCredential(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub github: GitHub,
}

/// Worker-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    /// Parent directory for temporary clones. System temp dir when unset.
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub min_rate_limit_remaining: u64,
}

/// GitHub API and bot identity settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHub {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_web_base")]
    pub web_base: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound on a single `git clone` or `git push`.
    #[serde(default = "default_git_timeout_ms")]
    pub git_timeout_ms: u64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub bot_username: Option<String>,
    /// Label a fork uses to opt in to fan-out pull requests. Fan-out skips the check when unset.
    #[serde(default)]
    pub opt_in_label: Option<String>,
}

impl fmt::Debug for GitHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHub")
            .field("api_base", &self.api_base)
            .field("web_base", &self.web_base)
            .field("timeout_ms", &self.timeout_ms)
            .field("git_timeout_ms", &self.git_timeout_ms)
            .field("bot_username", &self.bot_username)
            .field("opt_in_label", &self.opt_in_label)
            .finish_non_exhaustive()
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_web_base() -> String {
    DEFAULT_WEB_BASE.to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_git_timeout_ms() -> u64 {
    120_000
}

/// The identity pull requests are opened as.
#[derive(Clone, PartialEq, Eq)]
pub struct BotCredentials {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for BotCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` and `app.work_dir`).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if !self.app.data_dir.trim().is_empty() {
            fs::create_dir_all(&self.app.data_dir)?;
        }
        if let Some(work_dir) = self.work_dir() {
            fs::create_dir_all(work_dir)?;
        }
        Ok(())
    }

    pub fn work_dir(&self) -> Option<PathBuf> {
        self.app
            .work_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/backstroke.db", self.app.data_dir))
    }

    /// Bot identity for outbound pull requests. The username falls back to
    /// `backstroke-bot`; the token has no fallback.
    pub fn bot_credentials(&self) -> Result<BotCredentials, ConfigError> {
        let token = self
            .github
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingCredential("github.token"))?;
        let username = self
            .github
            .bot_username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BOT_USERNAME);
        Ok(BotCredentials {
            username: username.to_string(),
            token: token.to_string(),
        })
    }

    /// `GITHUB_TOKEN` and `GITHUB_BOT_USERNAME` take precedence over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                self.github.token = Some(token);
            }
        }
        if let Ok(username) = std::env::var("GITHUB_BOT_USERNAME") {
            if !username.trim().is_empty() {
                self.github.bot_username = Some(username);
            }
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if cfg.github.timeout_ms == 0 {
        return Err(ConfigError::Invalid("github.timeout_ms must be > 0"));
    }
    if cfg.github.git_timeout_ms == 0 {
        return Err(ConfigError::Invalid("github.git_timeout_ms must be > 0"));
    }
    if reqwest::Url::parse(&cfg.github.api_base).is_err() {
        return Err(ConfigError::Invalid("github.api_base must be a valid URL"));
    }
    if reqwest::Url::parse(&cfg.github.web_base).is_err() {
        return Err(ConfigError::Invalid("github.web_base must be a valid URL"));
    }
    if let Some(label) = &cfg.github.opt_in_label {
        if label.trim().is_empty() {
            return Err(ConfigError::Invalid("github.opt_in_label must be non-empty when set"));
        }
    }

    Ok(())
}

/// Example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  min_rate_limit_remaining: 50

github:
  api_base: "https://api.github.com/"
  web_base: "https://github.com/"
  timeout_ms: 5000
  git_timeout_ms: 120000
  token: "YOUR_BOT_GITHUB_TOKEN"
  bot_username: "backstroke-bot"
"#
}
