use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// HTTP basic credentials for a push.
#[derive(Clone, PartialEq, Eq)]
pub struct GitAuth {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl GitAuth {
    /// `http.extraheader` value carrying the credentials.
    pub fn extra_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.token);
        format!("AUTHORIZATION: basic {}", STANDARD.encode(raw))
    }
}

#[async_trait]
pub trait GitTransport: Send + Sync {
    /// Clones `branch` of `url` into `dest`, which must not exist yet.
    async fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;

    /// Pushes `refspec` from the repository at `workdir` to an anonymous remote at `remote_url`.
    async fn push(&self, workdir: &Path, remote_url: &str, refspec: &str, auth: &GitAuth)
        -> Result<()>;
}

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Drives the `git` binary on PATH. Each invocation is killed once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: OsString,
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ensure the git binary is available by invoking `git --version`.
    pub async fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => Err(anyhow!("git not available (exit status {})", s)),
            Err(e) => Err(anyhow!("git not available: {}", e)),
        }
    }

    async fn run(&self, args: Vec<OsString>, what: &str) -> Result<()> {
        let child = Command::new(&self.program)
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output();
        // Dropping the timed-out future drops the child, which kills it.
        let output = timeout(self.timeout, child)
            .await
            .map_err(|_| anyhow!("git {} timed out after {:?}", what, self.timeout))?
            .with_context(|| format!("failed to spawn git for {}", what))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "git {} exited with status {}: {}",
                what,
                output.status,
                stderr.trim()
            ));
        }
        Ok(())
    }
}

pub fn clone_args(url: &str, branch: &str, dest: &Path) -> Vec<OsString> {
    vec![
        "clone".into(),
        "--quiet".into(),
        "--single-branch".into(),
        "--branch".into(),
        branch.into(),
        url.into(),
        dest.as_os_str().to_os_string(),
    ]
}

pub fn push_args(workdir: &Path, remote_url: &str, refspec: &str, auth: &GitAuth) -> Vec<OsString> {
    vec![
        "-C".into(),
        workdir.as_os_str().to_os_string(),
        "-c".into(),
        format!("http.extraheader={}", auth.extra_header()).into(),
        "push".into(),
        "--quiet".into(),
        remote_url.into(),
        refspec.into(),
    ]
}

#[async_trait]
impl GitTransport for GitCli {
    async fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        debug!(url, branch, dest = %dest.display(), "git clone");
        self.run(clone_args(url, branch, dest), "clone").await
    }

    async fn push(
        &self,
        workdir: &Path,
        remote_url: &str,
        refspec: &str,
        auth: &GitAuth,
    ) -> Result<()> {
        debug!(remote_url, refspec, "git push");
        self.run(push_args(workdir, remote_url, refspec, auth), "push")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> GitAuth {
        GitAuth {
            username: "backstroke-bot".into(),
            token: "s3cret".into(),
        }
    }

    #[test]
    fn extra_header_is_basic_auth() {
        let header = auth().extra_header();
        assert_eq!(
            header,
            format!(
                "AUTHORIZATION: basic {}",
                STANDARD.encode("backstroke-bot:s3cret")
            )
        );
        assert!(!format!("{:?}", auth()).contains("s3cret"));
    }

    #[test]
    fn clone_args_pin_branch() {
        let args = clone_args(
            "https://github.com/1egoman/backstroke",
            "master",
            Path::new("/tmp/x/backstroke"),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "clone",
                "--quiet",
                "--single-branch",
                "--branch",
                "master",
                "https://github.com/1egoman/backstroke",
                "/tmp/x/backstroke",
            ]
        );
    }

    #[test]
    fn push_args_keep_credentials_out_of_url() {
        let args = push_args(
            Path::new("/tmp/x/backstroke"),
            "https://github.com/backstroke-bot/dup",
            "+refs/heads/master:refs/heads/1egoman",
            &auth(),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-C");
        assert!(args[3].starts_with("http.extraheader=AUTHORIZATION: basic "));
        assert_eq!(args[4], "push");
        assert_eq!(args[6], "https://github.com/backstroke-bot/dup");
        assert!(!args[6].contains("s3cret"));
        assert_eq!(args[7], "+refs/heads/master:refs/heads/1egoman");
    }

    #[tokio::test]
    async fn stalled_command_times_out() {
        let git = GitCli::new("sleep").with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = git.run(vec!["5".into()], "push").await.unwrap_err();
        assert!(err.to_string().starts_with("git push timed out after"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let git = GitCli::new("definitely-not-a-git-binary-xyz");
        let err = git.ensure_available().await.unwrap_err();
        assert!(err.to_string().starts_with("git not available"));
    }
}
