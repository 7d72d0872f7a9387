//! Claims one job at a time and turns it into exactly one outcome record.
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Url;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::config::Config;
use crate::error::{ApiError, SyncError};
use crate::gatekeeper::{LabelGatekeeper, OptInCheck};
use crate::git::GitTransport;
use crate::github::GitHubApi;
use crate::model::{
    ForkFailure, ForkTarget, ManyOutput, Metrics, OutcomeOutput, OutcomeRecord, SingleOutput,
    SyncJob, Upstream, User,
};
use crate::pull_request::PullRequestIssuer;
use crate::queue::{JobQueue, StatusStore};
use crate::resolver::{ForkResolver, Resolution};
use crate::unrelated::{UnrelatedRepoSync, Workspace};

pub struct BatchProcessor {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn StatusStore>,
    resolver: ForkResolver,
    issuer: PullRequestIssuer,
    unrelated: UnrelatedRepoSync,
    opt_in: Option<Arc<dyn OptInCheck>>,
}

impl BatchProcessor {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn StatusStore>,
        resolver: ForkResolver,
        issuer: PullRequestIssuer,
        unrelated: UnrelatedRepoSync,
    ) -> Self {
        Self {
            queue,
            store,
            resolver,
            issuer,
            unrelated,
            opt_in: None,
        }
    }

    /// Fan-out only opens pull requests on forks that pass `check`.
    pub fn with_opt_in(mut self, check: Arc<dyn OptInCheck>) -> Self {
        self.opt_in = Some(check);
        self
    }

    /// Wires every collaborator from configuration. Fails when no bot token is configured.
    pub fn from_config(
        cfg: &Config,
        api: Arc<dyn GitHubApi>,
        git: Arc<dyn GitTransport>,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn StatusStore>,
    ) -> Result<Self> {
        let bot = cfg.bot_credentials()?;
        let web_base = Url::parse(&cfg.github.web_base).context("invalid GitHub web base URL")?;
        let opt_out = Arc::new(LabelGatekeeper::opt_out(api.clone()));
        let processor = Self::new(
            queue,
            store,
            ForkResolver::new(api.clone()),
            PullRequestIssuer::new(api.clone(), opt_out, bot.clone()),
            UnrelatedRepoSync::new(
                api.clone(),
                git,
                Workspace::new(cfg.work_dir()),
                bot,
                web_base,
            ),
        );
        Ok(match &cfg.github.opt_in_label {
            Some(label) => processor.with_opt_in(Arc::new(LabelGatekeeper::new(api, label.clone()))),
            None => processor,
        })
    }

    /// Processes the next queued job. Returns `false` when the queue was empty.
    ///
    /// Only queue and store failures come back as `Err`; everything that goes
    /// wrong while interpreting the job is recorded as its `ERROR` outcome.
    #[instrument(skip_all, fields(job_id = tracing::field::Empty, link_id = tracing::field::Empty))]
    pub async fn process_next(&self) -> Result<bool> {
        let Some(claimed) = self.queue.pop().await? else {
            return Ok(false);
        };
        let job_id = claimed.id;
        Span::current().record("job_id", job_id);

        let (record, link_id) = match serde_json::from_str::<SyncJob>(&claimed.payload) {
            Ok(job) => {
                Span::current().record("link_id", job.link.id);
                debug!(kind = job.kind.as_str(), "interpreting job");
                (self.run(&job).await, Some(job.link.id))
            }
            Err(err) => {
                let err = SyncError::MalformedJob(err);
                warn!(error = %err, "dropping malformed job");
                (OutcomeRecord::error(err.to_string(), None), None)
            }
        };

        if let Err(err) = self.store.set(job_id, &record).await {
            error!(?err, job_id, record = ?record, "failed to store outcome; outcome lost");
            return Err(err);
        }
        if let Some(link_id) = link_id {
            if let Err(err) = self.store.attach_to_link(link_id, job_id).await {
                error!(?err, job_id, link_id, "outcome stored but not attached to link history");
                return Err(err);
            }
        }

        match record.error_message() {
            Some(error) => info!(status = record.status.as_str(), error, "job finished"),
            None => info!(status = record.status.as_str(), "job finished"),
        }
        Ok(true)
    }

    async fn run(&self, job: &SyncJob) -> OutcomeRecord {
        match self.interpret(job).await {
            Ok(output) => OutcomeRecord::ok(output, job.from_request.clone()),
            Err(err) => OutcomeRecord::error(err.to_string(), job.from_request.clone()),
        }
    }

    async fn interpret(&self, job: &SyncJob) -> Result<OutcomeOutput, SyncError> {
        let link = job.link.validate()?;
        match self.resolver.resolve(&job.user, &link).await? {
            Resolution::Single(target) => {
                let response = self
                    .issuer
                    .create_pull_request(&job.user, &link.upstream, &target)
                    .await?;
                Ok(OutcomeOutput::Single(SingleOutput::fork(response)))
            }
            Resolution::Unrelated(target) => {
                self.unrelated.sync(&link.upstream, &target).await?;
                let response = self
                    .issuer
                    .create_pull_request(&job.user, &link.upstream, &target)
                    .await?;
                Ok(OutcomeOutput::Single(SingleOutput::unrelated(response)))
            }
            Resolution::Many(targets) => Ok(OutcomeOutput::Many(
                self.fan_out(&job.user, &link.upstream, targets).await,
            )),
        }
    }

    /// Forks are handled one after another in listing order. Every attempt
    /// counts towards `total`; a failed one, opt-out included, is recorded
    /// and the loop moves on. Only forks that decline opt-in are skipped.
    async fn fan_out(&self, user: &User, upstream: &Upstream, targets: Vec<ForkTarget>) -> ManyOutput {
        let mut metrics = Metrics::default();
        let mut errors = Vec::new();

        for target in targets {
            let result = match self.admit(user, &target).await {
                Ok(true) => {
                    self.issuer
                        .create_pull_request(user, upstream, &target)
                        .await
                }
                Ok(false) => {
                    debug!(fork = %target.full_name(), "fork did not opt in; skipping");
                    continue;
                }
                Err(err) => Err(err),
            };

            match result {
                Ok(response) => {
                    metrics.total += 1;
                    metrics.successes += 1;
                    debug!(fork = %target.full_name(), response = %response, "fork updated");
                }
                Err(err) => {
                    metrics.total += 1;
                    warn!(fork = %target.full_name(), error = %err, "fork update failed");
                    errors.push(ForkFailure::new(err.to_string()));
                }
            }
        }

        info!(total = metrics.total, successes = metrics.successes, "fan-out finished");
        ManyOutput {
            many: true,
            metrics,
            errors,
            is_enabled: true,
        }
    }

    async fn admit(&self, user: &User, target: &ForkTarget) -> Result<bool, SyncError> {
        match &self.opt_in {
            Some(check) => {
                check
                    .opted_in(&user.access_token, &target.owner, &target.repo)
                    .await
            }
            None => Ok(true),
        }
    }
}

/// Holds the worker back while the bot token is close to exhausting its API quota.
#[derive(Clone)]
pub struct RateLimitGuard {
    api: Arc<dyn GitHubApi>,
    token: String,
    minimum: u64,
}

impl RateLimitGuard {
    pub fn new(api: Arc<dyn GitHubApi>, token: impl Into<String>, minimum: u64) -> Self {
        Self {
            api,
            token: token.into(),
            minimum,
        }
    }

    /// A zero minimum disables the check without calling the API.
    pub async fn should_pause(&self) -> Result<bool, ApiError> {
        if self.minimum == 0 {
            return Ok(false);
        }
        let remaining = self.api.rate_limit_remaining(&self.token).await?;
        if remaining < self.minimum {
            warn!(remaining, minimum = self.minimum, "rate limit low; pausing");
            return Ok(true);
        }
        Ok(false)
    }
}
