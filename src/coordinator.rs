//! Race coordinator.
//!
//! Gates the race on the predictor, launches one worker per identity with a
//! small stagger, waits for all of them and reports whether the target was
//! claimed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::codec::PostId;
use crate::config::{Config, ConfigError, RaceConfig};
use crate::observer::{RaceObserver, TracingObserver};
use crate::platform::{ContentPlatform, Location, PlatformError, RedditClient};
use crate::predictor::{Forecast, GateError, GateReport, Predictor};
use crate::worker::{Bodies, RacingWorker, RetryPolicy, WorkerOutcome};

/// Set once, by the worker whose post received the target identifier.
///
/// Identifier uniqueness means at most one worker can ever hit, but the flag
/// is still atomic so the read after joining sees the write.
#[derive(Debug, Default)]
pub struct ClaimedFlag(AtomicBool);

impl ClaimedFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark the target as claimed. Returns `true` only for the first caller.
    pub fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A client the race may use, with a label for logs.
#[derive(Clone)]
pub struct Identity {
    pub label: String,
    pub platform: Arc<dyn ContentPlatform>,
}

impl Identity {
    pub fn new(label: impl Into<String>, platform: Arc<dyn ContentPlatform>) -> Self {
        Self {
            label: label.into(),
            platform,
        }
    }
}

/// One Reddit identity per configured client.
///
/// Entries with the same app ID and secret (a `repeat` expansion, or the same
/// app listed twice) share one HTTP client and its token.
pub fn reddit_identities(config: &Config) -> Result<Vec<Identity>, PlatformError> {
    let mut clients: HashMap<(&str, &str), Arc<dyn ContentPlatform>> = HashMap::new();
    let mut identities = Vec::with_capacity(config.clients.len());

    for client in &config.clients {
        let key = (client.id.as_str(), client.secret.as_str());
        let platform = match clients.get(&key) {
            Some(platform) => Arc::clone(platform),
            None => {
                let reddit = RedditClient::new(config.credentials(client), &config.platform)?;
                let platform: Arc<dyn ContentPlatform> = Arc::new(reddit);
                clients.insert(key, Arc::clone(&platform));
                platform
            }
        };
        identities.push(Identity::new(client.id.clone(), platform));
    }

    Ok(identities)
}

/// `"<id>" TAKEN` or `"<id>" LOST`.
pub fn status_line(target: PostId, claimed: bool) -> String {
    let status = if claimed { "TAKEN" } else { "LOST" };
    format!("\"{}\" {}", target, status)
}

/// Errors that end a run before or instead of racing.
#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    #[error("No identity to race with")]
    NoIdentities,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Summary of a finished race.
#[derive(Debug, Clone)]
pub struct RaceReport {
    pub target: PostId,
    pub claimed: bool,
    pub gate: GateReport,
    /// Worker names and outcomes, in launch order
    pub workers: Vec<(String, WorkerOutcome)>,
}

impl RaceReport {
    pub fn status_line(&self) -> String {
        status_line(self.target, self.claimed)
    }
}

/// Runs the whole race.
pub struct RaceCoordinator {
    identities: Vec<Identity>,
    location: Location,
    stream: Location,
    config: RaceConfig,
    observer: Arc<dyn RaceObserver>,
}

impl RaceCoordinator {
    pub fn new(identities: Vec<Identity>, location: Location, config: RaceConfig) -> Self {
        Self {
            identities,
            location,
            stream: Location::Community("all".to_string()),
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Community polled for the stream head.
    pub fn with_stream(mut self, stream: Location) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RaceObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The predictor borrows the last identity.
    fn predictor(&self) -> Result<Predictor, RaceError> {
        self.config.validate()?;
        let identity = self.identities.last().ok_or(RaceError::NoIdentities)?;
        Ok(Predictor::new(
            Arc::clone(&identity.platform),
            self.stream.clone(),
            self.config.clone(),
            Arc::clone(&self.observer),
        ))
    }

    /// Poll the stream once and suggest a target.
    pub async fn watch(&self) -> Result<Forecast, RaceError> {
        Ok(self.predictor()?.forecast().await?)
    }

    /// Wait for the target to come close, then race every identity for it.
    pub async fn run(&self, target: PostId) -> Result<RaceReport, RaceError> {
        let gate = self.predictor()?.wait_for(target).await?;

        let claimed = Arc::new(ClaimedFlag::new());
        let retry = RetryPolicy::from_delay(self.config.retry_delay());
        let bodies = Bodies {
            placeholder: self.config.placeholder_body.clone(),
            claim: self.config.claim_body.clone(),
        };

        info!(
            workers = self.identities.len(),
            target = %target,
            location = %self.location,
            "Starting workers"
        );

        let mut tasks = JoinSet::new();
        for (index, identity) in self.identities.iter().enumerate() {
            if index > 0 && !self.config.stagger().is_zero() {
                tokio::time::sleep(self.config.stagger()).await;
            }

            let worker = RacingWorker::new(
                format!("Worker-{} ({})", index, identity.label),
                Arc::clone(&identity.platform),
                self.location.clone(),
                target,
                Arc::clone(&claimed),
                retry,
                bodies.clone(),
                Arc::clone(&self.observer),
            );
            tasks.spawn(async move {
                let name = worker.name().to_string();
                (index, name, worker.run().await)
            });
        }

        let mut finished = Vec::with_capacity(self.identities.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => finished.push(result),
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }
        finished.sort_by_key(|(index, _, _)| *index);

        Ok(RaceReport {
            target,
            claimed: claimed.is_claimed(),
            gate,
            workers: finished
                .into_iter()
                .map(|(_, name, outcome)| (name, outcome))
                .collect(),
        })
    }
}
