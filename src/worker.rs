//! Racing worker.
//!
//! A worker submits a post titled with the target, looks at the identifier
//! the platform assigned to it and then either deletes it and tries again
//! (target still ahead), keeps it (hit), or deletes it and stops (target
//! passed). Platform failures end the worker; siblings keep racing.

use std::sync::Arc;
use std::time::Duration;

use crate::codec::PostId;
use crate::coordinator::ClaimedFlag;
use crate::observer::{RaceEvent, RaceObserver};
use crate::platform::{ContentPlatform, Location, PlatformError};

/// What to do with a freshly created post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Target still ahead: delete and submit again
    Retry,
    /// Exact hit: keep the post
    Claim,
    /// Target passed: delete and stop
    Discard,
}

/// Map a distance (`target - assigned`) to a decision.
pub fn decide(distance: i64) -> Decision {
    match distance {
        d if d > 0 => Decision::Retry,
        0 => Decision::Claim,
        _ => Decision::Discard,
    }
}

/// Platform call a worker was making.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Submitting,
    DeletingAhead,
    DeletingBehind,
    Finalizing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Stage::Submitting => "submitting",
            Stage::DeletingAhead => "deleting > 0",
            Stage::DeletingBehind => "deleting < 0",
            Stage::Finalizing => "editing == 0",
        };
        f.write_str(text)
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// This worker's post got the target identifier
    Claimed {
        id: PostId,
        attempts: u64,
        /// Whether the celebratory edit went through
        finalized: bool,
    },
    /// A post landed beyond the target
    Passed {
        id: PostId,
        assigned: PostId,
        attempts: u64,
    },
    /// A submit or retry delete failed
    Aborted {
        stage: Stage,
        attempts: u64,
        error: PlatformError,
    },
}

impl WorkerOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, WorkerOutcome::Claimed { .. })
    }

    pub fn attempts(&self) -> u64 {
        match self {
            WorkerOutcome::Claimed { attempts, .. }
            | WorkerOutcome::Passed { attempts, .. }
            | WorkerOutcome::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Pause between deleting a post that is short of the target and submitting
/// the next one.
///
/// `Immediate` is the default and the intended racing mode: catching up
/// relies on raw request throughput, so no backoff is applied. `Delay` exists
/// for gentler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Immediate,
    Delay(Duration),
}

impl RetryPolicy {
    pub fn from_delay(delay: Duration) -> Self {
        if delay.is_zero() {
            RetryPolicy::Immediate
        } else {
            RetryPolicy::Delay(delay)
        }
    }
}

/// Post bodies used while racing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bodies {
    pub placeholder: String,
    pub claim: String,
}

/// One independent racer bound to a single client.
pub struct RacingWorker {
    name: String,
    platform: Arc<dyn ContentPlatform>,
    location: Location,
    target: PostId,
    claimed: Arc<ClaimedFlag>,
    retry: RetryPolicy,
    bodies: Bodies,
    observer: Arc<dyn RaceObserver>,
}

impl RacingWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        platform: Arc<dyn ContentPlatform>,
        location: Location,
        target: PostId,
        claimed: Arc<ClaimedFlag>,
        retry: RetryPolicy,
        bodies: Bodies,
        observer: Arc<dyn RaceObserver>,
    ) -> Self {
        Self {
            name: name.into(),
            platform,
            location,
            target,
            claimed,
            retry,
            bodies,
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn report_error(&self, stage: Stage, error: PlatformError) {
        self.observer.on_event(&RaceEvent::WorkerError {
            worker: self.name.clone(),
            stage,
            error,
        });
    }

    /// Race until a terminal state is reached.
    pub async fn run(self) -> WorkerOutcome {
        self.observer.on_event(&RaceEvent::WorkerStarted {
            worker: self.name.clone(),
        });

        let title = self.target.to_title();
        let mut attempts = 0u64;

        let outcome = loop {
            attempts += 1;
            let item = match self
                .platform
                .create_item(&self.location, &title, &self.bodies.placeholder)
                .await
            {
                Ok(item) => item,
                Err(e) => {
                    self.report_error(Stage::Submitting, e.clone());
                    break WorkerOutcome::Aborted {
                        stage: Stage::Submitting,
                        attempts,
                        error: e,
                    };
                }
            };

            let distance = self.target.distance_from(item.ordinal());
            self.observer.on_event(&RaceEvent::Attempt {
                worker: self.name.clone(),
                attempt: attempts,
                assigned: item.id,
                distance,
            });

            match decide(distance) {
                Decision::Retry => {
                    if let Err(e) = self.platform.delete_item(&item).await {
                        self.report_error(Stage::DeletingAhead, e.clone());
                        break WorkerOutcome::Aborted {
                            stage: Stage::DeletingAhead,
                            attempts,
                            error: e,
                        };
                    }
                    if let RetryPolicy::Delay(pause) = self.retry {
                        tokio::time::sleep(pause).await;
                    }
                }
                Decision::Claim => {
                    self.claimed.claim();
                    let finalized = match self.platform.edit_item(&item, &self.bodies.claim).await {
                        Ok(()) => true,
                        Err(e) => {
                            self.report_error(Stage::Finalizing, e);
                            false
                        }
                    };
                    break WorkerOutcome::Claimed {
                        id: item.id,
                        attempts,
                        finalized,
                    };
                }
                Decision::Discard => {
                    // Best effort: the worker stops either way.
                    if let Err(e) = self.platform.delete_item(&item).await {
                        self.report_error(Stage::DeletingBehind, e);
                    }
                    break WorkerOutcome::Passed {
                        id: self.target,
                        assigned: item.id,
                        attempts,
                    };
                }
            }
        };

        self.observer.on_event(&RaceEvent::WorkerFinished {
            worker: self.name.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }
}
