//! Race events and the observers that receive them.
//!
//! Components report progress through an injected [`RaceObserver`] instead of
//! logging directly, so a run can be watched, recorded or silenced without
//! touching global state. [`TracingObserver`] is the default and turns every
//! event into a `tracing` record.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::codec::{self, PostId};
use crate::platform::PlatformError;
use crate::predictor::{Eta, Forecast};
use crate::worker::{Stage, WorkerOutcome};

/// Something that happened during a run.
#[derive(Debug, Clone)]
pub enum RaceEvent {
    /// Watch-mode forecast result
    Forecast(Forecast),
    /// Gating poll result
    HeadObserved { head: u64, distance: i64, eta: Eta },
    /// Gating is about to sleep
    Sleeping { duration: Duration },
    WorkerStarted { worker: String },
    /// A racing post was created
    Attempt {
        worker: String,
        attempt: u64,
        assigned: PostId,
        distance: i64,
    },
    /// A platform call failed
    WorkerError {
        worker: String,
        stage: Stage,
        error: PlatformError,
    },
    WorkerFinished {
        worker: String,
        outcome: WorkerOutcome,
    },
}

/// Receiver of race events.
pub trait RaceObserver: Send + Sync {
    fn on_event(&self, event: &RaceEvent);
}

fn id_text(ordinal: u64) -> String {
    codec::encode(ordinal).unwrap_or_else(|_| format!("#{}", ordinal))
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RaceObserver for TracingObserver {
    fn on_event(&self, event: &RaceEvent) {
        match event {
            RaceEvent::Forecast(forecast) => {
                info!("Last ID: {}", id_text(forecast.head));
                match forecast.hint {
                    Some(hint) => info!("Try to capture {}", hint),
                    None => warn!("No capturable ID left after {}", id_text(forecast.head)),
                }
            }
            RaceEvent::HeadObserved { head, distance, eta } => {
                info!(
                    "Last ID: {} - Distance: {} - ETA: {}",
                    id_text(*head),
                    distance,
                    eta
                );
            }
            RaceEvent::Sleeping { duration } => {
                info!("Sleep for {:.2} seconds...", duration.as_secs_f64());
            }
            RaceEvent::WorkerStarted { worker } => info!("{} started", worker),
            RaceEvent::Attempt {
                worker,
                attempt,
                assigned,
                distance,
            } => {
                info!(worker = %worker, attempt, "Distance: {}, posted ID: {}", distance, assigned);
            }
            RaceEvent::WorkerError {
                worker,
                stage,
                error,
            } => {
                error!(
                    "{}, while {}, terminated for an exception: {}",
                    worker, stage, error
                );
            }
            RaceEvent::WorkerFinished { worker, outcome } => match outcome {
                WorkerOutcome::Claimed { id, .. } => {
                    info!(worker = %worker, "Congrats! You won your ID \"{}\"", id)
                }
                WorkerOutcome::Passed { id, .. } => info!(worker = %worker, "ID \"{}\" passed", id),
                WorkerOutcome::Aborted {
                    stage,
                    attempts,
                    error,
                } => {
                    warn!(worker = %worker, attempts, "Gave up while {}: {}", stage, error)
                }
            },
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RaceEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<RaceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl RaceObserver for RecordingObserver {
    fn on_event(&self, event: &RaceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
