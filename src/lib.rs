//! RIG - Reddit ID Grabber
//!
//! Claims a chosen six-character post identifier (`redd.it/abc123`) by
//! creating and deleting posts until one is assigned the target.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            RaceCoordinator              │
//! └───────┬─────────────────────┬───────────┘
//!         │ gate                │ spawn N
//!         ▼                     ▼
//! ┌───────────────┐     ┌───────────────┐
//! │   Predictor   │     │ RacingWorker  │──► ClaimedFlag
//! │ (stream head, │     │ (create, look,│
//! │  ETA fit)     │     │  delete/keep) │
//! └───────┬───────┘     └───────┬───────┘
//!         └──────────┬──────────┘
//!                    ▼
//!           ContentPlatform
//!        (RedditClient / Mock)
//! ```

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod observer;
pub mod platform;
pub mod predictor;
pub mod worker;

pub use codec::{FormatError, PostId};
pub use config::{Config, ConfigError, RaceConfig};
pub use coordinator::{ClaimedFlag, Identity, RaceCoordinator, RaceError, RaceReport};
pub use observer::{RaceEvent, RaceObserver, RecordingObserver, TracingObserver};
pub use platform::{
    ContentPlatform, Item, Location, MockPlatform, PlatformError, RedditClient, Submission,
};
pub use predictor::{Eta, Forecast, GateError, Predictor};
pub use worker::{decide, Decision, RacingWorker, RetryPolicy, WorkerOutcome};
