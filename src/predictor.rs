//! Arrival predictor.
//!
//! Watches the head of the global post stream and holds the race back until
//! the target identifier is close. While waiting it fits a line through the
//! (ordinal, time) samples it has seen to estimate when the target will be
//! assigned. The estimate is advisory: it is logged, never acted upon.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::codec::PostId;
use crate::config::RaceConfig;
use crate::observer::{RaceEvent, RaceObserver};
use crate::platform::{ContentPlatform, Location, PlatformError};

/// Errors that end the gating phase without racing.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The stream head is already at or past the target
    #[error("ID \"{target}\" passed (stream head {head})")]
    AlreadyPassed { target: PostId, head: u64 },

    /// Polling the stream failed
    #[error("Polling the post stream failed: {0}")]
    Stream(#[from] PlatformError),
}

/// One observation of the stream head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub ordinal: u64,
    pub observed_at: DateTime<Utc>,
}

/// Estimated arrival time of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eta {
    At(DateTime<Utc>),
    /// Fewer than two distinct ordinals observed so far
    NeedMoreSamples,
    /// No estimator configured, or the fit produced no usable time
    Unavailable,
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::At(at) => {
                let local = at.with_timezone(&chrono::Local);
                write!(f, "{}", local.format("%Y-%m-%d %H:%M:%S%.3f"))
            }
            Eta::NeedMoreSamples => f.write_str("Cannot calculate (need two or more ids)"),
            Eta::Unavailable => f.write_str("Cannot calculate (estimator unavailable)"),
        }
    }
}

/// Something that can turn samples into an arrival estimate.
pub trait ArrivalEstimator: Send + Sync {
    fn estimate(&self, samples: &[Sample], target: u64) -> Eta;
}

/// Ordinary least squares of observation time against ordinal.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearEstimator;

impl ArrivalEstimator for LinearEstimator {
    fn estimate(&self, samples: &[Sample], target: u64) -> Eta {
        if samples.len() < 2 {
            return Eta::NeedMoreSamples;
        }

        // Centre on the first sample to keep the squares small.
        let origin_x = samples[0].ordinal as f64;
        let origin_y = samples[0].observed_at.timestamp_millis() as f64 / 1000.0;
        let n = samples.len() as f64;

        let xs: Vec<f64> = samples.iter().map(|s| s.ordinal as f64 - origin_x).collect();
        let ys: Vec<f64> = samples
            .iter()
            .map(|s| s.observed_at.timestamp_millis() as f64 / 1000.0 - origin_y)
            .collect();

        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let (sxy, sxx) = xs
            .iter()
            .zip(&ys)
            .fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
                let dx = x - mean_x;
                (sxy + dx * (y - mean_y), sxx + dx * dx)
            });

        if sxx == 0.0 {
            return Eta::NeedMoreSamples;
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        let predicted = origin_y + intercept + slope * (target as f64 - origin_x);

        if !predicted.is_finite() {
            return Eta::Unavailable;
        }
        match DateTime::<Utc>::from_timestamp_millis((predicted * 1000.0).round() as i64) {
            Some(at) => Eta::At(at),
            None => Eta::Unavailable,
        }
    }
}

/// What the gating loop does after one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Target at or behind the head
    Passed,
    /// Close enough to start racing
    Open,
    /// Sleep, then poll again
    Wait(Duration),
}

/// Classify a distance to the target.
pub fn gate_decision(distance: i64, config: &RaceConfig) -> GateDecision {
    if distance <= 0 {
        GateDecision::Passed
    } else if distance <= config.min_distance {
        GateDecision::Open
    } else {
        GateDecision::Wait(adaptive_sleep(distance, config))
    }
}

/// `min(max_sleep, distance / divisor)` seconds, rounded to hundredths.
pub fn adaptive_sleep(distance: i64, config: &RaceConfig) -> Duration {
    let secs = (distance as f64 / config.sleep_divisor).min(config.max_sleep_secs);
    let hundredths = (secs * 100.0).round().max(0.0);
    Duration::from_millis(hundredths as u64 * 10)
}

/// Result of a watch-mode look at the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forecast {
    pub head: u64,
    /// Suggested target, if it still fits in six characters
    pub hint: Option<PostId>,
}

/// Result of a successful gating phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateReport {
    pub head: u64,
    pub distance: i64,
    pub polls: usize,
}

/// Polls the stream head and decides when racing may start.
pub struct Predictor {
    platform: Arc<dyn ContentPlatform>,
    stream: Location,
    config: RaceConfig,
    estimator: Option<Box<dyn ArrivalEstimator>>,
    observer: Arc<dyn RaceObserver>,
    samples: Vec<Sample>,
    head: u64,
}

impl Predictor {
    /// Create a predictor; the linear estimator is used when `config.forecast` is set.
    pub fn new(
        platform: Arc<dyn ContentPlatform>,
        stream: Location,
        config: RaceConfig,
        observer: Arc<dyn RaceObserver>,
    ) -> Self {
        let estimator: Option<Box<dyn ArrivalEstimator>> = if config.forecast {
            Some(Box::new(LinearEstimator))
        } else {
            None
        };

        Self {
            platform,
            stream,
            config,
            estimator,
            observer,
            samples: Vec::new(),
            head: 0,
        }
    }

    /// Replace the estimator (or remove it with `None`).
    pub fn with_estimator(mut self, estimator: Option<Box<dyn ArrivalEstimator>>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Highest ordinal currently in the stream.
    ///
    /// An empty listing yields the sentinel 0, which is never recorded; the
    /// poll is simply repeated.
    async fn poll_head(&self) -> Result<u64, PlatformError> {
        loop {
            let items = self
                .platform
                .list_recent(&self.stream, self.config.poll_limit)
                .await?;
            let max = items.iter().map(|item| item.ordinal()).max().unwrap_or(0);
            if max > 0 {
                return Ok(max);
            }
            debug!(stream = %self.stream, "Stream returned no posts, polling again");
            tokio::task::yield_now().await;
        }
    }

    fn estimate(&self, target: u64) -> Eta {
        match &self.estimator {
            Some(estimator) => estimator.estimate(&self.samples, target),
            None => Eta::Unavailable,
        }
    }

    /// Watch mode: report the stream head and a suggested target.
    pub async fn forecast(&self) -> Result<Forecast, GateError> {
        let head = self.poll_head().await?;
        let hint = PostId::from_ordinal(head + self.config.forecast_offset).ok();
        let forecast = Forecast { head, hint };
        self.observer.on_event(&RaceEvent::Forecast(forecast));
        Ok(forecast)
    }

    /// Block until the target is within `min_distance` of the stream head.
    pub async fn wait_for(&mut self, target: PostId) -> Result<GateReport, GateError> {
        info!(target = %target, "Entering wait mode...");
        let mut polls = 0;

        loop {
            let polled = self.poll_head().await?;
            polls += 1;
            self.head = self.head.max(polled);
            self.samples.push(Sample {
                ordinal: self.head,
                observed_at: Utc::now(),
            });

            let distance = target.distance_from(self.head);
            let eta = self.estimate(target.ordinal());
            self.observer.on_event(&RaceEvent::HeadObserved {
                head: self.head,
                distance,
                eta,
            });

            match gate_decision(distance, &self.config) {
                GateDecision::Passed => {
                    return Err(GateError::AlreadyPassed {
                        target,
                        head: self.head,
                    });
                }
                GateDecision::Open => {
                    info!("Exiting wait mode...");
                    return Ok(GateReport {
                        head: self.head,
                        distance,
                        polls,
                    });
                }
                GateDecision::Wait(pause) => {
                    self.observer.on_event(&RaceEvent::Sleeping { duration: pause });
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use crate::platform::MockPlatform;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn predictor(mock: &MockPlatform) -> Predictor {
        Predictor::new(
            Arc::new(mock.clone()),
            Location::Community("all".to_string()),
            RaceConfig::default(),
            Arc::new(RecordingObserver::default()),
        )
    }

    #[test]
    fn test_gate_decision_boundaries() {
        let config = RaceConfig::default();
        assert_eq!(gate_decision(-5, &config), GateDecision::Passed);
        assert_eq!(gate_decision(0, &config), GateDecision::Passed);
        assert_eq!(gate_decision(1, &config), GateDecision::Open);
        assert_eq!(gate_decision(270, &config), GateDecision::Open);
        assert!(matches!(gate_decision(271, &config), GateDecision::Wait(_)));
    }

    #[test]
    fn test_adaptive_sleep_values() {
        let config = RaceConfig::default();
        assert_eq!(adaptive_sleep(300, &config), Duration::from_millis(1500));
        assert_eq!(adaptive_sleep(640, &config), Duration::from_millis(3200));
        assert_eq!(adaptive_sleep(1000, &config), Duration::from_secs(5));
        assert_eq!(adaptive_sleep(2100, &config), Duration::from_secs(10));
        assert_eq!(adaptive_sleep(10_000_000, &config), Duration::from_secs(10));
    }

    #[test]
    fn test_adaptive_sleep_bounds() {
        let config = RaceConfig::default();
        for distance in (271..50_000).step_by(37) {
            let pause = adaptive_sleep(distance, &config);
            assert!(pause <= Duration::from_secs(10), "distance {}", distance);
            let expected = ((distance as f64 / 200.0).min(10.0) * 100.0).round() / 100.0;
            assert!((pause.as_secs_f64() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_linear_estimator_extrapolates() {
        // 10 ordinals per second
        let samples = [
            Sample { ordinal: 1000, observed_at: at(0) },
            Sample { ordinal: 1100, observed_at: at(10) },
            Sample { ordinal: 1200, observed_at: at(20) },
        ];
        assert_eq!(LinearEstimator.estimate(&samples, 2000), Eta::At(at(100)));
    }

    #[test]
    fn test_linear_estimator_needs_two_distinct_samples() {
        let one = [Sample { ordinal: 5, observed_at: at(0) }];
        assert_eq!(LinearEstimator.estimate(&one, 10), Eta::NeedMoreSamples);

        let flat = [
            Sample { ordinal: 5, observed_at: at(0) },
            Sample { ordinal: 5, observed_at: at(3) },
        ];
        assert_eq!(LinearEstimator.estimate(&flat, 10), Eta::NeedMoreSamples);
    }

    #[tokio::test]
    async fn test_forecast_reports_hint() {
        let mock = MockPlatform::new("feed", 0).with_stream([vec![1_000, 999]]);
        let forecast = predictor(&mock).forecast().await.unwrap();
        assert_eq!(forecast.head, 1_000);
        assert_eq!(forecast.hint.map(PostId::ordinal), Some(2_500));
    }

    #[tokio::test]
    async fn test_forecast_hint_out_of_range() {
        let last = crate::codec::ORDINAL_LIMIT - 1;
        let mock = MockPlatform::new("feed", 0).with_stream([vec![last]]);
        let forecast = predictor(&mock).forecast().await.unwrap();
        assert_eq!(forecast.hint, None);
    }

    #[tokio::test]
    async fn test_empty_listing_is_not_a_sample() {
        let target = PostId::from_ordinal(10_100).unwrap();
        let mock = MockPlatform::new("feed", 0).with_stream([vec![], vec![], vec![10_000]]);
        let mut predictor = predictor(&mock);

        let report = predictor.wait_for(target).await.unwrap();
        assert_eq!(report.polls, 1);
        assert_eq!(predictor.samples().len(), 1);
        assert_eq!(predictor.samples()[0].ordinal, 10_000);
        assert_eq!(mock.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_already_passed() {
        let target = PostId::from_ordinal(10_000).unwrap();
        let mock = MockPlatform::new("feed", 0).with_stream([vec![10_000]]);
        let result = predictor(&mock).wait_for(target).await;
        assert!(matches!(
            result,
            Err(GateError::AlreadyPassed { head: 10_000, .. })
        ));
    }

    #[tokio::test]
    async fn test_stream_failure_aborts_gating() {
        let target = PostId::from_ordinal(10_000).unwrap();
        let mock = MockPlatform::new("feed", 0).failing_list();
        let result = predictor(&mock).wait_for(target).await;
        assert!(matches!(result, Err(GateError::Stream(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_close() {
        let target = PostId::from_ordinal(100_000).unwrap();
        let mock = MockPlatform::new("feed", 0)
            .with_stream([vec![90_000], vec![99_000], vec![99_800]]);
        let mut predictor = predictor(&mock);

        let started = tokio::time::Instant::now();
        let report = predictor.wait_for(target).await.unwrap();

        assert_eq!(report.polls, 3);
        assert_eq!(report.distance, 200);
        // 10s (capped) + 5s
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(15) && waited < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_never_moves_backwards() {
        let target = PostId::from_ordinal(100_000).unwrap();
        let mock = MockPlatform::new("feed", 0)
            .with_stream([vec![99_500], vec![99_000], vec![99_900]]);
        let mut predictor = predictor(&mock);

        predictor.wait_for(target).await.unwrap();
        let ordinals: Vec<u64> = predictor.samples().iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, [99_500, 99_500, 99_900]);
    }

    /// Gate on a two-poll stream and collect the logged estimates.
    ///
    /// `estimator` of `Some(..)` overrides the one chosen from `config`.
    async fn gating_etas(
        config: RaceConfig,
        estimator: Option<Option<Box<dyn ArrivalEstimator>>>,
    ) -> Vec<Eta> {
        let target = PostId::from_ordinal(100_000).unwrap();
        let mock = MockPlatform::new("feed", 0).with_stream([vec![99_000], vec![99_900]]);
        let observer = Arc::new(RecordingObserver::default());
        let mut predictor = Predictor::new(
            Arc::new(mock),
            Location::Community("all".to_string()),
            config,
            observer.clone(),
        );
        if let Some(estimator) = estimator {
            predictor = predictor.with_estimator(estimator);
        }

        let report = predictor.wait_for(target).await.unwrap();
        assert_eq!(report.polls, 2);

        observer
            .events()
            .into_iter()
            .filter_map(|event| match event {
                RaceEvent::HeadObserved { eta, .. } => Some(eta),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_after_second_sample() {
        let etas = gating_etas(RaceConfig::default(), None).await;
        assert_eq!(etas.len(), 2);
        assert_eq!(etas[0], Eta::NeedMoreSamples);
        assert!(matches!(etas[1], Eta::At(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_unavailable_without_estimator() {
        let config = RaceConfig {
            forecast: false,
            ..RaceConfig::default()
        };
        let etas = gating_etas(config, None).await;
        assert_eq!(etas, [Eta::Unavailable, Eta::Unavailable]);

        let etas = gating_etas(RaceConfig::default(), Some(None)).await;
        assert_eq!(etas, [Eta::Unavailable, Eta::Unavailable]);
    }

    struct FixedEstimator(DateTime<Utc>);

    impl ArrivalEstimator for FixedEstimator {
        fn estimate(&self, _samples: &[Sample], _target: u64) -> Eta {
            Eta::At(self.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_estimator_replaces_linear() {
        let config = RaceConfig {
            forecast: false,
            ..RaceConfig::default()
        };
        let fixed: Box<dyn ArrivalEstimator> = Box::new(FixedEstimator(at(42)));
        let etas = gating_etas(config, Some(Some(fixed))).await;
        assert_eq!(etas, [Eta::At(at(42)), Eta::At(at(42))]);
    }
}
