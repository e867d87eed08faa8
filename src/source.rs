// Position sources
//
// A source yields a lazy, non-restartable stream of samples over a channel.
// Availability must be checked before starting; the three unavailable
// conditions map one-to-one onto UnavailableReason.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::constants::SAMPLE_CHANNEL_CAPACITY;
use crate::error::{TrackingError, UnavailableReason};
use crate::track::PositionSample;

/// Service and permission state reported by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Available,
    ServiceDisabled,
    PermissionDenied,
    PermissionDeniedForever,
}

impl SourceStatus {
    /// Ok when available, otherwise the matching unavailability error
    pub fn check(self) -> Result<(), TrackingError> {
        let reason = match self {
            SourceStatus::Available => return Ok(()),
            SourceStatus::ServiceDisabled => UnavailableReason::ServiceDisabled,
            SourceStatus::PermissionDenied => UnavailableReason::PermissionDenied,
            SourceStatus::PermissionDeniedForever => UnavailableReason::PermissionDeniedForever,
        };
        Err(TrackingError::SourceUnavailable(reason))
    }
}

/// Producer of position samples
pub trait PositionSource: Send {
    /// Current service/permission state
    fn status(&self) -> SourceStatus;

    /// Begin producing samples. A source can be started once.
    fn start(&mut self) -> Result<mpsc::Receiver<PositionSample>, TrackingError>;

    /// Stop producing samples; the receiver sees end-of-stream
    fn stop(&mut self);
}

/// Replays recorded samples, optionally paced in real time
pub struct ReplaySource {
    samples: Option<Vec<PositionSample>>,
    status: SourceStatus,
    /// Playback speed multiplier; 0 sends everything immediately
    speed: f64,
    task: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<PositionSample>) -> Self {
        ReplaySource {
            samples: Some(samples),
            status: SourceStatus::Available,
            speed: 0.0,
            task: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
        self
    }

    /// Report a given status (for exercising unavailability handling)
    pub fn with_status(mut self, status: SourceStatus) -> Self {
        self.status = status;
        self
    }
}

impl PositionSource for ReplaySource {
    fn status(&self) -> SourceStatus {
        self.status
    }

    fn start(&mut self) -> Result<mpsc::Receiver<PositionSample>, TrackingError> {
        self.status.check()?;
        let samples = self.samples.take().ok_or(TrackingError::InvalidState {
            op: "start",
            state: "replay already consumed".to_string(),
        })?;

        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let speed = self.speed;
        info!(samples = samples.len(), speed, "Starting replay source");

        self.task = Some(tokio::spawn(async move {
            let mut prev_ts: Option<f64> = None;
            for sample in samples {
                if speed > 0.0 {
                    if let Some(prev) = prev_ts {
                        let gap = ((sample.timestamp - prev) / speed).max(0.0);
                        if gap > 0.0 {
                            tokio::time::sleep(Duration::from_secs_f64(gap)).await;
                        }
                    }
                    prev_ts = Some(sample.timestamp);
                }
                if tx.send(sample).await.is_err() {
                    debug!("Replay receiver dropped");
                    break;
                }
            }
        }));
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Source fed by the host platform through a [`SampleSender`]
pub struct ChannelSource {
    status: SourceStatus,
    rx: Option<mpsc::Receiver<PositionSample>>,
}

/// Host-side half of a [`ChannelSource`]
#[derive(Clone)]
pub struct SampleSender {
    tx: mpsc::Sender<PositionSample>,
}

impl SampleSender {
    /// Deliver a fix; fails only when the engine has gone away
    pub async fn send(&self, sample: PositionSample) -> Result<(), PositionSample> {
        self.tx.send(sample).await.map_err(|e| e.0)
    }
}

impl ChannelSource {
    pub fn new(status: SourceStatus) -> (Self, SampleSender) {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        (
            ChannelSource {
                status,
                rx: Some(rx),
            },
            SampleSender { tx },
        )
    }
}

impl PositionSource for ChannelSource {
    fn status(&self) -> SourceStatus {
        self.status
    }

    fn start(&mut self) -> Result<mpsc::Receiver<PositionSample>, TrackingError> {
        self.status.check()?;
        self.rx.take().ok_or(TrackingError::InvalidState {
            op: "start",
            state: "source already started".to_string(),
        })
    }

    fn stop(&mut self) {
        self.rx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_check() {
        assert!(SourceStatus::Available.check().is_ok());
        assert_eq!(
            SourceStatus::PermissionDeniedForever.check(),
            Err(TrackingError::SourceUnavailable(UnavailableReason::PermissionDeniedForever))
        );
    }

    #[tokio::test]
    async fn test_replay_delivers_all() {
        let samples: Vec<_> = (0..5).map(|i| PositionSample::new(41.0, 29.0, i as f64)).collect();
        let mut source = ReplaySource::new(samples.clone());
        let mut rx = source.start().unwrap();

        let mut got = Vec::new();
        while let Some(s) = rx.recv().await {
            got.push(s);
        }
        assert_eq!(got, samples);
    }

    #[tokio::test]
    async fn test_replay_not_restartable() {
        let mut source = ReplaySource::new(vec![]);
        let _rx = source.start().unwrap();
        source.stop();
        assert!(matches!(source.start(), Err(TrackingError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_source_refuses_start() {
        let mut source = ReplaySource::new(vec![]).with_status(SourceStatus::ServiceDisabled);
        assert_eq!(
            source.start().err(),
            Some(TrackingError::SourceUnavailable(UnavailableReason::ServiceDisabled))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_paced() {
        let samples = vec![
            PositionSample::new(41.0, 29.0, 0.0),
            PositionSample::new(41.0, 29.0, 10.0),
        ];
        let mut source = ReplaySource::new(samples).with_speed(2.0);
        let mut rx = source.start().unwrap();

        let start = tokio::time::Instant::now();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_channel_source() {
        let (mut source, sender) = ChannelSource::new(SourceStatus::Available);
        let mut rx = source.start().unwrap();
        sender.send(PositionSample::new(41.0, 29.0, 1.0)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().timestamp, 1.0);
        assert!(source.start().is_err());
    }
}
