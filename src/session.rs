// Tracking session - recording state machine and accumulators
//
// Idle -> Active <-> Paused -> Stopping -> Stopped{Saved|Discarded}
//
// Stopping is entered when a save is attempted; it freezes the accumulators
// until the save succeeds or the caller discards.

use std::fmt;

use tracing::debug;

use crate::constants::M_PER_KM;
use crate::error::TrackingError;
use crate::track::{PositionSample, TrackPoint};

/// How a stopped session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Saved,
    Discarded,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Paused,
    /// Save in progress or failed; samples are dropped
    Stopping,
    Stopped(StopKind),
}

impl SessionState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Stopped(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Active => write!(f, "active"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Stopped(StopKind::Saved) => write!(f, "stopped (saved)"),
            SessionState::Stopped(StopKind::Discarded) => write!(f, "stopped (discarded)"),
        }
    }
}

/// A span during which the session was paused. `end` is None while still paused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PausedInterval {
    pub start: f64,
    pub end: Option<f64>,
}

/// A single recording session
#[derive(Debug, Clone)]
pub struct TrackingSession {
    /// Local identifier (the backend assigns its own on save)
    pub id: u64,
    /// Associated planned route, if the run follows one
    pub route_id: Option<String>,
    state: SessionState,
    started_at: Option<f64>,
    stopped_at: Option<f64>,
    paused: Vec<PausedInterval>,
    points: Vec<TrackPoint>,
    next_seq: u64,
    distance_m: f64,
    elevation_gain_m: f64,
    last_elevation: Option<f64>,
    last_speed: Option<f64>,
    max_speed: Option<f64>,
}

impl TrackingSession {
    pub fn new(id: u64, route_id: Option<String>) -> Self {
        TrackingSession {
            id,
            route_id,
            state: SessionState::Idle,
            started_at: None,
            stopped_at: None,
            paused: Vec::new(),
            points: Vec::new(),
            next_seq: 0,
            distance_m: 0.0,
            elevation_gain_m: 0.0,
            last_elevation: None,
            last_speed: None,
            max_speed: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Option<f64> {
        self.started_at
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn last_point(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    pub fn paused_intervals(&self) -> &[PausedInterval] {
        &self.paused
    }

    /// Cumulative distance in meters
    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Sum of positive elevation deltas in meters
    pub fn elevation_gain_m(&self) -> f64 {
        self.elevation_gain_m
    }

    pub fn current_speed(&self) -> Option<f64> {
        self.last_speed
    }

    pub fn max_speed(&self) -> Option<f64> {
        self.max_speed
    }

    fn invalid(&self, op: &'static str) -> TrackingError {
        TrackingError::InvalidState {
            op,
            state: self.state.to_string(),
        }
    }

    /// Idle -> Active. Clears accumulators and records the start time.
    pub fn start(&mut self, now: f64) -> Result<(), TrackingError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("start"));
        }
        self.points.clear();
        self.paused.clear();
        self.next_seq = 0;
        self.distance_m = 0.0;
        self.elevation_gain_m = 0.0;
        self.last_elevation = None;
        self.last_speed = None;
        self.max_speed = None;
        self.started_at = Some(now);
        self.stopped_at = None;
        self.state = SessionState::Active;
        debug!(session = self.id, started_at = now, "Session started");
        Ok(())
    }

    /// Accept a sample while Active.
    ///
    /// Returns `Ok(None)` when the session is not Active (sample dropped without error),
    /// `Err(InvalidSample)` for malformed fixes, otherwise the appended point.
    pub fn add_sample(&mut self, sample: &PositionSample) -> Result<Option<TrackPoint>, TrackingError> {
        if self.state != SessionState::Active {
            return Ok(None);
        }
        sample.validate()?;

        let point = TrackPoint::from_sample(self.next_seq, sample);
        if let Some(prev) = self.points.last() {
            self.distance_m += prev.distance_to(&point);
        }
        if let Some(elev) = point.elevation {
            if let Some(prev_elev) = self.last_elevation {
                if elev > prev_elev {
                    self.elevation_gain_m += elev - prev_elev;
                }
            }
            self.last_elevation = Some(elev);
        }
        if let Some(speed) = point.speed {
            self.last_speed = Some(speed);
            self.max_speed = Some(self.max_speed.map_or(speed, |m| m.max(speed)));
        }

        self.next_seq += 1;
        self.points.push(point);
        Ok(Some(point))
    }

    /// Active -> Paused
    pub fn pause(&mut self, now: f64) -> Result<(), TrackingError> {
        if self.state != SessionState::Active {
            return Err(self.invalid("pause"));
        }
        self.paused.push(PausedInterval { start: now, end: None });
        self.state = SessionState::Paused;
        debug!(session = self.id, at = now, "Session paused");
        Ok(())
    }

    /// Paused -> Active
    pub fn resume(&mut self, now: f64) -> Result<(), TrackingError> {
        if self.state != SessionState::Paused {
            return Err(self.invalid("resume"));
        }
        if let Some(interval) = self.paused.last_mut() {
            interval.end = Some(now.max(interval.start));
        }
        self.state = SessionState::Active;
        debug!(session = self.id, at = now, "Session resumed");
        Ok(())
    }

    /// Active/Paused -> Stopping. Freezes the clock at `now`; repeat calls are no-ops.
    pub fn begin_stop(&mut self, now: f64) -> Result<(), TrackingError> {
        match self.state {
            SessionState::Active | SessionState::Paused => {
                if let Some(interval) = self.paused.last_mut() {
                    if interval.end.is_none() {
                        interval.end = Some(now.max(interval.start));
                    }
                }
                self.stopped_at = Some(now);
                self.state = SessionState::Stopping;
                Ok(())
            }
            SessionState::Stopping => Ok(()),
            _ => Err(self.invalid("stop")),
        }
    }

    /// Enter a terminal state. Discarding is allowed from any non-terminal started state.
    pub fn finish(&mut self, kind: StopKind, now: f64) -> Result<(), TrackingError> {
        match (self.state, kind) {
            (SessionState::Stopping, _) => {}
            (SessionState::Active | SessionState::Paused, StopKind::Discarded) => {
                self.begin_stop(now)?;
            }
            _ => return Err(self.invalid("finish")),
        }
        self.state = SessionState::Stopped(kind);
        debug!(session = self.id, state = %self.state, "Session finished");
        Ok(())
    }

    /// Total paused time in seconds up to `until`
    fn paused_secs(&self, until: f64) -> f64 {
        self.paused
            .iter()
            .map(|p| (p.end.unwrap_or(until).min(until) - p.start).max(0.0))
            .sum()
    }

    /// Elapsed time since start excluding paused spans, in seconds
    pub fn active_duration(&self, now: f64) -> f64 {
        let Some(started) = self.started_at else {
            return 0.0;
        };
        let end = self.stopped_at.unwrap_or(now);
        (end - started - self.paused_secs(end)).max(0.0)
    }

    /// Observed pace in seconds per meter, once any distance has been covered
    pub fn observed_pace(&self, now: f64) -> Option<f64> {
        if self.distance_m > 0.0 {
            Some(self.active_duration(now) / self.distance_m)
        } else {
            None
        }
    }

    /// Average pace in seconds per kilometer
    pub fn avg_pace_s_per_km(&self, now: f64) -> Option<f64> {
        self.observed_pace(now).map(|p| p * M_PER_KM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy;

    fn sample_at(lat: f64, lon: f64, t: f64) -> PositionSample {
        PositionSample::new(lat, lon, t)
    }

    /// Point `meters` north of (41, 29)
    fn north(meters: f64, t: f64) -> PositionSample {
        let (lat, lon) = geodesy::destination(41.0, 29.0, 0.0, meters);
        sample_at(lat, lon, t)
    }

    #[test]
    fn test_session_creation() {
        let s = TrackingSession::new(1, Some("r-1".to_string()));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.distance_m(), 0.0);
        assert_eq!(s.active_duration(100.0), 0.0);
        assert!(s.points().is_empty());
    }

    #[test]
    fn test_samples_dropped_unless_active() {
        let mut s = TrackingSession::new(1, None);
        assert_eq!(s.add_sample(&north(0.0, 0.0)).unwrap(), None);

        s.start(0.0).unwrap();
        s.pause(1.0).unwrap();
        assert_eq!(s.add_sample(&north(10.0, 2.0)).unwrap(), None);
        assert!(s.points().is_empty());
    }

    #[test]
    fn test_distance_accumulates() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();

        let samples: Vec<_> = (0..4).map(|i| north(i as f64 * 50.0, i as f64 * 10.0)).collect();
        for sample in &samples {
            s.add_sample(sample).unwrap();
        }

        let expected: f64 = samples
            .windows(2)
            .map(|w| geodesy::greatcircle(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
            .sum();
        assert!((s.distance_m() - expected).abs() < 1e-9);
        assert!((s.distance_m() - 150.0).abs() < 1.5);
    }

    #[test]
    fn test_sequence_numbers_gap_free() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        s.add_sample(&north(0.0, 0.0)).unwrap();
        // An invalid sample must not consume a sequence number
        assert!(s.add_sample(&sample_at(f64::NAN, 29.0, 1.0)).is_err());
        s.pause(1.0).unwrap();
        s.add_sample(&north(5.0, 2.0)).unwrap();
        s.resume(3.0).unwrap();
        s.add_sample(&north(10.0, 4.0)).unwrap();
        s.add_sample(&north(15.0, 5.0)).unwrap();

        let seqs: Vec<u64> = s.points().iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_sample_leaves_distance() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        s.add_sample(&north(0.0, 0.0)).unwrap();
        s.add_sample(&north(20.0, 1.0)).unwrap();
        let before = s.distance_m();

        let err = s.add_sample(&sample_at(41.0, f64::NAN, 2.0)).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidSample(_)));
        assert_eq!(s.distance_m(), before);
        assert_eq!(s.points().len(), 2);
    }

    #[test]
    fn test_pause_excluded_from_duration() {
        let mut s = TrackingSession::new(1, None);
        s.start(100.0).unwrap();
        s.pause(110.0).unwrap();
        // Still paused: the open interval is excluded too
        assert!((s.active_duration(115.0) - 10.0).abs() < 1e-9);
        s.resume(130.0).unwrap();
        assert!((s.active_duration(140.0) - 20.0).abs() < 1e-9);

        s.pause(150.0).unwrap();
        s.resume(155.0).unwrap();
        assert!((s.active_duration(160.0) - 35.0).abs() < 1e-9);
        assert_eq!(s.paused_intervals().len(), 2);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut s = TrackingSession::new(1, None);
        assert!(matches!(s.pause(0.0), Err(TrackingError::InvalidState { op: "pause", .. })));
        assert!(s.resume(0.0).is_err());
        assert!(s.begin_stop(0.0).is_err());

        s.start(0.0).unwrap();
        assert!(s.start(1.0).is_err());
        assert!(s.resume(1.0).is_err());
        s.pause(1.0).unwrap();
        assert!(s.pause(2.0).is_err());
    }

    #[test]
    fn test_stop_while_paused_freezes_duration() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        s.pause(30.0).unwrap();
        s.begin_stop(50.0).unwrap();
        assert_eq!(s.state(), SessionState::Stopping);
        assert!((s.active_duration(500.0) - 30.0).abs() < 1e-9);

        s.finish(StopKind::Saved, 60.0).unwrap();
        assert_eq!(s.state(), SessionState::Stopped(StopKind::Saved));
        assert!((s.active_duration(1000.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_discard_from_active() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        s.finish(StopKind::Discarded, 10.0).unwrap();
        assert_eq!(s.state(), SessionState::Stopped(StopKind::Discarded));
        assert!(s.finish(StopKind::Saved, 11.0).is_err());
    }

    #[test]
    fn test_saved_requires_stopping() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        assert!(s.finish(StopKind::Saved, 1.0).is_err());
    }

    #[test]
    fn test_elevation_gain_and_speed() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        s.add_sample(&north(0.0, 0.0).with_elevation(10.0).with_speed(2.0)).unwrap();
        s.add_sample(&north(10.0, 1.0).with_elevation(15.0).with_speed(3.5)).unwrap();
        s.add_sample(&north(20.0, 2.0).with_elevation(12.0)).unwrap();
        s.add_sample(&north(30.0, 3.0).with_elevation(14.0).with_speed(3.0)).unwrap();

        assert!((s.elevation_gain_m() - 7.0).abs() < 1e-9);
        assert_eq!(s.current_speed(), Some(3.0));
        assert_eq!(s.max_speed(), Some(3.5));
    }

    #[test]
    fn test_pace() {
        let mut s = TrackingSession::new(1, None);
        s.start(0.0).unwrap();
        assert_eq!(s.observed_pace(10.0), None);
        s.add_sample(&north(0.0, 0.0)).unwrap();
        s.add_sample(&north(1000.0, 300.0)).unwrap();

        let pace = s.avg_pace_s_per_km(300.0).unwrap();
        assert!((pace - 300.0).abs() < 0.5, "pace {}", pace);
    }
}
