// Observer contract - stats snapshot and change listeners
//
// Every completed state mutation in the engine produces exactly one
// notification to each registered listener, synchronously.

use tracing::debug;

use crate::error::TrackingError;
use crate::session::SessionState;

/// Snapshot of everything a UI needs to render a run
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingStats {
    pub session_id: Option<u64>,
    pub state: SessionState,
    /// Cumulative distance (m)
    pub distance_m: f64,
    /// Active duration excluding pauses (s)
    pub duration_s: f64,
    /// Average pace (s/km)
    pub pace_s_per_km: Option<f64>,
    /// Last reported ground speed (m/s)
    pub current_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub elevation_gain_m: f64,
    pub point_count: usize,
    /// Route distance left (m), when following a route
    pub remaining_m: Option<f64>,
    /// Estimated time to destination (s)
    pub eta_s: Option<f64>,
    pub waypoint_index: Option<usize>,
    pub distance_to_route_m: Option<f64>,
    pub off_route: bool,
    pub rerouting: bool,
    /// Points recorded but not yet accepted by the backend
    pub pending_upload: usize,
    /// Most recent non-fatal failure (upload, reroute)
    pub last_error: Option<TrackingError>,
}

impl Default for TrackingStats {
    fn default() -> Self {
        TrackingStats {
            session_id: None,
            state: SessionState::Idle,
            distance_m: 0.0,
            duration_s: 0.0,
            pace_s_per_km: None,
            current_speed: None,
            max_speed: None,
            elevation_gain_m: 0.0,
            point_count: 0,
            remaining_m: None,
            eta_s: None,
            waypoint_index: None,
            distance_to_route_m: None,
            off_route: false,
            rerouting: false,
            pending_upload: 0,
            last_error: None,
        }
    }
}

/// Receives a stats snapshot after each mutation
pub trait StatsObserver: Send {
    fn on_update(&mut self, stats: &TrackingStats);
}

impl<F> StatsObserver for F
where
    F: FnMut(&TrackingStats) + Send,
{
    fn on_update(&mut self, stats: &TrackingStats) {
        self(stats)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of change listeners. Delivery order across listeners is unspecified.
#[derive(Default)]
pub struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Box<dyn StatsObserver>)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn StatsObserver>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    /// Returns false if the id was not registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(lid, _)| *lid != id);
        self.entries.len() != before
    }

    pub fn notify(&mut self, stats: &TrackingStats) {
        for (_, observer) in self.entries.iter_mut() {
            observer.on_update(stats);
        }
    }
}

/// Observer that logs each snapshot at debug level
#[derive(Debug, Default)]
pub struct LogObserver;

impl StatsObserver for LogObserver {
    fn on_update(&mut self, stats: &TrackingStats) {
        debug!(
            state = %stats.state,
            distance = stats.distance_m.round(),
            duration = stats.duration_s.round(),
            remaining = ?stats.remaining_m.map(|r| r.round()),
            off_route = stats.off_route,
            rerouting = stats.rerouting,
            "Stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_notify_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut listeners = Listeners::new();
        for _ in 0..3 {
            let count = Arc::clone(&count);
            listeners.subscribe(Box::new(move |_: &TrackingStats| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        listeners.notify(&TrackingStats::default());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut listeners = Listeners::new();
        let c = Arc::clone(&count);
        let id = listeners.subscribe(Box::new(move |_: &TrackingStats| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let kept = Arc::new(AtomicUsize::new(0));
        let k = Arc::clone(&kept);
        listeners.subscribe(Box::new(move |_: &TrackingStats| {
            k.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));

        listeners.notify(&TrackingStats::default());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_stats() {
        let stats = TrackingStats::default();
        assert_eq!(stats.state, SessionState::Idle);
        assert!(!stats.off_route);
        assert!(stats.remaining_m.is_none());
    }
}
