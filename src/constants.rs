// Shared tuning constants for tracking and navigation

/// Default off-route threshold (m). Deviation beyond this flags the runner as off route.
pub const OFF_ROUTE_THRESHOLD_M: f64 = 50.0;

/// Distance covered before the observed pace replaces the planned pace for ETA (m).
pub const MIN_PACE_DISTANCE_M: f64 = 100.0;

/// Pace used when neither observed nor planned pace is available (s/m). 6:00 min/km.
pub const FALLBACK_PACE_S_PER_M: f64 = 0.36;

/// Interval of the display clock tick (ms).
pub const TICK_INTERVAL_MS: u64 = 1000;

/// Max points per upload request.
pub const UPLOAD_BATCH_SIZE: usize = 50;

/// Capacity of the sample channel between a position source and the engine.
pub const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the command channel between a handle and the engine.
pub const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Meters per kilometer, for pace reporting in s/km.
pub const M_PER_KM: f64 = 1000.0;
