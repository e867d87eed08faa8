use clap::Parser;

use crate::constants::{
    FALLBACK_PACE_S_PER_M, MIN_PACE_DISTANCE_M, OFF_ROUTE_THRESHOLD_M, TICK_INTERVAL_MS,
    UPLOAD_BATCH_SIZE,
};

/// Stride replay configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON file with an array of position samples to replay.
    #[arg(long, value_name = "FILE")]
    pub track: String,

    /// JSON file with the planned route to follow.
    #[arg(long, value_name = "FILE")]
    pub route: Option<String>,

    /// Distance from the route (m) beyond which the runner is off route.
    #[arg(long, default_value_t = OFF_ROUTE_THRESHOLD_M)]
    pub off_route_threshold: f64,

    /// Display clock tick interval in milliseconds.
    #[arg(long, default_value_t = TICK_INTERVAL_MS)]
    pub tick_ms: u64,

    /// Max points per upload request.
    #[arg(long, default_value_t = UPLOAD_BATCH_SIZE)]
    pub upload_batch: usize,

    /// Upload points while running instead of only when the session is saved.
    #[arg(long, default_value_t = false)]
    pub live_upload: bool,

    /// Base URL of the backend API. Without it the session is discarded at the end.
    #[arg(long, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Bearer token for the backend API.
    #[arg(long, env = "STRIDE_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Routing service directions endpoint. Without it reroutes are straight lines.
    #[arg(long, value_name = "URL")]
    pub routing_url: Option<String>,

    /// API key for the routing service.
    #[arg(long, env = "STRIDE_ROUTING_KEY", hide_env_values = true)]
    pub routing_key: Option<String>,

    /// Mark the saved session as public.
    #[arg(long, default_value_t = false)]
    pub public: bool,

    /// Write the recorded track in CSV format to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_csv: Option<String>,

    /// Replay speed multiplier; 0 replays as fast as possible.
    #[arg(long, default_value_t = 0.0)]
    pub replay_speed: f64,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            off_route_threshold_m: self.off_route_threshold,
            tick_interval_ms: self.tick_ms.max(1),
            upload_batch_size: self.upload_batch.max(1),
            live_upload: self.live_upload,
            ..EngineConfig::default()
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub off_route_threshold_m: f64,
    /// Distance after which observed pace drives the ETA (m)
    pub min_pace_distance_m: f64,
    /// Pace used when the plan has no planned duration (s/m)
    pub fallback_pace_s_per_m: f64,
    pub tick_interval_ms: u64,
    pub upload_batch_size: usize,
    /// Flush points during the run; registers the backend session on first flush
    pub live_upload: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            off_route_threshold_m: OFF_ROUTE_THRESHOLD_M,
            min_pace_distance_m: MIN_PACE_DISTANCE_M,
            fallback_pace_s_per_m: FALLBACK_PACE_S_PER_M,
            tick_interval_ms: TICK_INTERVAL_MS,
            upload_batch_size: UPLOAD_BATCH_SIZE,
            live_upload: false,
        }
    }
}
