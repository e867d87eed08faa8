// Persistence gateway - backend contract for session lifecycle and point upload
//
// The engine never talks HTTP directly; it goes through this trait so the
// backend can be swapped for a spy in tests.

pub mod buffer;

pub use buffer::UploadBuffer;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::track::TrackPoint;

/// Totals sent when a session is finalized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub active_duration_s: f64,
    pub total_distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_gain_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_pace_s_per_km: Option<f64>,
}

/// Session as stored by the backend after `end_session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedSession {
    pub id: String,
    #[serde(default)]
    pub route_id: Option<String>,
    pub duration_s: f64,
    pub distance_m: f64,
    #[serde(default)]
    pub elevation_gain_m: Option<f64>,
    #[serde(default)]
    pub avg_pace_s_per_km: Option<f64>,
    #[serde(default)]
    pub point_count: Option<u64>,
}

/// Backend API for persisting runs
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Register a new session, returning the backend's identifier
    fn start_session(
        &self,
        route_id: Option<&str>,
        is_public: bool,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;

    /// Upload a batch of points. Idempotent by sequence number.
    fn upload_points(
        &self,
        session_id: &str,
        points: &[TrackPoint],
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Finalize the session with its totals
    fn end_session(
        &self,
        session_id: &str,
        summary: &SessionSummary,
    ) -> impl Future<Output = Result<FinalizedSession, GatewayError>> + Send;
}
