// Error taxonomy for the tracking engine and its collaborators

use std::fmt;

/// Why a position source could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Location services are switched off on the device
    ServiceDisabled,
    /// Permission was denied but may still be granted on request
    PermissionDenied,
    /// Permission was denied and the user must change it in system settings
    PermissionDeniedForever,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::ServiceDisabled => write!(f, "location service disabled"),
            UnavailableReason::PermissionDenied => write!(f, "location permission denied"),
            UnavailableReason::PermissionDeniedForever => {
                write!(f, "location permission permanently denied")
            }
        }
    }
}

/// Errors surfaced by the tracking engine
///
/// None of these are swallowed: every failing operation returns one to its caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackingError {
    /// Fatal to `start`; recoverable once the user enables the service or grants permission.
    #[error("position source unavailable: {0}")]
    SourceUnavailable(UnavailableReason),

    /// Non-fatal; the points stay buffered for the next flush.
    #[error("point upload failed ({pending} points retained): {reason}")]
    UploadFailed { pending: usize, reason: String },

    /// Non-fatal to in-memory stats; the caller may retry the save or discard.
    #[error("failed to finalize session: {0}")]
    EndSessionFailed(String),

    /// Non-fatal; the previous route keeps being tracked.
    #[error("route computation failed: {0}")]
    RouteComputeFailed(String),

    /// Sample dropped; accumulators untouched.
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    /// Lifecycle call not valid in the current session state.
    #[error("cannot {op} while session is {state}")]
    InvalidState { op: &'static str, state: String },
}

/// Failure talking to the persistence backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Failure talking to the routing provider
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("provider returned an empty route")]
    Empty,
}

impl From<RoutingError> for TrackingError {
    fn from(e: RoutingError) -> Self {
        TrackingError::RouteComputeFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_reasons_are_distinct() {
        let a = TrackingError::SourceUnavailable(UnavailableReason::ServiceDisabled);
        let b = TrackingError::SourceUnavailable(UnavailableReason::PermissionDenied);
        let c = TrackingError::SourceUnavailable(UnavailableReason::PermissionDeniedForever);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(c.to_string().contains("permanently"));
    }

    #[test]
    fn test_routing_error_conversion() {
        let e: TrackingError = RoutingError::Empty.into();
        assert_eq!(
            e,
            TrackingError::RouteComputeFailed("provider returned an empty route".to_string())
        );
    }

    #[test]
    fn test_upload_failed_message() {
        let e = TrackingError::UploadFailed {
            pending: 12,
            reason: "HTTP 503 from http://x/points".to_string(),
        };
        assert!(e.to_string().contains("12 points retained"));
    }
}
