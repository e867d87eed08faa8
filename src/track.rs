// Position samples and recorded track points

use serde::{Deserialize, Serialize};

use crate::error::TrackingError;
use crate::geodesy;

/// A raw fix as delivered by a position source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
    /// Ground speed in m/s
    #[serde(default)]
    pub speed: Option<f64>,
    /// Unix timestamp in seconds
    pub timestamp: f64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Self {
        PositionSample {
            latitude,
            longitude,
            elevation: None,
            speed: None,
            timestamp,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Reject NaN/infinite values and out-of-range coordinates
    pub fn validate(&self) -> Result<(), TrackingError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(TrackingError::InvalidSample(format!(
                "non-finite coordinates ({}, {})",
                self.latitude, self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(TrackingError::InvalidSample(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(TrackingError::InvalidSample(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        if !self.timestamp.is_finite() {
            return Err(TrackingError::InvalidSample("non-finite timestamp".to_string()));
        }
        if self.elevation.is_some_and(|e| !e.is_finite()) {
            return Err(TrackingError::InvalidSample("non-finite elevation".to_string()));
        }
        if self.speed.is_some_and(|s| !s.is_finite() || s < 0.0) {
            return Err(TrackingError::InvalidSample(format!(
                "invalid speed {:?}",
                self.speed
            )));
        }
        Ok(())
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// A sample accepted into a session, with its sequence number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub seq: u64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: f64,
}

impl TrackPoint {
    pub fn from_sample(seq: u64, sample: &PositionSample) -> Self {
        TrackPoint {
            seq,
            latitude: sample.latitude,
            longitude: sample.longitude,
            elevation: sample.elevation,
            speed: sample.speed,
            timestamp: sample.timestamp,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Great-circle distance to another point in meters
    pub fn distance_to(&self, other: &TrackPoint) -> f64 {
        geodesy::greatcircle(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sample() {
        let s = PositionSample::new(41.0, 29.0, 1000.0)
            .with_elevation(35.0)
            .with_speed(3.2);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_nan_rejected() {
        let s = PositionSample::new(f64::NAN, 29.0, 1000.0);
        assert!(matches!(s.validate(), Err(TrackingError::InvalidSample(_))));

        let s = PositionSample::new(41.0, f64::INFINITY, 1000.0);
        assert!(matches!(s.validate(), Err(TrackingError::InvalidSample(_))));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(PositionSample::new(91.0, 29.0, 0.0).validate().is_err());
        assert!(PositionSample::new(41.0, -181.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_bad_optional_fields_rejected() {
        let s = PositionSample::new(41.0, 29.0, 0.0).with_speed(-1.0);
        assert!(s.validate().is_err());

        let s = PositionSample::new(41.0, 29.0, 0.0).with_elevation(f64::NAN);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_sample_json_defaults() {
        let s: PositionSample =
            serde_json::from_str(r#"{"latitude": 41.0, "longitude": 29.0, "timestamp": 5.0}"#)
                .unwrap();
        assert_eq!(s.elevation, None);
        assert_eq!(s.speed, None);
    }

    #[test]
    fn test_track_point_json_skips_missing() {
        let p = TrackPoint::from_sample(3, &PositionSample::new(41.0, 29.0, 5.0));
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("elevation"));
        assert!(json.contains("\"seq\":3"));
    }
}
