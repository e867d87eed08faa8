// Wire types for the backend API, the routing service and route files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::gateway::SessionSummary;
use crate::reroute::{RerouteRequest, RerouteResult};
use crate::route::{RoutePlan, RoutePoint};
use crate::track::TrackPoint;

/// POST /sessions
#[derive(Debug, Serialize)]
pub struct StartSessionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<&'a str>,
    pub is_public: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionResponse {
    #[serde(alias = "session_id")]
    pub id: String,
}

/// POST /sessions/{id}/points
#[derive(Debug, Serialize)]
pub struct UploadPointsRequest<'a> {
    pub points: &'a [TrackPoint],
}

/// POST /sessions/{id}/end
#[derive(Debug, Serialize)]
pub struct EndSessionRequest<'a> {
    #[serde(flatten)]
    pub summary: &'a SessionSummary,
    pub ended_at: DateTime<Utc>,
}

/// Directions request. Coordinates are `[lon, lat]` pairs, origin first.
#[derive(Debug, Serialize, PartialEq)]
pub struct DirectionsRequest {
    pub coordinates: Vec<[f64; 2]>,
}

impl From<&RerouteRequest> for DirectionsRequest {
    fn from(req: &RerouteRequest) -> Self {
        let coordinates = std::iter::once(&req.origin)
            .chain(req.waypoints.iter())
            .chain(std::iter::once(&req.destination))
            .map(|p| [p.longitude, p.latitude])
            .collect();
        DirectionsRequest { coordinates }
    }
}

/// GeoJSON directions response, first feature only
#[derive(Debug, Deserialize)]
pub struct DirectionsResponse {
    pub features: Vec<RouteFeature>,
}

#[derive(Debug, Deserialize)]
pub struct RouteFeature {
    pub geometry: LineString,
    #[serde(default)]
    pub properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
pub struct LineString {
    /// `[lon, lat]` or `[lon, lat, elevation]`
    pub coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeatureProperties {
    #[serde(default)]
    pub summary: RouteSummary,
}

#[derive(Debug, Default, Deserialize)]
pub struct RouteSummary {
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
}

impl DirectionsResponse {
    pub fn into_result(self) -> Result<RerouteResult, RoutingError> {
        let feature = self.features.into_iter().next().ok_or(RoutingError::Empty)?;
        let points = feature
            .geometry
            .coordinates
            .iter()
            .map(|c| match c.as_slice() {
                [lon, lat, ..] => Ok(RoutePoint::new(*lat, *lon)),
                _ => Err(RoutingError::Decode(format!("bad coordinate {:?}", c))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if points.is_empty() {
            return Err(RoutingError::Empty);
        }
        Ok(RerouteResult {
            points,
            distance_m: feature.properties.summary.distance,
            duration_s: feature.properties.summary.duration,
        })
    }
}

/// Planned route as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub points: Vec<RoutePoint>,
    /// Indices of intermediate waypoints in `points`
    #[serde(default)]
    pub via: Vec<usize>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default)]
    pub duration_s: Option<f64>,
}

impl RouteDocument {
    pub fn into_plan(self) -> Result<RoutePlan, RoutingError> {
        let mut plan = RoutePlan::new(self.points)?.with_via(self.via);
        if let Some(d) = self.distance_m {
            plan = plan.with_planned_distance(d);
        }
        if let Some(t) = self.duration_s {
            plan = plan.with_planned_duration(t);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions_request_order() {
        let req = RerouteRequest {
            origin: RoutePoint::new(41.0, 29.0),
            destination: RoutePoint::new(41.2, 29.2),
            waypoints: vec![RoutePoint::new(41.1, 29.1)],
        };
        let body = DirectionsRequest::from(&req);
        assert_eq!(body.coordinates, vec![[29.0, 41.0], [29.1, 41.1], [29.2, 41.2]]);
    }

    #[test]
    fn test_directions_response_decode() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"summary": {"distance": 1234.5, "duration": 456.7}, "way_points": [0, 2]},
                "geometry": {"type": "LineString", "coordinates": [[29.0, 41.0], [29.05, 41.05, 12.0], [29.1, 41.1]]}
            }],
            "bbox": [29.0, 41.0, 29.1, 41.1]
        }"#;
        let resp: DirectionsResponse = serde_json::from_str(json).unwrap();
        let result = resp.into_result().unwrap();
        assert_eq!(result.points.len(), 3);
        assert_eq!(result.points[0], RoutePoint::new(41.0, 29.0));
        assert_eq!(result.points[1], RoutePoint::new(41.05, 29.05));
        assert_eq!(result.distance_m, 1234.5);
        assert_eq!(result.duration_s, 456.7);
    }

    #[test]
    fn test_directions_response_empty() {
        let resp: DirectionsResponse = serde_json::from_str(r#"{"features": []}"#).unwrap();
        assert!(matches!(resp.into_result(), Err(RoutingError::Empty)));

        let resp: DirectionsResponse =
            serde_json::from_str(r#"{"features": [{"geometry": {"coordinates": [[29.0]]}}]}"#).unwrap();
        assert!(matches!(resp.into_result(), Err(RoutingError::Decode(_))));
    }

    #[test]
    fn test_end_session_body_is_flat() {
        let summary = SessionSummary {
            active_duration_s: 600.0,
            total_distance_m: 2000.0,
            elevation_gain_m: None,
            avg_pace_s_per_km: Some(300.0),
        };
        let body = EndSessionRequest {
            summary: &summary,
            ended_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["active_duration_s"], 600.0);
        assert_eq!(value["avg_pace_s_per_km"], 300.0);
        assert!(value.get("elevation_gain_m").is_none());
        assert_eq!(value["ended_at"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_start_session_response_alias() {
        let a: StartSessionResponse = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        let b: StartSessionResponse = serde_json::from_str(r#"{"session_id": "abc", "x": 1}"#).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_route_document_into_plan() {
        let json = r#"{
            "id": "r-1",
            "points": [
                {"latitude": 41.0, "longitude": 29.0},
                {"latitude": 41.001, "longitude": 29.0},
                {"latitude": 41.002, "longitude": 29.0}
            ],
            "via": [1],
            "duration_s": 120.0
        }"#;
        let doc: RouteDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.id.as_deref(), Some("r-1"));
        let plan = doc.into_plan().unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.planned_duration_s(), Some(120.0));
        assert_eq!(plan.via_after(0).len(), 1);

        let empty: RouteDocument = serde_json::from_str(r#"{"points": []}"#).unwrap();
        assert!(matches!(empty.into_plan(), Err(RoutingError::Empty)));
    }
}
