// Routing service client - RoutingProvider over a GeoJSON directions endpoint

use std::time::Duration;

use tracing::debug;

use super::messages::{DirectionsRequest, DirectionsResponse};
use crate::error::RoutingError;
use crate::reroute::{RerouteRequest, RerouteResult, RoutingProvider};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Directions client.
///
/// POSTs `{"coordinates": [[lon, lat], ...]}` to the configured endpoint and
/// reads the first feature of the GeoJSON response. The API key, if any, is
/// sent as the `Authorization` header.
pub struct HttpRouter {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpRouter {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, RoutingError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        Ok(HttpRouter {
            http,
            url: url.to_string(),
            api_key,
        })
    }
}

impl RoutingProvider for HttpRouter {
    async fn compute_route(&self, request: &RerouteRequest) -> Result<RerouteResult, RoutingError> {
        let body = DirectionsRequest::from(request);
        let mut req = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/geo+json, application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header(reqwest::header::AUTHORIZATION, key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        let directions: DirectionsResponse =
            serde_json::from_slice(&bytes).map_err(|e| RoutingError::Decode(e.to_string()))?;
        let result = directions.into_result()?;

        debug!(
            points = result.points.len(),
            distance = result.distance_m,
            duration = result.duration_s,
            "Directions received"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RoutePoint;

    #[tokio::test]
    async fn test_unreachable_router_is_http_error() {
        let router = HttpRouter::new("http://127.0.0.1:9/v2/directions/foot-walking/geojson", None).unwrap();
        let request = RerouteRequest {
            origin: RoutePoint::new(41.0, 29.0),
            destination: RoutePoint::new(41.01, 29.01),
            waypoints: vec![],
        };
        let err = router.compute_route(&request).await.unwrap_err();
        assert!(matches!(err, RoutingError::Http(_)));
    }
}
