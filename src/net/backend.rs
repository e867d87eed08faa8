// Backend API client - PersistenceGateway over HTTP/JSON

use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::messages::{EndSessionRequest, StartSessionRequest, StartSessionResponse, UploadPointsRequest};
use crate::error::GatewayError;
use crate::gateway::{FinalizedSession, PersistenceGateway, SessionSummary};
use crate::track::TrackPoint;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend client.
///
/// Endpoints, relative to the base URL:
/// - `POST /sessions` registers a session
/// - `POST /sessions/{id}/points` appends a batch of points
/// - `POST /sessions/{id}/end` finalizes with totals
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(HttpGateway {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        debug!(url = %url, bytes = bytes.len(), "Backend response");
        // Empty bodies decode as JSON null
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

impl PersistenceGateway for HttpGateway {
    async fn start_session(&self, route_id: Option<&str>, is_public: bool) -> Result<String, GatewayError> {
        let body = StartSessionRequest {
            route_id,
            is_public,
            started_at: Utc::now(),
        };
        let response: StartSessionResponse = self.post("/sessions", &body).await?;
        Ok(response.id)
    }

    async fn upload_points(&self, session_id: &str, points: &[TrackPoint]) -> Result<(), GatewayError> {
        let body = UploadPointsRequest { points };
        let _: serde_json::Value = self
            .post(&format!("/sessions/{}/points", session_id), &body)
            .await?;
        Ok(())
    }

    async fn end_session(
        &self,
        session_id: &str,
        summary: &SessionSummary,
    ) -> Result<FinalizedSession, GatewayError> {
        let body = EndSessionRequest {
            summary,
            ended_at: Utc::now(),
        };
        self.post(&format!("/sessions/{}/end", session_id), &body).await
    }
}
