//! HTTP client for the remote fusion service.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{FusionError, FusionRequest, FusionResponse, FusionService, ServiceErrorBody};

const ANALYZE_PATH: &str = "/analyze";

/// Maximum length of an unparsed error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone)]
pub struct FusionClient {
    client: reqwest::Client,
    endpoint: String,
}

impl FusionClient {
    /// Build a client for `base_url`. `timeout` of `None` leaves requests
    /// unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, FusionError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(FusionError::TransportFailure(
                "Fusion service URL is required".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| {
                FusionError::TransportFailure(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url, ANALYZE_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Interpret a response body. Split out of `analyze` so the status/body
    /// rules can be tested without a server.
    pub(crate) fn parse_response(status: u16, body: &str) -> Result<FusionResponse, FusionError> {
        let is_success = (200..300).contains(&status);
        let json: Option<serde_json::Value> = serde_json::from_str(body).ok();

        let error_message = json
            .as_ref()
            .and_then(|v| serde_json::from_value::<ServiceErrorBody>(v.clone()).ok())
            .map(|b| b.error);

        if !is_success {
            let message = error_message.unwrap_or_else(|| {
                let truncated: String = body.chars().take(MAX_ERROR_BODY).collect();
                format!("HTTP {}: {}", status, truncated)
            });
            return Err(FusionError::ServiceError(message));
        }

        if let Some(message) = error_message {
            return Err(FusionError::ServiceError(message));
        }

        let json = json.ok_or_else(|| {
            FusionError::TransportFailure("Fusion response was not valid JSON".to_string())
        })?;
        serde_json::from_value(json)
            .map_err(|e| FusionError::TransportFailure(format!("Malformed fusion response: {}", e)))
    }
}

#[async_trait]
impl FusionService for FusionClient {
    async fn analyze(&self, request: &FusionRequest) -> Result<FusionResponse, FusionError> {
        info!(
            "Fusion request: text={} chars, face_scores={}",
            request.text.chars().count(),
            request.face_scores.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| FusionError::TransportFailure(format!("Fusion request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                FusionError::TransportFailure(format!("Failed to read fusion response: {}", e))
            })?;

        debug!("Fusion response: status={}, {} bytes", status, body.len());
        Self::parse_response(status.as_u16(), &body)
    }
}
