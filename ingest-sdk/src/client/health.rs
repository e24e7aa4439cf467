use reqwest::{Client, StatusCode};
use url::Url;

use super::ClientError;
use crate::objects::DeepHealthResponse;

/// Typed HTTP client for the deep health endpoint.
#[derive(Debug, Clone)]
pub struct HealthClient {
    http: Client,
    base_url: Url,
}

impl HealthClient {
    /// Create a new `HealthClient` for the server rooted at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /system/health/deep`.
    ///
    /// An unhealthy deployment answers `503` with the same body, so both
    /// `200` and `503` are decoded.
    pub async fn deep_health(&self) -> Result<DeepHealthResponse, ClientError> {
        let url = self.base_url.join("/system/health/deep")?;
        let resp = self.http.get(url).send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() || status == StatusCode::SERVICE_UNAVAILABLE {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(ClientError::Api { status, body })
        }
    }
}
