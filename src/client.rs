//! HTTP transport for the Cube.js REST API. Single attempt, no retries.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use thiserror::Error;

use crate::config::CubeApiConfig;

const HEALTH_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// A GET request against the Cube.js API, relative to the configured base
/// URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: &'static str,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            path,
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: String) -> Self {
        self.query.push((key.to_string(), value));
        self
    }
}

/// Raw status and body of a Cube.js API response, before classification.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error detail reported by Cube.js in the response body, if any.
    /// Cube.js returns `{"error": "..."}` for rejected queries.
    pub fn error_detail(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        value
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Transport seam between the tool entry points and the network.
#[async_trait]
pub trait CubeTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Probe the readiness endpoint at the server root.
    async fn health(&self) -> Result<ApiResponse, TransportError>;
}

/// Production transport over a pooled `reqwest` client.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &CubeApiConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// The readiness probe lives at the deployment root, not under the
    /// versioned API base path.
    fn root_url(&self) -> String {
        match self.base_url.split("/cubejs-api").next() {
            Some(root) if !root.is_empty() => root.to_string(),
            _ => self.base_url.clone(),
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.api_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    async fn dispatch(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse, TransportError> {
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!("Cube.js responded with HTTP {}", status);
        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl CubeTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(request.path);
        debug!("GET {}", url);

        let mut builder = self.client.get(&url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        self.dispatch(self.apply_auth(builder)).await
    }

    async fn health(&self) -> Result<ApiResponse, TransportError> {
        let url = format!("{}/readyz", self.root_url());
        debug!("GET {}", url);

        let builder = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS));
        self.dispatch(builder).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(base_url: &str) -> CubeApiConfig {
        CubeApiConfig {
            base_url: base_url.to_string(),
            api_token: None,
            timeout_secs: 30,
        }
    }

    #[test]
    fn url_joins_base_and_path() {
        let transport = HttpTransport::new(&config("http://localhost:4000/cubejs-api/v1/")).unwrap();
        assert_eq!(
            transport.url("meta"),
            "http://localhost:4000/cubejs-api/v1/meta"
        );
        assert_eq!(
            transport.url("/load"),
            "http://localhost:4000/cubejs-api/v1/load"
        );
    }

    #[test]
    fn root_url_strips_api_base_path() {
        let transport = HttpTransport::new(&config("http://cube.example.com/cubejs-api/v1")).unwrap();
        assert_eq!(transport.root_url(), "http://cube.example.com");
    }

    #[test]
    fn root_url_falls_back_to_base_url() {
        let transport = HttpTransport::new(&config("http://localhost:4000")).unwrap();
        assert_eq!(transport.root_url(), "http://localhost:4000");
    }

    #[test]
    fn error_detail_reads_cube_error_field() {
        let response = ApiResponse {
            status: 400,
            retry_after: None,
            body: r#"{"error": "Cube Orders not found"}"#.to_string(),
        };
        assert_eq!(
            response.error_detail().as_deref(),
            Some("Cube Orders not found")
        );
    }

    #[test]
    fn error_detail_is_none_for_non_json_body() {
        let response = ApiResponse {
            status: 502,
            retry_after: None,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(response.error_detail(), None);
    }
}
