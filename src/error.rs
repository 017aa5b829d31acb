//! Error classification for the tool boundary. Every failure comes out as
//! a [`ToolError`]; callers never see a raw transport error or HTTP status.

use std::fmt;

use serde::Serialize;

use crate::client::{ApiResponse, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// The Cube.js API could not be reached: timeout, refused connection,
    /// DNS failure.
    ConnectivityFailure,
    /// The API rejected the configured credential (HTTP 401/403).
    AuthenticationFailure,
    /// The API is throttling requests (HTTP 429).
    RateLimited,
    /// The query was rejected, either by local validation or by Cube.js.
    InvalidQuery,
    /// The API reported an internal failure (HTTP 5xx).
    RemoteServiceFailure,
    /// The response did not match the expected schema.
    UnexpectedResponse,
}

impl ErrorKind {
    /// Whether the caller may retry the same call and expect it to succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectivityFailure
                | ErrorKind::RateLimited
                | ErrorKind::RemoteServiceFailure
        )
    }
}

/// The only error representation that crosses the tool boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.retryable(),
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery, message)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Classify a failure that happened before any HTTP response arrived.
pub fn classify_transport(err: &TransportError) -> ToolError {
    ToolError::new(
        ErrorKind::ConnectivityFailure,
        format!("could not reach the Cube.js API: {err}"),
    )
}

/// Classify a non-success HTTP response. First match wins:
/// 401/403, then 429, then other 4xx, then 5xx, then everything else.
pub fn classify_response(response: &ApiResponse, token_configured: bool) -> ToolError {
    let status = response.status;
    match status {
        401 | 403 => {
            let hint = if token_configured {
                "the configured CUBEJS_API_TOKEN was not accepted"
            } else {
                "no CUBEJS_API_TOKEN is configured and the deployment requires one"
            };
            ToolError::new(
                ErrorKind::AuthenticationFailure,
                format!("Cube.js rejected the request (HTTP {status}): {hint}"),
            )
        }
        429 => {
            let message = match response.retry_after {
                Some(secs) => {
                    format!("Cube.js is rate limiting requests; retry after {secs}s")
                }
                None => "Cube.js is rate limiting requests; retry later".to_string(),
            };
            ToolError::new(ErrorKind::RateLimited, message)
        }
        400..=499 => match response.error_detail() {
            Some(detail) => ToolError::invalid_query(format!("Cube.js rejected the query: {detail}")),
            None => ToolError::new(
                ErrorKind::UnexpectedResponse,
                format!("Cube.js returned HTTP {status} without an error detail"),
            ),
        },
        500..=599 => {
            let message = match response.error_detail() {
                Some(detail) => {
                    format!("Cube.js reported an internal error (HTTP {status}): {detail}")
                }
                None => format!("Cube.js reported an internal error (HTTP {status})"),
            };
            ToolError::new(ErrorKind::RemoteServiceFailure, message)
        }
        _ => ToolError::new(
            ErrorKind::UnexpectedResponse,
            format!("unexpected HTTP {status} from the Cube.js API"),
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    fn response(status: u16, retry_after: Option<u64>, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            retry_after,
            body: body.to_string(),
        }
    }

    #[rstest]
    #[case::timeout(TransportError::Timeout)]
    #[case::refused(TransportError::Connect("connection refused".to_string()))]
    #[case::dns(TransportError::Request("dns error".to_string()))]
    fn transport_failures_are_retryable_connectivity(#[case] err: TransportError) {
        let tool_error = classify_transport(&err);
        assert_eq!(tool_error.kind, ErrorKind::ConnectivityFailure);
        assert!(tool_error.retryable);
    }

    #[rstest]
    #[case::unauthorized(401)]
    #[case::forbidden(403)]
    fn auth_statuses_are_not_retryable(#[case] status: u16) {
        let tool_error = classify_response(&response(status, None, ""), true);
        assert_eq!(tool_error.kind, ErrorKind::AuthenticationFailure);
        assert!(!tool_error.retryable);
        assert!(tool_error.message.contains("CUBEJS_API_TOKEN"));
    }

    #[test]
    fn auth_message_names_the_missing_token() {
        let tool_error = classify_response(&response(401, None, ""), false);
        assert!(tool_error.message.contains("no CUBEJS_API_TOKEN is configured"));
    }

    #[test]
    fn rate_limit_surfaces_retry_after_hint() {
        let tool_error = classify_response(&response(429, Some(5), ""), true);
        assert_eq!(tool_error.kind, ErrorKind::RateLimited);
        assert!(tool_error.retryable);
        assert!(tool_error.message.contains("5s"));
    }

    #[test]
    fn rate_limit_without_hint_still_classifies() {
        let tool_error = classify_response(&response(429, None, ""), true);
        assert_eq!(tool_error.kind, ErrorKind::RateLimited);
    }

    #[test]
    fn client_error_with_detail_echoes_remote_message() {
        let body = r#"{"error": "Member Orders.nope not found"}"#;
        let tool_error = classify_response(&response(400, None, body), true);
        assert_eq!(tool_error.kind, ErrorKind::InvalidQuery);
        assert!(!tool_error.retryable);
        assert!(tool_error.message.contains("Member Orders.nope not found"));
    }

    #[test]
    fn client_error_without_detail_is_unexpected() {
        let tool_error = classify_response(&response(404, None, "not found"), true);
        assert_eq!(tool_error.kind, ErrorKind::UnexpectedResponse);
        assert!(!tool_error.retryable);
    }

    #[rstest]
    #[case::internal(500)]
    #[case::bad_gateway(502)]
    fn server_errors_are_retryable(#[case] status: u16) {
        let tool_error = classify_response(&response(status, None, ""), true);
        assert_eq!(tool_error.kind, ErrorKind::RemoteServiceFailure);
        assert!(tool_error.retryable);
    }

    #[test]
    fn redirect_is_unexpected() {
        let tool_error = classify_response(&response(302, None, ""), true);
        assert_eq!(tool_error.kind, ErrorKind::UnexpectedResponse);
    }

    #[test]
    fn tool_error_serializes_for_the_tool_boundary() {
        let tool_error = ToolError::invalid_query("cube name must not be empty");
        let json = serde_json::to_value(&tool_error).unwrap();
        assert_eq!(json["kind"], "InvalidQuery");
        assert_eq!(json["retryable"], false);
        assert_eq!(json["message"], "cube name must not be empty");
    }
}
