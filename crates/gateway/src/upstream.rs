use reqwest::{RequestBuilder, Response, StatusCode};

use crate::metrics;

/// Failure of an outbound call after a backend session (or static token) is in hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    Unreachable(String),
    /// The backend answered with something other than 200; body is kept verbatim.
    Status { status: u16, body: String },
    InvalidResponse(String),
}

impl UpstreamError {
    pub fn code(&self) -> &'static str {
        match self {
            UpstreamError::Unreachable(_) => "ERR_BACKEND_UNREACHABLE",
            UpstreamError::Status { .. } => "ERR_UPSTREAM_STATUS",
            UpstreamError::InvalidResponse(_) => "ERR_BACKEND_INVALID_RESPONSE",
        }
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Unreachable(message) => write!(f, "backend unreachable: {}", message),
            UpstreamError::Status { status, .. } => {
                write!(f, "backend responded with status {}", status)
            }
            UpstreamError::InvalidResponse(message) => {
                write!(f, "backend response invalid: {}", message)
            }
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Sends `request` and returns the response only when the backend answered 200.
pub(crate) async fn send(
    request: RequestBuilder,
    kind: &'static str,
    operation: &'static str,
) -> Result<Response, UpstreamError> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            metrics::observe_backend_call(kind, operation, "unreachable");
            return Err(UpstreamError::Unreachable(transport_reason(&err)));
        }
    };

    if response.status() != StatusCode::OK {
        metrics::observe_backend_call(kind, operation, "rejected");
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status { status, body });
    }

    metrics::observe_backend_call(kind, operation, "ok");
    Ok(response)
}

pub(crate) async fn read_text(response: Response) -> Result<String, UpstreamError> {
    response
        .text()
        .await
        .map_err(|err| UpstreamError::Unreachable(transport_reason(&err)))
}

/// Short description of a transport failure that never includes the request URL.
pub(crate) fn transport_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_decode() || err.is_body() {
        "response body could not be read".to_string()
    } else {
        "request failed".to_string()
    }
}
