use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use opsgate_auth::{
    AuthError, DirectoryConfig, DirectoryConnector, IdentityBridge, LdapConnector, TokenIssuer,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::Instrument;
use ulid::Ulid;

use crate::broker::{BrokerError, SessionBroker};
use crate::config::{GatewayConfig, StartupError};
use crate::registry::{TargetRegistry, UnknownTarget};
use crate::upstream::UpstreamError;

mod argocd;
mod identity;
mod meta;
mod tekton;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    identity: IdentityBridge,
    registry: Arc<TargetRegistry>,
    broker: SessionBroker,
}

/// Authenticated caller, inserted by the identity middleware.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Builds the gateway router with an LDAPS directory connector trusting `ldap.ca_cert_path`.
pub fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let connector = LdapConnector::from_ca_file(
        &config.ldap.url,
        &config.ldap.ca_cert_path,
        config.directory_timeout(),
    )
    .map_err(startup_error)?;

    router_with_directory(config, Arc::new(connector))
}

pub fn router_with_directory(
    config: GatewayConfig,
    directory: Arc<dyn DirectoryConnector>,
) -> Result<Router, StartupError> {
    let issuer = TokenIssuer::new(config.token_secret.as_bytes()).map_err(startup_error)?;
    let identity = IdentityBridge::new(
        DirectoryConfig {
            base_dn: config.ldap.base_dn.clone(),
            bind_dn: config.ldap.bind_dn.clone(),
            bind_password: config.ldap.bind_password.clone(),
            account_attribute: config.ldap.account_attribute.clone(),
            object_class: config.ldap.object_class.clone(),
            operation_timeout: config.directory_timeout(),
        },
        directory,
        issuer,
    );

    if config.ldap.bind_password.is_none() {
        tracing::warn!("directory bind password is not set; logins will fail");
    }

    let registry = Arc::new(TargetRegistry::from_config(&config)?);
    let broker = SessionBroker::new(registry.clone());
    let cors = cors_layer(&config.allowed_origins)?;

    let state = AppState {
        config: Arc::new(config),
        identity,
        registry,
        broker,
    };

    let protected = Router::new()
        .route("/api/apps", get(argocd::list_apps))
        .route("/api/restart", post(argocd::restart))
        .route("/api/sync", post(argocd::sync))
        .route("/api/targets", get(meta::targets))
        .route("/api/tekton/pipelineruns", get(tekton::pipeline_runs))
        .route("/api/tekton/pipelineruns/{name}", get(tekton::pipeline_run))
        .route("/api/tekton/taskruns", get(tekton::task_runs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    Ok(Router::new()
        .route("/healthz", get(meta::healthz))
        .route("/metrics", get(meta::metrics))
        .route("/api/login", post(identity::login))
        .merge(protected)
        .layer(middleware::from_fn(track_request))
        .layer(cors)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, StartupError> {
    let origins = origins
        .iter()
        .map(|origin| {
            if origin == "*" {
                return Err(StartupError {
                    code: "ERR_INVALID_CONFIG",
                    message: "frontend.allowed_origins cannot contain * when credentials are allowed"
                        .to_string(),
                });
            }
            HeaderValue::from_str(origin).map_err(|_| StartupError {
                code: "ERR_INVALID_CONFIG",
                message: format!("frontend.allowed_origins entry {} is not a valid origin", origin),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 60 * 60)))
}

/// Assigns a request id, wraps the request in a span and records HTTP metrics.
async fn track_request(request: Request, next: Next) -> Response {
    let request_id = extract_request_id(request.headers());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        route = %route,
        method = %method,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    let started = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    span.record("status", u64::from(status));
    span.record("latency_ms", started.elapsed().as_millis() as u64);
    crate::metrics::observe_http_request(&route, &method, status, started.elapsed());
    span.in_scope(|| tracing::info!(status, "gateway.request"));

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = opsgate_auth::bearer_token(request.headers()).map_err(unauthorized)?;
    let claims = state.identity.verify(&token).map_err(unauthorized)?;

    request.extensions_mut().insert(Identity {
        subject: claims.sub,
    });
    Ok(next.run(request).await)
}

fn unauthorized(err: AuthError) -> ApiError {
    json_error(StatusCode::UNAUTHORIZED, err.code, err.message, false)
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

fn startup_error(err: AuthError) -> StartupError {
    StartupError {
        code: err.code,
        message: err.message,
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    error: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    error: impl Into<String>,
    retryable: bool,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            error: error.into(),
            retryable,
            detail: None,
        }),
    )
}

fn unknown_target_error(err: &UnknownTarget) -> ApiError {
    json_error(StatusCode::BAD_REQUEST, "ERR_UNKNOWN_TARGET", err.to_string(), false)
}

fn broker_error(err: BrokerError) -> ApiError {
    match err {
        BrokerError::UnknownTarget(err) => unknown_target_error(&err),
        BrokerError::BackendUnreachable(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_BACKEND_UNREACHABLE",
            "backend login failed",
            true,
        ),
        BrokerError::AuthRejected { body, .. } => {
            let (status, Json(mut payload)) = json_error(
                StatusCode::UNAUTHORIZED,
                "ERR_BACKEND_AUTH_REJECTED",
                "backend login rejected",
                false,
            );
            payload.detail = Some(body);
            (status, Json(payload))
        }
        err @ (BrokerError::InvalidResponse(_) | BrokerError::Misconfigured(_)) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.code(),
            err.to_string(),
            false,
        ),
    }
}

fn upstream_error(err: UpstreamError) -> ApiError {
    match err {
        UpstreamError::Unreachable(reason) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_BACKEND_UNREACHABLE",
            format!("backend unreachable: {}", reason),
            true,
        ),
        UpstreamError::Status { status, body } => {
            let status = StatusCode::from_u16(status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let error = if body.is_empty() {
                format!("backend responded with status {}", status.as_u16())
            } else {
                body
            };
            json_error(status, "ERR_UPSTREAM_STATUS", error, false)
        }
        err @ UpstreamError::InvalidResponse(_) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.code(),
            err.to_string(),
            false,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_request_id_keeps_safe_characters() {
        assert_eq!(
            sanitize_request_id("abc-123_x.y z/<>"),
            Some("abc-123_x.yz".to_string())
        );
        assert_eq!(sanitize_request_id("<>/"), None);
        assert_eq!(sanitize_request_id(&"a".repeat(100)).map(|s| s.len()), Some(64));
    }

    #[test]
    fn upstream_status_is_passed_through_with_raw_body() {
        let (status, Json(body)) = upstream_error(UpstreamError::Status {
            status: 403,
            body: "permission denied".to_string(),
        });
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "ERR_UPSTREAM_STATUS");
        assert_eq!(body.error, "permission denied");
    }

    #[test]
    fn non_error_upstream_status_becomes_bad_gateway() {
        let (status, _) = upstream_error(UpstreamError::Status {
            status: 204,
            body: String::new(),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn backend_auth_rejection_carries_backend_body() {
        let (status, Json(body)) = broker_error(BrokerError::AuthRejected {
            status: 401,
            body: "{\"error\":\"invalid session\"}".to_string(),
        });
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "ERR_BACKEND_AUTH_REJECTED");
        assert_eq!(body.detail.as_deref(), Some("{\"error\":\"invalid session\"}"));
    }

    #[test]
    fn cors_rejects_invalid_origin_values() {
        let err = cors_layer(&["https://ok.example".to_string(), "bad\norigin".to_string()])
            .unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn cors_rejects_wildcard_origin() {
        let err = cors_layer(&["https://ok.example".to_string(), "*".to_string()]).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
        assert!(err.message.contains("allowed_origins"));
    }
}
