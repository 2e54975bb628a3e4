use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use opsgate_contracts::{LoginRequest, LoginResponse};
use tracing::Instrument;

use super::{ApiError, AppState, json_error};
use crate::metrics;

pub(super) async fn login(
    State(state): State<AppState>,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = req.map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            "invalid JSON body",
            false,
        )
    })?;

    let span = tracing::info_span!(
        "auth.login",
        username = %req.username,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let started = Instant::now();

    let result = state
        .identity
        .authenticate(&req.username, &req.password)
        .instrument(span.clone())
        .await;

    span.record("latency_ms", started.elapsed().as_millis() as u64);

    match result {
        Ok(token) => {
            span.record("outcome", "ok");
            metrics::observe_login("ok");
            Ok(Json(LoginResponse { token: token.token }))
        }
        Err(err) => {
            span.record("outcome", err.code);
            span.in_scope(|| tracing::info!(reason = %err, "login failed"));

            match err.code {
                "ERR_USER_NOT_FOUND" | "ERR_INVALID_CREDENTIALS" => {
                    metrics::observe_login("rejected");
                    Err(json_error(
                        StatusCode::UNAUTHORIZED,
                        "ERR_AUTH_INVALID",
                        "invalid username or password",
                        false,
                    ))
                }
                "ERR_DIRECTORY_UNAVAILABLE" => {
                    metrics::observe_login("unavailable");
                    Err(json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "ERR_DIRECTORY_UNAVAILABLE",
                        "directory unavailable",
                        true,
                    ))
                }
                _ => {
                    metrics::observe_login("error");
                    Err(json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "ERR_INTERNAL",
                        "authentication is not available",
                        false,
                    ))
                }
            }
        }
    }
}
