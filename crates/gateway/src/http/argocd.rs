use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use opsgate_contracts::{AppSummary, RestartRequest, RestartResponse, SyncRequest, SyncResponse};
use serde::Deserialize;

use super::{ApiError, AppState, Identity, broker_error, json_error, upstream_error};
use crate::argocd::{self, AppAction};

#[derive(Debug, Default, Deserialize)]
pub(super) struct TargetQuery {
    #[serde(default)]
    target: Option<String>,
}

pub(super) async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> Result<Json<Vec<AppSummary>>, ApiError> {
    let session = state
        .broker
        .open_session(query.target.as_deref())
        .await
        .map_err(broker_error)?;

    let apps = argocd::list_applications(
        &session,
        state.config.fanout_concurrency,
        state.config.request_timeout(),
    )
    .await
    .map_err(upstream_error)?;

    Ok(Json(apps))
}

pub(super) async fn restart(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<RestartRequest>, JsonRejection>,
) -> Result<Json<RestartResponse>, ApiError> {
    let Json(req) = req.map_err(|_| invalid_body())?;

    require_field(&req.app_name, "appName")?;
    require_field(&req.deployment_name, "deploymentName")?;
    require_field(&req.deployment_namespace, "deploymentNamespace")?;

    let session = state
        .broker
        .open_session(req.target.as_deref())
        .await
        .map_err(broker_error)?;

    tracing::info!(
        user = %identity.subject,
        target = %session.target().name(),
        app = %req.app_name,
        deployment = %req.deployment_name,
        "restarting deployment"
    );

    let action = AppAction::Restart {
        deployment_name: req.deployment_name.clone(),
        deployment_namespace: req.deployment_namespace.clone(),
    };
    argocd::run_action(&session, &req.app_name, &action)
        .await
        .map_err(upstream_error)?;

    Ok(Json(RestartResponse {
        result: "Restarted".to_string(),
        deployment: req.deployment_name,
    }))
}

pub(super) async fn sync(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    req: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Json(req) = req.map_err(|_| invalid_body())?;
    require_field(&req.app_name, "appName")?;

    let session = state
        .broker
        .open_session(req.target.as_deref())
        .await
        .map_err(broker_error)?;

    tracing::info!(
        user = %identity.subject,
        target = %session.target().name(),
        app = %req.app_name,
        "syncing application"
    );

    argocd::run_action(&session, &req.app_name, &AppAction::Sync)
        .await
        .map_err(upstream_error)?;

    Ok(Json(SyncResponse {
        result: "Synced".to_string(),
        app: req.app_name,
    }))
}

fn invalid_body() -> ApiError {
    json_error(
        StatusCode::BAD_REQUEST,
        "ERR_INVALID_PARAMS",
        "invalid JSON body",
        false,
    )
}

fn require_field(value: &str, name: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "ERR_INVALID_PARAMS",
            format!("{} is required", name),
            false,
        ));
    }
    Ok(())
}
