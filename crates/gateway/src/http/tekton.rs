use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use opsgate_contracts::TargetKind;
use serde::Deserialize;

use super::{ApiError, AppState, json_error, unknown_target_error, upstream_error};
use crate::tekton::{self, DEFAULT_NAMESPACE, TektonQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct TektonParams {
    target: Option<String>,
    namespace: Option<String>,
    #[serde(rename = "pipelineRunName")]
    pipeline_run_name: Option<String>,
}

pub(super) async fn pipeline_runs(
    State(state): State<AppState>,
    Query(params): Query<TektonParams>,
) -> Result<Response, ApiError> {
    proxy(&state, &params, TektonQuery::PipelineRuns).await
}

pub(super) async fn pipeline_run(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<TektonParams>,
) -> Result<Response, ApiError> {
    proxy(&state, &params, TektonQuery::PipelineRun(name)).await
}

pub(super) async fn task_runs(
    State(state): State<AppState>,
    Query(params): Query<TektonParams>,
) -> Result<Response, ApiError> {
    let pipeline_run = params
        .pipeline_run_name
        .as_deref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_PARAMS",
                "pipelineRunName is required",
                false,
            )
        })?
        .to_string();

    proxy(&state, &params, TektonQuery::TaskRuns { pipeline_run }).await
}

async fn proxy(
    state: &AppState,
    params: &TektonParams,
    query: TektonQuery,
) -> Result<Response, ApiError> {
    let target = state
        .registry
        .resolve(TargetKind::Tekton, params.target.as_deref())
        .map_err(|err| unknown_target_error(&err))?;

    let namespace = params
        .namespace
        .as_deref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE);

    let body = tekton::fetch(&target, namespace, &query)
        .await
        .map_err(upstream_error)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
