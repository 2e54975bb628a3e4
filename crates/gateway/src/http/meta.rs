use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use opsgate_contracts::TargetInfo;

use super::AppState;

pub(super) async fn healthz() -> &'static str {
    "ok"
}

pub(super) async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub(super) async fn targets(State(state): State<AppState>) -> Json<Vec<TargetInfo>> {
    Json(state.registry.targets())
}
