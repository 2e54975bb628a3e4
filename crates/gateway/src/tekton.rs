use std::time::Instant;

use tracing::Instrument;

use crate::config::Credential;
use crate::registry::Target;
use crate::upstream::{self, UpstreamError};

pub const DEFAULT_NAMESPACE: &str = "tekton";

/// Read-only Tekton listing endpoints proxied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TektonQuery {
    PipelineRuns,
    PipelineRun(String),
    /// Task runs belonging to one pipeline run.
    TaskRuns { pipeline_run: String },
}

impl TektonQuery {
    fn operation(&self) -> &'static str {
        match self {
            TektonQuery::PipelineRuns => "list_pipelineruns",
            TektonQuery::PipelineRun(_) => "get_pipelinerun",
            TektonQuery::TaskRuns { .. } => "list_taskruns",
        }
    }
}

/// Fetches `query` from `target` in `namespace` and returns the backend body untouched.
pub async fn fetch(
    target: &Target,
    namespace: &str,
    query: &TektonQuery,
) -> Result<String, UpstreamError> {
    let span = tracing::info_span!(
        "tekton.proxy",
        target = %target.name(),
        namespace = %namespace,
        operation = query.operation(),
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let started = Instant::now();

    let mut segments = vec!["apis", "tekton.dev", "v1beta1", "namespaces", namespace];
    match query {
        TektonQuery::PipelineRuns => segments.push("pipelineruns"),
        TektonQuery::PipelineRun(name) => segments.extend(["pipelineruns", name.as_str()]),
        TektonQuery::TaskRuns { .. } => segments.push("taskruns"),
    }

    let mut url = target.endpoint(&segments);
    if let TektonQuery::TaskRuns { pipeline_run } = query {
        url.query_pairs_mut().append_pair(
            "labelSelector",
            &format!("tekton.dev/pipelineRun={}", pipeline_run),
        );
    }

    let request = target
        .http()
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json");
    let request = match &target.config().credential {
        Credential::Token(token) if !token.is_empty() => request.bearer_auth(token),
        _ => request,
    };

    let result = async {
        let response = upstream::send(request, "tekton", query.operation()).await?;
        upstream::read_text(response).await
    }
    .instrument(span.clone())
    .await;

    span.record("latency_ms", started.elapsed().as_millis() as u64);
    span.record("outcome", if result.is_ok() { "ok" } else { "error" });
    result
}
