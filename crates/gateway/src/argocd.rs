use std::time::{Duration, Instant};

use futures::StreamExt;
use opsgate_contracts::AppSummary;
use serde::Deserialize;
use tracing::Instrument;

use crate::broker::BackendSession;
use crate::metrics;
use crate::upstream::{self, UpstreamError};

#[derive(Debug, Default, Deserialize)]
struct ApplicationList {
    #[serde(default)]
    items: Option<Vec<Application>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Application {
    metadata: ObjectMeta,
    spec: ApplicationSpec,
    status: ApplicationStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectMeta {
    name: String,
    namespace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApplicationSpec {
    project: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApplicationStatus {
    health: HealthStatus,
    resources: Option<Vec<ResourceStatus>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HealthStatus {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResourceStatus {
    kind: String,
    name: String,
    namespace: String,
}

/// Lists every application on the session's target and enriches each with its detail record.
///
/// Detail fetches run `concurrency` at a time and come back in listing order. An item whose
/// detail fetch fails is left out; only a failed listing call fails the whole operation.
/// The listing and every detail fetch together must finish within `deadline`.
pub async fn list_applications(
    session: &BackendSession,
    concurrency: usize,
    deadline: Duration,
) -> Result<Vec<AppSummary>, UpstreamError> {
    let span = tracing::info_span!(
        "argocd.list_apps",
        target = %session.target().name(),
        listed = tracing::field::Empty,
        returned = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let started = Instant::now();

    let aggregate = async {
        let listing = fetch_listing(session).await?;
        tracing::Span::current().record("listed", listing.len());

        let summaries = futures::stream::iter(listing)
            .map(|item| summarize(session, item))
            .buffered(concurrency.max(1))
            .filter_map(|summary| async move { summary })
            .collect::<Vec<_>>()
            .await;

        Ok::<_, UpstreamError>(summaries)
    };

    let result = tokio::time::timeout(deadline, aggregate)
        .instrument(span.clone())
        .await
        .unwrap_or_else(|_| {
            Err(UpstreamError::Unreachable(format!(
                "application listing exceeded {} ms",
                deadline.as_millis()
            )))
        });

    span.record("latency_ms", started.elapsed().as_millis() as u64);
    match &result {
        Ok(summaries) => {
            span.record("returned", summaries.len());
            span.record("outcome", "ok");
        }
        Err(_) => {
            span.record("outcome", "error");
        }
    }
    result
}

async fn fetch_listing(session: &BackendSession) -> Result<Vec<Application>, UpstreamError> {
    let target = session.target();
    let request = target
        .http()
        .get(target.endpoint(&["api", "v1", "applications"]))
        .bearer_auth(session.token());

    let response = upstream::send(request, "argocd", "list_applications").await?;
    let listing = response.json::<ApplicationList>().await.map_err(|_| {
        UpstreamError::InvalidResponse("application list is not valid JSON".to_string())
    })?;

    Ok(listing
        .items
        .unwrap_or_default()
        .into_iter()
        .filter(|item| !item.metadata.name.is_empty())
        .collect())
}

async fn summarize(session: &BackendSession, item: Application) -> Option<AppSummary> {
    match fetch_detail(session, &item.metadata.name).await {
        Ok(detail) => Some(merge_summary(item, detail)),
        Err(err) => {
            tracing::warn!(
                app = %item.metadata.name,
                error = %err,
                "application detail fetch failed; omitting item"
            );
            metrics::inc_aggregation_item_dropped(session.target().name());
            None
        }
    }
}

async fn fetch_detail(session: &BackendSession, name: &str) -> Result<Application, UpstreamError> {
    let target = session.target();
    let request = target
        .http()
        .get(target.endpoint(&["api", "v1", "applications", name]))
        .bearer_auth(session.token());

    let response = upstream::send(request, "argocd", "get_application").await?;
    response.json::<Application>().await.map_err(|_| {
        UpstreamError::InvalidResponse("application detail is not valid JSON".to_string())
    })
}

fn merge_summary(item: Application, detail: Application) -> AppSummary {
    let (deployment_name, deployment_namespace) = detail
        .status
        .resources
        .unwrap_or_default()
        .into_iter()
        .find(|resource| resource.kind == "Deployment")
        .map(|resource| (resource.name, resource.namespace))
        .unwrap_or_default();

    AppSummary {
        name: item.metadata.name,
        app_namespace: item.metadata.namespace,
        deployment_name,
        deployment_namespace,
        health: item.status.health.status,
        project: detail.spec.project,
    }
}

/// A mutating ArgoCD operation on one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Rolling restart of one Deployment managed by the application.
    Restart {
        deployment_name: String,
        deployment_namespace: String,
    },
    Sync,
}

impl AppAction {
    fn name(&self) -> &'static str {
        match self {
            AppAction::Restart { .. } => "restart",
            AppAction::Sync => "sync",
        }
    }
}

/// Runs `action` against `app_name` once. Any non-200 answer is returned with its body intact.
pub async fn run_action(
    session: &BackendSession,
    app_name: &str,
    action: &AppAction,
) -> Result<(), UpstreamError> {
    let span = tracing::info_span!(
        "argocd.action",
        target = %session.target().name(),
        app = %app_name,
        action = action.name(),
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let started = Instant::now();

    let target = session.target();
    let request = match action {
        AppAction::Restart {
            deployment_name,
            deployment_namespace,
        } => {
            let mut url = target.endpoint(&[
                "api",
                "v1",
                "applications",
                app_name,
                "resource",
                "actions",
            ]);
            url.query_pairs_mut()
                .append_pair("namespace", deployment_namespace)
                .append_pair("resourceName", deployment_name)
                .append_pair("version", "v1")
                .append_pair("group", "apps")
                .append_pair("kind", "Deployment");
            target.http().post(url).json(&"restart")
        }
        AppAction::Sync => target
            .http()
            .post(target.endpoint(&["api", "v1", "applications", app_name, "sync"]))
            .json(&serde_json::json!({})),
    };

    let result = upstream::send(request.bearer_auth(session.token()), "argocd", action.name())
        .instrument(span.clone())
        .await
        .map(|_| ());

    span.record("latency_ms", started.elapsed().as_millis() as u64);
    span.record("outcome", if result.is_ok() { "ok" } else { "error" });
    if let Err(err) = &result {
        span.in_scope(|| tracing::warn!(error = %err, "argocd action failed"));
    }
    result
}
