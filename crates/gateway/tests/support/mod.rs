#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use opsgate_contracts::TargetKind;
use opsgate_gateway::broker::SessionBroker;
use opsgate_gateway::config::{Credential, TargetConfig};
use opsgate_gateway::registry::TargetRegistry;
use reqwest::Url;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const ARGO_TOKEN: &str = "argo-session-token";

#[derive(Debug, Clone)]
pub enum DetailReply {
    Ok(serde_json::Value),
    Status(StatusCode),
    Stall(Duration, serde_json::Value),
    Garbage,
}

#[derive(Debug, Clone)]
pub struct RecordedAction {
    pub app: String,
    pub kind: &'static str,
    pub query: HashMap<String, String>,
    pub body: String,
    pub authorization: Option<String>,
}

pub struct MockArgo {
    pub logins: AtomicUsize,
    pub listings: AtomicUsize,
    pub details: AtomicUsize,
    pub login_reply: (StatusCode, String),
    pub listing_reply: (StatusCode, String),
    pub detail_replies: HashMap<String, DetailReply>,
    pub action_reply: (StatusCode, String),
    pub login_bodies: Mutex<Vec<serde_json::Value>>,
    pub detail_auth: Mutex<Vec<Option<String>>>,
    pub actions: Mutex<Vec<RecordedAction>>,
}

impl Default for MockArgo {
    fn default() -> Self {
        Self {
            logins: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
            details: AtomicUsize::new(0),
            login_reply: (
                StatusCode::OK,
                serde_json::json!({ "token": ARGO_TOKEN }).to_string(),
            ),
            listing_reply: (StatusCode::OK, r#"{"items":[]}"#.to_string()),
            detail_replies: HashMap::new(),
            action_reply: (StatusCode::OK, "{}".to_string()),
            login_bodies: Mutex::new(Vec::new()),
            detail_auth: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
        }
    }
}

impl MockArgo {
    pub fn with_listing(mut self, names: &[&str]) -> Self {
        let items = names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "metadata": { "name": name, "namespace": "argocd" },
                    "status": { "health": { "status": "Healthy" } }
                })
            })
            .collect::<Vec<_>>();
        self.listing_reply = (
            StatusCode::OK,
            serde_json::json!({ "items": items }).to_string(),
        );
        self
    }

    pub fn with_detail(mut self, name: &str, reply: DetailReply) -> Self {
        self.detail_replies.insert(name.to_string(), reply);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
            + self.listings.load(Ordering::SeqCst)
            + self.details.load(Ordering::SeqCst)
            + self.actions.lock().unwrap().len()
    }
}

pub fn detail(project: &str, deployments: &[(&str, &str)]) -> serde_json::Value {
    let resources = deployments
        .iter()
        .map(|(name, namespace)| {
            serde_json::json!({ "kind": "Deployment", "name": name, "namespace": namespace })
        })
        .collect::<Vec<_>>();
    serde_json::json!({
        "spec": { "project": project },
        "status": { "resources": resources }
    })
}

pub fn argo_router(mock: Arc<MockArgo>) -> Router {
    Router::new()
        .route("/api/v1/session", post(session))
        .route("/api/v1/applications", get(list_applications))
        .route("/api/v1/applications/{name}", get(get_application))
        .route("/api/v1/applications/{name}/sync", post(sync_application))
        .route(
            "/api/v1/applications/{name}/resource/actions",
            post(resource_action),
        )
        .with_state(mock)
}

async fn session(State(mock): State<Arc<MockArgo>>, body: Bytes) -> (StatusCode, String) {
    mock.logins.fetch_add(1, Ordering::SeqCst);
    let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    mock.login_bodies.lock().unwrap().push(parsed);
    mock.login_reply.clone()
}

async fn list_applications(State(mock): State<Arc<MockArgo>>) -> (StatusCode, String) {
    mock.listings.fetch_add(1, Ordering::SeqCst);
    mock.listing_reply.clone()
}

async fn get_application(
    State(mock): State<Arc<MockArgo>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    mock.details.fetch_add(1, Ordering::SeqCst);
    mock.detail_auth.lock().unwrap().push(authorization(&headers));

    match mock.detail_replies.get(&name).cloned() {
        Some(DetailReply::Ok(value)) => (StatusCode::OK, value.to_string()),
        Some(DetailReply::Status(status)) => (status, "detail failed".to_string()),
        Some(DetailReply::Stall(delay, value)) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, value.to_string())
        }
        Some(DetailReply::Garbage) => (StatusCode::OK, "<html>".to_string()),
        None => (StatusCode::NOT_FOUND, "not found".to_string()),
    }
}

async fn sync_application(
    State(mock): State<Arc<MockArgo>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    mock.actions.lock().unwrap().push(RecordedAction {
        app: name,
        kind: "sync",
        query: HashMap::new(),
        body,
        authorization: authorization(&headers),
    });
    mock.action_reply.clone()
}

async fn resource_action(
    State(mock): State<Arc<MockArgo>>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    mock.actions.lock().unwrap().push(RecordedAction {
        app: name,
        kind: "resource_action",
        query,
        body,
        authorization: authorization(&headers),
    });
    mock.action_reply.clone()
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

pub async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

pub fn argocd_target(name: &str, addr: SocketAddr) -> TargetConfig {
    TargetConfig {
        name: name.to_string(),
        kind: TargetKind::ArgoCd,
        base_url: Url::parse(&format!("http://{}", addr)).expect("mock url should parse"),
        credential: Credential::Basic {
            username: "admin".to_string(),
            password: "argo-pass".to_string(),
        },
        insecure_skip_tls_verify: false,
    }
}

pub fn broker_for(addr: SocketAddr, timeout: Duration) -> SessionBroker {
    let registry = TargetRegistry::new(vec![argocd_target("prod", addr)], "prod", timeout)
        .expect("registry should build");
    SessionBroker::new(Arc::new(registry))
}
