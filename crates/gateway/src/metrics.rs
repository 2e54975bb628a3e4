use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static BACKEND_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static AGGREGATION_ITEMS_DROPPED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static LOGINS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "opsgate_gateway_http_requests_total",
                    "Gateway HTTP request count.",
                ),
                &["route", "method", "status"],
            )
            .expect("create opsgate_gateway_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "opsgate_gateway_http_request_duration_seconds",
                    "Gateway HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create opsgate_gateway_http_request_duration_seconds"),
        )
    })
}

fn backend_calls_total() -> &'static IntCounterVec {
    BACKEND_CALLS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "opsgate_gateway_backend_calls_total",
                    "Outbound calls to ArgoCD and Tekton targets.",
                ),
                &["kind", "operation", "outcome"],
            )
            .expect("create opsgate_gateway_backend_calls_total"),
        )
    })
}

fn aggregation_items_dropped_total() -> &'static IntCounterVec {
    AGGREGATION_ITEMS_DROPPED_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "opsgate_gateway_aggregation_items_dropped_total",
                    "Listing items omitted because their detail fetch failed.",
                ),
                &["target"],
            )
            .expect("create opsgate_gateway_aggregation_items_dropped_total"),
        )
    })
}

fn logins_total() -> &'static IntCounterVec {
    LOGINS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("opsgate_gateway_logins_total", "Directory login attempts."),
                &["outcome"],
            )
            .expect("create opsgate_gateway_logins_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_backend_call(kind: &str, operation: &str, outcome: &str) {
    backend_calls_total()
        .with_label_values(&[kind, operation, outcome])
        .inc();
}

pub fn inc_aggregation_item_dropped(target: &str) {
    aggregation_items_dropped_total()
        .with_label_values(&[target])
        .inc();
}

pub fn observe_login(outcome: &str) {
    logins_total().with_label_values(&[outcome]).inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = http_requests_total();
    let _ = backend_calls_total();
    let _ = aggregation_items_dropped_total();
    let _ = logins_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
