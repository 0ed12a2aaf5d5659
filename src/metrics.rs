use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{histogram_opts, Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();
static ADMISSION_DECISIONS: OnceCell<IntCounterVec> = OnceCell::new();
static FLOW_INVOCATIONS: OnceCell<IntCounterVec> = OnceCell::new();
static FLOW_LATENCY: OnceCell<HistogramVec> = OnceCell::new();

/// How a flow invocation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowResult {
    Ok,
    Fallback,
    InvalidInput,
}

impl FlowResult {
    pub const fn as_str(self) -> &'static str {
        match self {
            FlowResult::Ok => "ok",
            FlowResult::Fallback => "fallback",
            FlowResult::InvalidInput => "invalid_input",
        }
    }
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        register_admission_metrics(registry);
        register_flow_metrics(registry);
    });
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

fn register_admission_metrics(registry: &Registry) {
    let decisions = match IntCounterVec::new(
        Opts::new(
            "eventra_admission_decisions_total",
            "Admission decisions per capability and outcome",
        ),
        &["capability", "outcome"],
    ) {
        Ok(counter) => counter,
        Err(err) => {
            error!(?err, "failed to create admission decision counter");
            return;
        }
    };
    if let Err(err) = registry.register(Box::new(decisions.clone())) {
        error!(?err, "failed to register admission decision counter");
    }
    let _ = ADMISSION_DECISIONS.set(decisions);
}

fn register_flow_metrics(registry: &Registry) {
    match IntCounterVec::new(
        Opts::new(
            "eventra_flow_invocations_total",
            "Flow invocations per flow and result",
        ),
        &["flow", "result"],
    ) {
        Ok(invocations) => {
            if let Err(err) = registry.register(Box::new(invocations.clone())) {
                error!(?err, "failed to register flow invocation counter");
            }
            let _ = FLOW_INVOCATIONS.set(invocations);
        }
        Err(err) => error!(?err, "failed to create flow invocation counter"),
    }

    match HistogramVec::new(
        histogram_opts!(
            "eventra_flow_latency_ms",
            "End-to-end flow latency including generation (milliseconds)",
            vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0]
        ),
        &["flow"],
    ) {
        Ok(latency) => {
            if let Err(err) = registry.register(Box::new(latency.clone())) {
                error!(?err, "failed to register flow latency histogram");
            }
            let _ = FLOW_LATENCY.set(latency);
        }
        Err(err) => error!(?err, "failed to create flow latency histogram"),
    }
}

pub fn record_admission(capability: &str, outcome: &str) {
    if let Some(counter) = ADMISSION_DECISIONS.get() {
        counter.with_label_values(&[capability, outcome]).inc();
    }
}

pub fn record_flow(flow: &str, result: FlowResult, latency_ms: f64) {
    if let Some(counter) = FLOW_INVOCATIONS.get() {
        counter.with_label_values(&[flow, result.as_str()]).inc();
    }
    if result != FlowResult::InvalidInput {
        if let Some(histogram) = FLOW_LATENCY.get() {
            histogram.with_label_values(&[flow]).observe(latency_ms);
        }
    }
}

/// Prometheus text exposition of the global registry.
pub async fn metrics_handler() -> Response {
    register_metrics();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&global_registry().gather(), &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response();
    }

    match String::from_utf8(buffer) {
        Ok(body) => match HeaderValue::from_str(encoder.format_type()) {
            Ok(value) => ([(header::CONTENT_TYPE, value)], body).into_response(),
            Err(err) => {
                error!(?err, "failed to build content-type header");
                (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
            }
        },
        Err(err) => {
            error!(?err, "failed to convert prometheus metrics to utf8");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}
