use std::time::Instant;

use admission_gate::{Admission, RequestContext};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use eventra_core_types::RequestId;
use flow_core::{FlowError, ValidationIssue};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

use crate::errors::ApiError;
use crate::metrics::{self, FlowResult};
use crate::server::state::GatewayState;

pub const DEGRADED_HEADER: &str = "x-eventra-degraded";
const REQUEST_ID_HEADER: &str = "x-request-id";

pub(crate) fn router() -> Router<GatewayState> {
    Router::new()
        .route("/api/ai/:capability", post(ai_handler))
        .route("/api/capabilities", get(capabilities_handler))
}

async fn ai_handler(
    State(state): State<GatewayState>,
    Path(capability): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = RequestId::new();
    let span = info_span!(
        "ai_request",
        request_id = %request_id,
        capability = %capability
    );
    let mut response = match handle(&state, &capability, &headers, &body)
        .instrument(span)
        .await
    {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn handle(
    state: &GatewayState,
    capability: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ApiError> {
    let Some(flow) = state.flows.get(capability) else {
        return Err(ApiError::UnknownCapability(capability.to_string()));
    };

    let ctx = request_context(headers);
    let (_, admission) = state.gate.admit(state.identity.as_ref(), &ctx, capability);
    metrics::record_admission(capability, admission.outcome());
    if let Admission::Reject(reason) = admission {
        return Err(ApiError::Rejected(reason));
    }

    let raw_input = match parse_body(body) {
        Ok(value) => value,
        Err(issue) => {
            metrics::record_flow(capability, FlowResult::InvalidInput, 0.0);
            return Err(ApiError::InvalidInput(vec![issue]));
        }
    };

    let started = Instant::now();
    let reply = flow.invoke(&state.invoker, &raw_input).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    let reply = match reply {
        Ok(reply) => reply,
        Err(err) => {
            if matches!(err, FlowError::InvalidInput(_)) {
                metrics::record_flow(capability, FlowResult::InvalidInput, latency_ms);
            }
            return Err(err.into());
        }
    };

    let result = if reply.degraded {
        FlowResult::Fallback
    } else {
        FlowResult::Ok
    };
    metrics::record_flow(capability, result, latency_ms);
    debug!(degraded = reply.degraded, latency_ms, "flow completed");

    let mut response = Json(reply.output).into_response();
    if reply.degraded {
        response
            .headers_mut()
            .insert(DEGRADED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::from_headers(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value))),
    )
}

fn parse_body(body: &[u8]) -> Result<Value, ValidationIssue> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationIssue::new("body", "request body must be a JSON object"));
    }
    serde_json::from_slice(body)
        .map_err(|err| ValidationIssue::new("body", format!("malformed JSON: {err}")))
}

#[derive(Serialize)]
struct CapabilityView {
    name: &'static str,
    enabled: bool,
    rate_limit_class: String,
    limit: u32,
    window_ms: u64,
    plans: Vec<&'static str>,
}

async fn capabilities_handler(State(state): State<GatewayState>) -> Json<Value> {
    let policy = state.policy();
    let capabilities: Vec<CapabilityView> = state
        .flows
        .names()
        .map(|name| {
            let rule = policy.rate_limit_for(name);
            CapabilityView {
                name,
                enabled: policy.feature_enabled(name),
                rate_limit_class: policy.rate_limit_class(name).to_string(),
                limit: rule.limit,
                window_ms: rule.window_ms,
                plans: policy
                    .entitled_plans(name)
                    .into_iter()
                    .map(|plan| plan.as_str())
                    .collect(),
            }
        })
        .collect();
    Json(serde_json::json!({
        "policy_rev": policy.rev,
        "capabilities": capabilities,
    }))
}
