use std::sync::Arc;

use admission_gate::{RateLimiter, SessionIdentityProvider, StaticTokenVerifier};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use eventra_gateway::{build_router, GatewayState, DEGRADED_HEADER};
use eventra_policy_center::{default_snapshot, PolicySnapshot, RateLimitRule};
use flow_core::flows::UNAVAILABLE_REPLY;
use flow_core::{FlowInvoker, FlowRegistry, MockProvider, ProviderError};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "session-token";

fn app_with(policy: PolicySnapshot, provider: Arc<MockProvider>) -> Router {
    let identity = Arc::new(SessionIdentityProvider::new(StaticTokenVerifier::new([
        TOKEN,
    ])));
    let state = GatewayState::new(
        Arc::new(policy),
        Arc::new(RateLimiter::new()),
        identity,
        Arc::new(FlowRegistry::builtin()),
        FlowInvoker::new(provider),
    );
    state.mark_live();
    state.mark_ready();
    build_router(state)
}

fn app(provider: Arc<MockProvider>) -> Router {
    app_with(default_snapshot(), provider)
}

fn ai_request(capability: &str, plan: Option<&str>, body: Value) -> Request<Body> {
    let mut cookie = format!("auth-token={TOKEN}; user-id=u-42");
    if let Some(plan) = plan {
        cookie.push_str(&format!("; user-plan={plan}"));
    }
    Request::builder()
        .method("POST")
        .uri(format!("/api/ai/{capability}"))
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_session_is_unauthorized() {
    let provider = Arc::new(MockProvider::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/ai/chatbot")
        .body(Body::from(json!({"message": "hi"}).to_string()))
        .unwrap();

    let response = app(provider.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["reason"], "not_authenticated");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/ai/chatbot")
        .header("cookie", "auth-token=forged; user-id=u-42")
        .body(Body::from(json!({"message": "hi"}).to_string()))
        .unwrap();

    let response = app(Arc::new(MockProvider::new()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn free_plan_cannot_use_recommendations() {
    let provider = Arc::new(MockProvider::new());
    let response = app(provider.clone())
        .oneshot(ai_request(
            "recommendations",
            Some("free"),
            json!({"candidate_events": []}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["reason"], "plan_insufficient");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn disabled_feature_is_forbidden_for_every_plan() {
    let mut policy = default_snapshot();
    policy.features.insert("chatbot".into(), false);
    let response = app_with(policy, Arc::new(MockProvider::new()))
        .oneshot(ai_request("chatbot", Some("enterprise"), json!({"message": "hi"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["reason"], "feature_disabled");
}

#[tokio::test]
async fn unknown_capability_is_not_found() {
    let response = app(Arc::new(MockProvider::new()))
        .oneshot(ai_request("horoscope", Some("pro"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn window_overflow_is_rate_limited() {
    let mut policy = default_snapshot();
    policy
        .rate_limits
        .classes
        .insert("interactive".into(), RateLimitRule::new(2, 60_000));
    let provider = Arc::new(
        MockProvider::new()
            .with_response(json!({"reply": "one"}))
            .with_response(json!({"reply": "two"})),
    );
    let app = app_with(policy, provider.clone());

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(ai_request("chatbot", None, json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(ai_request("chatbot", None, json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert_eq!(body["reason"], "rate_limited");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn invalid_input_lists_issues_and_skips_provider() {
    let provider = Arc::new(MockProvider::new());
    let response = app(provider.clone())
        .oneshot(ai_request(
            "chatbot",
            None,
            json!({"message": "x".repeat(2001)}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["issues"][0]["field"], "message");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/ai/chatbot")
        .header("cookie", format!("auth-token={TOKEN}; user-id=u-42"))
        .body(Body::from("{not json"))
        .unwrap();

    let response = app(Arc::new(MockProvider::new()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["issues"][0]["field"], "body");
}

#[tokio::test]
async fn admitted_request_returns_flow_output() {
    let provider = Arc::new(MockProvider::new().with_response(json!({
        "reply": "Doors open at 7pm.",
        "suggested_actions": ["Add to calendar"],
        "confidence": 0.9
    })));
    let response = app(provider.clone())
        .oneshot(ai_request(
            "chatbot",
            Some("free"),
            json!({"message": "When do doors open?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(DEGRADED_HEADER).is_none());
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({"reply": "Doors open at 7pm.", "suggested_actions": ["Add to calendar"]})
    );
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn provider_failure_degrades_to_fallback() {
    let provider = Arc::new(
        MockProvider::new().with_error(ProviderError::unavailable("upstream timeout")),
    );
    let response = app(provider)
        .oneshot(ai_request("chatbot", None, json!({"message": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(DEGRADED_HEADER)
            .and_then(|value| value.to_str().ok()),
        Some("true")
    );
    let body = json_body(response).await;
    assert_eq!(body["reply"], UNAVAILABLE_REPLY);
}

#[tokio::test]
async fn capabilities_reflect_policy() {
    let response = app(Arc::new(MockProvider::new()))
        .oneshot(
            Request::builder()
                .uri("/api/capabilities")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let capabilities = body["capabilities"].as_array().unwrap();
    assert_eq!(capabilities.len(), 5);
    let insights = capabilities
        .iter()
        .find(|entry| entry["name"] == "insights")
        .unwrap();
    assert_eq!(insights["plans"], json!(["enterprise"]));
}

#[tokio::test]
async fn probes_and_metrics_are_served() {
    let app = app(Arc::new(MockProvider::new()));

    let live = app
        .clone()
        .oneshot(Request::builder().uri("/livez").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    let _ = app
        .clone()
        .oneshot(ai_request("recommendations", Some("free"), json!({})))
        .await
        .unwrap();

    let metrics = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let bytes = to_bytes(metrics.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("eventra_admission_decisions_total"));
    assert!(text.contains("plan_insufficient"));
}

#[tokio::test]
async fn readiness_probe_reports_unready_gateway() {
    let identity = Arc::new(SessionIdentityProvider::new(StaticTokenVerifier::new([
        TOKEN,
    ])));
    let state = GatewayState::new(
        Arc::new(default_snapshot()),
        Arc::new(RateLimiter::new()),
        identity,
        Arc::new(FlowRegistry::builtin()),
        FlowInvoker::new(Arc::new(MockProvider::new())),
    );
    state.mark_live();
    state.mark_unready("no provider API key configured");
    let app = build_router(state.clone());

    let ready = app
        .clone()
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(ready).await;
    assert_eq!(body["last_error"], "no provider API key configured");

    let live = app
        .clone()
        .oneshot(Request::builder().uri("/livez").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    state.mark_ready();
    let ready = app
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}
