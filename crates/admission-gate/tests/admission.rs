use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use admission_gate::{
    Admission, AdmissionGate, RateLimiter, RejectReason, RequestContext, SessionIdentityProvider,
};
use eventra_core_types::{Identity, PlanTier, Role};
use eventra_policy_center::{default_snapshot, PolicySnapshot, RateLimitRule};

fn gate_with(snapshot: PolicySnapshot) -> AdmissionGate {
    AdmissionGate::new(Arc::new(snapshot), Arc::new(RateLimiter::new()))
}

fn member(user: &str, plan: PlanTier) -> Identity {
    Identity::new(user, Role::Attendee, plan)
}

#[test]
fn unauthenticated_request_leaves_rate_limits_untouched() {
    let gate = gate_with(default_snapshot());
    let decision = gate.check_admission(None, "chatbot");
    assert_eq!(
        decision,
        Admission::Reject(RejectReason::NotAuthenticated)
    );
    assert!(gate.limiter().is_empty());
}

#[test]
fn disabled_feature_rejects_every_plan() {
    let mut snapshot = default_snapshot();
    snapshot.features.insert("chatbot".into(), false);
    let gate = gate_with(snapshot);
    for plan in PlanTier::ALL {
        assert_eq!(
            gate.check_admission(Some(&member("u-1", plan)), "chatbot"),
            Admission::Reject(RejectReason::FeatureDisabled)
        );
    }
    assert!(gate.limiter().is_empty());
}

#[test]
fn plan_without_entitlement_is_rejected() {
    let gate = gate_with(default_snapshot());
    assert_eq!(
        gate.check_admission(Some(&member("u-1", PlanTier::Pro)), "insights"),
        Admission::Reject(RejectReason::PlanInsufficient)
    );
    assert!(gate.limiter().is_empty());
}

#[test]
fn unknown_capability_is_treated_as_disabled() {
    let gate = gate_with(default_snapshot());
    assert_eq!(
        gate.check_admission(Some(&member("u-1", PlanTier::Enterprise)), "ticket_pricing"),
        Admission::Reject(RejectReason::FeatureDisabled)
    );
}

#[test]
fn request_past_limit_is_rejected_until_window_resets() {
    let mut snapshot = default_snapshot();
    snapshot
        .rate_limits
        .classes
        .insert("interactive".into(), RateLimitRule::new(3, 60_000));
    let gate = gate_with(snapshot);
    let identity = member("u-1", PlanTier::Free);
    let start = Instant::now();

    for step in 0..3 {
        let now = start + Duration::from_secs(step);
        assert!(gate
            .check_admission_at(Some(&identity), "chatbot", now)
            .is_admitted());
    }
    assert_eq!(
        gate.check_admission_at(Some(&identity), "chatbot", start + Duration::from_secs(30)),
        Admission::Reject(RejectReason::RateLimited)
    );

    let after_window = start + Duration::from_secs(61);
    assert!(gate
        .check_admission_at(Some(&identity), "chatbot", after_window)
        .is_admitted());
    let usage = gate
        .limiter()
        .usage(&AdmissionGate::rate_limit_key(&identity, "chatbot"))
        .expect("usage");
    assert_eq!(usage.count, 1);
    assert_eq!(usage.window_start, after_window);
}

#[test]
fn rate_limits_are_per_user_and_capability() {
    let mut snapshot = default_snapshot();
    snapshot
        .rate_limits
        .classes
        .insert("interactive".into(), RateLimitRule::new(1, 60_000));
    let gate = gate_with(snapshot);
    let alice = member("alice", PlanTier::Pro);
    let bob = member("bob", PlanTier::Pro);

    assert!(gate.check_admission(Some(&alice), "chatbot").is_admitted());
    assert!(gate.check_admission(Some(&bob), "chatbot").is_admitted());
    assert!(gate.check_admission(Some(&alice), "moderation").is_admitted());
    assert_eq!(
        gate.check_admission(Some(&alice), "chatbot"),
        Admission::Reject(RejectReason::RateLimited)
    );
}

#[test]
fn concurrent_requests_admit_exactly_the_limit() {
    const LIMIT: u32 = 8;
    let mut snapshot = default_snapshot();
    snapshot
        .rate_limits
        .classes
        .insert("generation".into(), RateLimitRule::new(LIMIT, 60_000));
    let gate = Arc::new(gate_with(snapshot));
    let identity = member("u-1", PlanTier::Enterprise);
    let workers = (LIMIT * 2) as usize;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            let identity = identity.clone();
            thread::spawn(move || {
                barrier.wait();
                gate.check_admission(Some(&identity), "insights")
            })
        })
        .collect();

    let decisions: Vec<Admission> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker"))
        .collect();
    let admitted = decisions.iter().filter(|d| d.is_admitted()).count();
    assert_eq!(admitted, LIMIT as usize);
    assert!(decisions
        .iter()
        .filter(|d| !d.is_admitted())
        .all(|d| *d == Admission::Reject(RejectReason::RateLimited)));
}

#[test]
fn recommendations_require_pro_and_count_once_admitted() {
    let gate = gate_with(default_snapshot());
    let provider = SessionIdentityProvider::accept_any();

    let free = RequestContext::new()
        .with_cookie("auth-token", "t")
        .with_cookie("user-id", "u-free")
        .with_cookie("user-plan", "free");
    let (_, decision) = gate.admit(&provider, &free, "recommendations");
    assert_eq!(decision, Admission::Reject(RejectReason::PlanInsufficient));

    let pro = RequestContext::new()
        .with_cookie("auth-token", "t")
        .with_cookie("user-id", "u-pro")
        .with_cookie("user-plan", "pro");
    let (identity, decision) = gate.admit(&provider, &pro, "recommendations");
    assert_eq!(decision, Admission::Admit);
    let identity = identity.expect("identity");
    let usage = gate
        .limiter()
        .usage(&AdmissionGate::rate_limit_key(&identity, "recommendations"))
        .expect("usage");
    assert_eq!(usage.count, 1);
}

#[test]
fn zero_limit_class_never_rate_limits() {
    let mut snapshot = default_snapshot();
    snapshot
        .rate_limits
        .classes
        .insert("read".into(), RateLimitRule::new(0, 60_000));
    let gate = gate_with(snapshot);
    let identity = member("u-1", PlanTier::Free);
    for _ in 0..200 {
        assert!(gate.check_admission(Some(&identity), "moderation").is_admitted());
    }
    assert!(gate.limiter().is_empty());
}

#[tokio::test]
async fn decisions_are_published_to_subscribers() {
    let gate = gate_with(default_snapshot());
    let mut events = gate.subscribe();

    gate.check_admission(None, "chatbot");
    gate.check_admission(Some(&member("u-9", PlanTier::Free)), "chatbot");

    let first = events.recv().await.expect("first event");
    assert_eq!(first.outcome, "not_authenticated");
    assert!(first.user_id.is_none());
    let second = events.recv().await.expect("second event");
    assert_eq!(second.outcome, "admit");
    assert_eq!(second.user_id.as_deref(), Some("u-9"));
    assert_eq!(second.capability, "chatbot");
}
