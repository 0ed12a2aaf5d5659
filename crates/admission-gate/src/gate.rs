use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use eventra_core_types::Identity;
use eventra_policy_center::PolicySnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::identity::{IdentityProvider, RequestContext};
use crate::rate_limit::RateLimiter;

const EVENT_CAPACITY: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Admission::Admit => "admit",
            Admission::Reject(reason) => reason.as_str(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotAuthenticated,
    FeatureDisabled,
    PlanInsufficient,
    RateLimited,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            RejectReason::NotAuthenticated => "not_authenticated",
            RejectReason::FeatureDisabled => "feature_disabled",
            RejectReason::PlanInsufficient => "plan_insufficient",
            RejectReason::RateLimited => "rate_limited",
        }
    }

    pub const fn http_status(self) -> u16 {
        match self {
            RejectReason::NotAuthenticated => 401,
            RejectReason::FeatureDisabled | RejectReason::PlanInsufficient => 403,
            RejectReason::RateLimited => 429,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            RejectReason::NotAuthenticated => "Authentication required",
            RejectReason::FeatureDisabled => "This AI feature is currently disabled",
            RejectReason::PlanInsufficient => "Your plan does not include this AI feature",
            RejectReason::RateLimited => "Too many requests",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted for every admission decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionEvent {
    pub user_id: Option<String>,
    pub capability: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}

/// Decides whether an identity may use a capability right now.
///
/// Checks run auth, feature flag, plan, rate limit, in that order. Only an
/// otherwise admissible request touches the rate limiter.
pub struct AdmissionGate {
    policy: Arc<PolicySnapshot>,
    limiter: Arc<RateLimiter>,
    events: broadcast::Sender<AdmissionEvent>,
}

impl AdmissionGate {
    pub fn new(policy: Arc<PolicySnapshot>, limiter: Arc<RateLimiter>) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            policy,
            limiter,
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdmissionEvent> {
        self.events.subscribe()
    }

    pub fn policy(&self) -> &Arc<PolicySnapshot> {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn rate_limit_key(identity: &Identity, capability: &str) -> String {
        format!("user:{}:{}", identity.user_id, capability)
    }

    /// Resolves the caller through `provider`, then runs [`Self::check_admission`].
    pub fn admit(
        &self,
        provider: &dyn IdentityProvider,
        ctx: &RequestContext,
        capability: &str,
    ) -> (Option<Identity>, Admission) {
        let identity = provider.resolve(ctx);
        let admission = self.check_admission(identity.as_ref(), capability);
        (identity, admission)
    }

    pub fn check_admission(&self, identity: Option<&Identity>, capability: &str) -> Admission {
        self.check_admission_at(identity, capability, Instant::now())
    }

    /// Same as [`Self::check_admission`] with an explicit clock for the rate-limit window.
    pub fn check_admission_at(
        &self,
        identity: Option<&Identity>,
        capability: &str,
        now: Instant,
    ) -> Admission {
        let admission = self.evaluate(identity, capability, now);
        self.record(identity, capability, admission);
        admission
    }

    fn evaluate(&self, identity: Option<&Identity>, capability: &str, now: Instant) -> Admission {
        let Some(identity) = identity else {
            return Admission::Reject(RejectReason::NotAuthenticated);
        };
        if !self.policy.feature_enabled(capability) {
            return Admission::Reject(RejectReason::FeatureDisabled);
        }
        if !self.policy.plan_allows(identity.plan, capability) {
            return Admission::Reject(RejectReason::PlanInsufficient);
        }

        let rule = self.policy.rate_limit_for(capability);
        let key = Self::rate_limit_key(identity, capability);
        if self.limiter.try_consume_at(&key, rule.limit, rule.window(), now) {
            Admission::Admit
        } else {
            Admission::Reject(RejectReason::RateLimited)
        }
    }

    fn record(&self, identity: Option<&Identity>, capability: &str, admission: Admission) {
        let user_id = identity.map(|identity| identity.user_id.to_string());
        match admission {
            Admission::Admit => debug!(
                capability,
                user_id = user_id.as_deref().unwrap_or("-"),
                "admission granted"
            ),
            Admission::Reject(reason) => info!(
                capability,
                user_id = user_id.as_deref().unwrap_or("-"),
                reason = reason.as_str(),
                "admission rejected"
            ),
        }

        if self.events.receiver_count() == 0 {
            return;
        }
        let event = AdmissionEvent {
            user_id,
            capability: capability.to_string(),
            outcome: admission.outcome().to_string(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.events.send(event) {
            debug!(
                target = "admission-gate",
                "failed to publish admission event: {err}"
            );
        }
    }
}
