use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use admission_gate::{AdmissionGate, IdentityProvider, RateLimiter};
use eventra_policy_center::PolicySnapshot;
use flow_core::{FlowInvoker, FlowRegistry};
use parking_lot::Mutex;

/// Shared handles for every request. Only the rate-limit table mutates.
#[derive(Clone)]
pub struct GatewayState {
    pub gate: Arc<AdmissionGate>,
    pub identity: Arc<dyn IdentityProvider>,
    pub flows: Arc<FlowRegistry>,
    pub invoker: FlowInvoker,
    pub health: Arc<ServeHealth>,
}

impl GatewayState {
    pub fn new(
        policy: Arc<PolicySnapshot>,
        limiter: Arc<RateLimiter>,
        identity: Arc<dyn IdentityProvider>,
        flows: Arc<FlowRegistry>,
        invoker: FlowInvoker,
    ) -> Self {
        Self {
            gate: Arc::new(AdmissionGate::new(policy, limiter)),
            identity,
            flows,
            invoker,
            health: Arc::new(ServeHealth::new()),
        }
    }

    pub fn policy(&self) -> &Arc<PolicySnapshot> {
        self.gate.policy()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.gate.limiter()
    }

    pub fn health_snapshot(&self) -> ServeHealthSnapshot {
        self.health.snapshot()
    }

    pub fn mark_live(&self) {
        self.health.mark_live();
    }

    pub fn mark_ready(&self) {
        self.health.mark_ready();
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.health.mark_unready(error);
    }
}

#[derive(Default)]
pub struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
    last_ready_check: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.update_last_check();
        *self.last_error.lock() = None;
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        self.update_last_check();
        *self.last_error.lock() = Some(error.into());
    }

    pub fn snapshot(&self) -> ServeHealthSnapshot {
        ServeHealthSnapshot {
            ready: self.ready.load(Ordering::SeqCst),
            live: self.live.load(Ordering::SeqCst),
            last_ready_check: self.last_ready_check(),
            last_error: self.last_error.lock().clone(),
        }
    }

    fn update_last_check(&self) {
        if let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) {
            self.last_ready_check
                .store(duration.as_secs(), Ordering::SeqCst);
        }
    }

    fn last_ready_check(&self) -> Option<u64> {
        match self.last_ready_check.load(Ordering::SeqCst) {
            0 => None,
            value => Some(value),
        }
    }
}

pub struct ServeHealthSnapshot {
    pub ready: bool,
    pub live: bool,
    pub last_ready_check: Option<u64>,
    pub last_error: Option<String>,
}
