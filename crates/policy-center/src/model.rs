use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use eventra_core_types::PlanTier;
use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

/// Rule applied when neither the capability's class nor the default class resolves.
pub const FALLBACK_RATE_LIMIT: RateLimitRule = RateLimitRule {
    limit: 30,
    window_ms: 60_000,
};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub rev: u64,
    pub features: BTreeMap<String, bool>,
    pub plans: BTreeMap<PlanTier, BTreeMap<String, bool>>,
    pub rate_limits: RateLimitPolicy,
    pub provenance: HashMap<String, PolicyProvenance>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RateLimitPolicy {
    pub default_class: String,
    pub classes: BTreeMap<String, RateLimitRule>,
    pub capabilities: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_ms: u64,
}

impl RateLimitRule {
    pub const fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
}

impl PolicySnapshot {
    /// Missing flags read as disabled.
    pub fn feature_enabled(&self, capability: &str) -> bool {
        self.features.get(capability).copied().unwrap_or(false)
    }

    /// Missing tiers or capabilities read as not entitled.
    pub fn plan_allows(&self, plan: PlanTier, capability: &str) -> bool {
        self.plans
            .get(&plan)
            .and_then(|table| table.get(capability))
            .copied()
            .unwrap_or(false)
    }

    pub fn rate_limit_class(&self, capability: &str) -> &str {
        self.rate_limits
            .capabilities
            .get(capability)
            .map(String::as_str)
            .unwrap_or(self.rate_limits.default_class.as_str())
    }

    pub fn rate_limit_for(&self, capability: &str) -> RateLimitRule {
        let class = self.rate_limit_class(capability);
        self.rate_limits
            .classes
            .get(class)
            .or_else(|| self.rate_limits.classes.get(&self.rate_limits.default_class))
            .copied()
            .unwrap_or(FALLBACK_RATE_LIMIT)
    }

    pub fn entitled_plans(&self, capability: &str) -> Vec<PlanTier> {
        PlanTier::ALL
            .into_iter()
            .filter(|plan| self.plan_allows(*plan, capability))
            .collect()
    }

    /// Every capability named anywhere in the snapshot.
    pub fn known_capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .features
            .keys()
            .chain(self.plans.values().flat_map(|table| table.keys()))
            .chain(self.rate_limits.capabilities.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Rejects tables the rate limiter cannot enforce as written.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let classes = &self.rate_limits.classes;
        if !classes.contains_key(&self.rate_limits.default_class) {
            return Err(PolicyError::Invalid(format!(
                "rate_limits.default_class '{}' names no configured class",
                self.rate_limits.default_class
            )));
        }
        for (name, rule) in classes {
            if !rule.is_unlimited() && rule.window_ms == 0 {
                return Err(PolicyError::Invalid(format!(
                    "rate_limits.classes.{name}: limit {} needs a non-zero window",
                    rule.limit
                )));
            }
        }
        for (capability, class) in &self.rate_limits.capabilities {
            if !classes.contains_key(class) {
                return Err(PolicyError::Invalid(format!(
                    "rate_limits.capabilities.{capability} names unknown class '{class}'"
                )));
            }
        }
        Ok(())
    }

    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }
}
