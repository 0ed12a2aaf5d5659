use std::fmt;
use std::time::Duration;

use eventra_core_types::PlanTier;
use serde_json::Value;

use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource, FALLBACK_RATE_LIMIT};

/// One settable value in the policy. `window` is accepted as an alias of `window_ms`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyPath {
    Feature(String),
    Entitlement(PlanTier, String),
    DefaultClass,
    ClassLimit(String),
    ClassWindow(String),
    CapabilityClass(String),
}

impl PolicyPath {
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let lowered = raw.trim().to_ascii_lowercase();
        let segments: Vec<&str> = lowered.split('.').map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(PolicyError::UnsupportedPath(raw.to_string()));
        }
        let path = match segments.as_slice() {
            ["features", capability] => PolicyPath::Feature(capability.to_string()),
            ["plans", tier, capability] => {
                let tier: PlanTier = tier
                    .parse()
                    .map_err(|err| PolicyError::UnsupportedPath(format!("{raw}: {err}")))?;
                PolicyPath::Entitlement(tier, capability.to_string())
            }
            ["rate_limits", "default_class"] => PolicyPath::DefaultClass,
            ["rate_limits", "classes", class, "limit"] => PolicyPath::ClassLimit(class.to_string()),
            ["rate_limits", "classes", class, "window_ms" | "window"] => {
                PolicyPath::ClassWindow(class.to_string())
            }
            ["rate_limits", "capabilities", capability] => {
                PolicyPath::CapabilityClass(capability.to_string())
            }
            _ => return Err(PolicyError::UnsupportedPath(raw.to_string())),
        };
        Ok(path)
    }

    /// Canonical dot-path, used as the provenance key.
    pub fn key(&self) -> String {
        match self {
            PolicyPath::Feature(capability) => format!("features.{capability}"),
            PolicyPath::Entitlement(tier, capability) => format!("plans.{tier}.{capability}"),
            PolicyPath::DefaultClass => "rate_limits.default_class".to_string(),
            PolicyPath::ClassLimit(class) => format!("rate_limits.classes.{class}.limit"),
            PolicyPath::ClassWindow(class) => format!("rate_limits.classes.{class}.window_ms"),
            PolicyPath::CapabilityClass(capability) => {
                format!("rate_limits.capabilities.{capability}")
            }
        }
    }
}

impl fmt::Display for PolicyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl PolicySnapshot {
    /// Every value currently present in the snapshot.
    pub fn policy_paths(&self) -> Vec<PolicyPath> {
        let mut paths: Vec<PolicyPath> = self
            .features
            .keys()
            .map(|capability| PolicyPath::Feature(capability.clone()))
            .collect();
        for (tier, table) in &self.plans {
            paths.extend(
                table
                    .keys()
                    .map(|capability| PolicyPath::Entitlement(*tier, capability.clone())),
            );
        }
        paths.push(PolicyPath::DefaultClass);
        for class in self.rate_limits.classes.keys() {
            paths.push(PolicyPath::ClassLimit(class.clone()));
            paths.push(PolicyPath::ClassWindow(class.clone()));
        }
        paths.extend(
            self.rate_limits
                .capabilities
                .keys()
                .map(|capability| PolicyPath::CapabilityClass(capability.clone())),
        );
        paths
    }
}

/// Parses `path` and applies one value to the snapshot, recording where it came from.
pub fn apply_override_to_snapshot(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    let path = PolicyPath::parse(path)?;
    apply_policy_value(snapshot, &path, value, source)
}

pub fn apply_policy_value(
    snapshot: &mut PolicySnapshot,
    path: &PolicyPath,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    let key = path.key();
    // A limit nobody has set yet takes the candidate as-is.
    let numeric_source = if snapshot.provenance.contains_key(&key) {
        source
    } else {
        PolicySource::Cli
    };

    let changed = match path {
        PolicyPath::Feature(capability) => {
            let target = snapshot.features.entry(capability.clone()).or_insert(false);
            merge_bool(target, to_bool(value)?)
        }
        PolicyPath::Entitlement(tier, capability) => {
            let target = snapshot
                .plans
                .entry(*tier)
                .or_default()
                .entry(capability.clone())
                .or_insert(false);
            merge_bool(target, to_bool(value)?)
        }
        PolicyPath::DefaultClass => {
            merge_string(&mut snapshot.rate_limits.default_class, to_class_name(value)?)
        }
        PolicyPath::CapabilityClass(capability) => {
            let target = snapshot
                .rate_limits
                .capabilities
                .entry(capability.clone())
                .or_default();
            merge_string(target, to_class_name(value)?)
        }
        PolicyPath::ClassLimit(class) => {
            let limit = to_u32(value)?;
            let rule = snapshot
                .rate_limits
                .classes
                .entry(class.clone())
                .or_insert(FALLBACK_RATE_LIMIT);
            merge_limit(&mut rule.limit, limit, numeric_source)
        }
        PolicyPath::ClassWindow(class) => {
            let window_ms = to_window_ms(value)?;
            let rule = snapshot
                .rate_limits
                .classes
                .entry(class.clone())
                .or_insert(FALLBACK_RATE_LIMIT);
            merge_window(&mut rule.window_ms, window_ms, numeric_source)
        }
    };
    if changed || !snapshot.provenance.contains_key(&key) {
        snapshot.set_provenance(&key, source);
    }
    Ok(())
}

// File and env layers may only tighten numeric limits; CLI replaces them.
// A limit of 0 is unlimited, so it is the loosest value rather than the strictest.
fn merge_limit(target: &mut u32, candidate: u32, source: PolicySource) -> bool {
    let original = *target;
    *target = match (source, original, candidate) {
        (PolicySource::Cli, _, _) => candidate,
        (_, 0, _) => candidate,
        (_, _, 0) => original,
        _ => original.min(candidate),
    };
    *target != original
}

// A longer window admits fewer requests per unit of time.
fn merge_window(target: &mut u64, candidate: u64, source: PolicySource) -> bool {
    let original = *target;
    if matches!(source, PolicySource::Cli) {
        *target = candidate;
    } else {
        *target = original.max(candidate);
    }
    *target != original
}

fn merge_bool(target: &mut bool, candidate: bool) -> bool {
    let original = *target;
    *target = candidate;
    *target != original
}

fn merge_string(target: &mut String, candidate: String) -> bool {
    if *target == candidate {
        return false;
    }
    *target = candidate;
    true
}

fn to_u32(value: &Value) -> Result<u32, PolicyError> {
    let raw = value.as_u64().ok_or_else(|| {
        PolicyError::InvalidValue(format!("expected non-negative integer, got {value}"))
    })?;
    u32::try_from(raw).map_err(|_| PolicyError::InvalidValue(format!("value {raw} exceeds u32")))
}

/// Integer milliseconds or a humantime string such as `90s`.
fn to_window_ms(value: &Value) -> Result<u64, PolicyError> {
    if let Some(ms) = value.as_u64() {
        return Ok(ms);
    }
    let raw = value
        .as_str()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected duration, got {value}")))?;
    let duration: Duration = humantime::parse_duration(raw.trim())
        .map_err(|err| PolicyError::InvalidValue(format!("invalid duration '{raw}': {err}")))?;
    u64::try_from(duration.as_millis())
        .map_err(|_| PolicyError::InvalidValue(format!("duration '{raw}' too large")))
}

fn to_bool(value: &Value) -> Result<bool, PolicyError> {
    value
        .as_bool()
        .ok_or_else(|| PolicyError::InvalidValue(format!("expected bool, got {value}")))
}

fn to_class_name(value: &Value) -> Result<String, PolicyError> {
    match value {
        Value::String(raw) if !raw.trim().is_empty() => Ok(raw.trim().to_ascii_lowercase()),
        other => Err(PolicyError::InvalidValue(format!(
            "expected rate-limit class name, got {other}"
        ))),
    }
}
