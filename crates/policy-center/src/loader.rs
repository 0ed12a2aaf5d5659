use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource};
use crate::overlay::{apply_policy_value, PolicyPath};

const ENV_PREFIX: &str = "EVENTRA_POLICY__";
const ENV_JSON: &str = "EVENTRA_POLICY_OVERRIDE_JSON";
const ENV_CLI_OVERRIDES: &str = "EVENTRA_POLICY_CLI_OVERRIDES";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
}

impl LoadOptions {
    /// Files in order, then both environment layers.
    pub fn with_paths(paths: &[PathBuf]) -> Self {
        Self {
            paths: paths.to_vec(),
            include_env: true,
            include_cli_env: true,
        }
    }
}

/// Values from one file or variable, already resolved to policy paths.
struct PolicyLayer {
    origin: String,
    source: PolicySource,
    entries: Vec<(PolicyPath, Value)>,
}

impl PolicyLayer {
    fn new(origin: impl Into<String>, source: PolicySource) -> Self {
        Self {
            origin: origin.into(),
            source,
            entries: Vec::new(),
        }
    }

    fn apply(self, snapshot: &mut PolicySnapshot) -> Result<(), PolicyError> {
        debug!(origin = %self.origin, entries = self.entries.len(), "applying policy layer");
        for (path, value) in &self.entries {
            apply_policy_value(snapshot, path, value, self.source)
                .map_err(|err| err.within(format!("{} ({path})", self.origin)))?;
        }
        Ok(())
    }
}

pub fn load_snapshot(path: Option<&Path>) -> Result<PolicySnapshot, PolicyError> {
    let paths: Vec<PathBuf> = path.map(Path::to_path_buf).into_iter().collect();
    load_snapshot_with_options(&LoadOptions::with_paths(&paths))
}

/// Builtin defaults, then each file, then `EVENTRA_POLICY__*` and the JSON
/// override, then `EVENTRA_POLICY_CLI_OVERRIDES`. The result is validated.
pub fn load_snapshot_with_options(options: &LoadOptions) -> Result<PolicySnapshot, PolicyError> {
    let mut snapshot = builtin_snapshot();

    for path in &options.paths {
        if !path.exists() {
            debug!(path = %path.display(), "policy file missing; skipped");
            continue;
        }
        file_layer(path)?.apply(&mut snapshot)?;
    }

    if options.include_env {
        for layer in env_layers()? {
            layer.apply(&mut snapshot)?;
        }
    }

    if options.include_cli_env {
        if let Some(layer) = cli_env_layer()? {
            layer.apply(&mut snapshot)?;
        }
    }

    snapshot.validate()?;
    Ok(snapshot)
}

fn builtin_snapshot() -> PolicySnapshot {
    let mut snapshot = default_snapshot();
    for path in snapshot.policy_paths() {
        snapshot.set_provenance(&path.key(), PolicySource::Builtin);
    }
    snapshot
}

fn file_layer(path: &Path) -> Result<PolicyLayer, PolicyError> {
    let origin = format!("policy file {}", path.display());
    let content = fs::read_to_string(path)
        .map_err(|err| PolicyError::Io(err.to_string()).within(origin.as_str()))?;
    let document: Value = serde_yaml::from_str(&content)
        .map_err(|err| PolicyError::Invalid(err.to_string()).within(origin.as_str()))?;

    let mut layer = PolicyLayer::new(origin, PolicySource::File);
    collect_document(&document, &mut layer.entries).map_err(|err| err.within(&layer.origin))?;
    Ok(layer)
}

fn env_layers() -> Result<Vec<PolicyLayer>, PolicyError> {
    let mut vars: Vec<(String, String)> = env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();
    vars.sort();

    let mut layers = Vec::new();
    for (key, raw) in vars {
        let dotted = key[ENV_PREFIX.len()..]
            .split("__")
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(".");
        let origin = format!("env {key}");
        let path = PolicyPath::parse(&dotted).map_err(|err| err.within(origin.as_str()))?;
        let mut layer = PolicyLayer::new(origin, PolicySource::Env);
        layer.entries.push((path, parse_scalar(&raw)));
        layers.push(layer);
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let origin = format!("env {ENV_JSON}");
            let document: Value = serde_json::from_str(&raw_json)
                .map_err(|err| PolicyError::Invalid(err.to_string()).within(origin.as_str()))?;
            let mut layer = PolicyLayer::new(origin, PolicySource::Env);
            collect_document(&document, &mut layer.entries)
                .map_err(|err| err.within(&layer.origin))?;
            layers.push(layer);
        }
    }

    Ok(layers)
}

fn cli_env_layer() -> Result<Option<PolicyLayer>, PolicyError> {
    let Ok(raw) = env::var(ENV_CLI_OVERRIDES) else {
        return Ok(None);
    };
    let mut layer = PolicyLayer::new(format!("env {ENV_CLI_OVERRIDES}"), PolicySource::Cli);
    for token in raw.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        let Some((path, value)) = token.split_once('=') else {
            return Err(PolicyError::InvalidValue(format!("expected path=value, got '{token}'"))
                .within(&layer.origin));
        };
        let path = PolicyPath::parse(path).map_err(|err| err.within(&layer.origin))?;
        layer.entries.push((path, parse_scalar(value.trim())));
    }
    Ok(Some(layer))
}

/// Walks a policy document section by section. Unknown keys are errors.
fn collect_document(
    document: &Value,
    entries: &mut Vec<(PolicyPath, Value)>,
) -> Result<(), PolicyError> {
    let root = match document {
        Value::Null => return Ok(()),
        other => expect_object(other, "policy document")?,
    };

    for (section, body) in root {
        match normalize(section).as_str() {
            "features" => {
                for (capability, value) in expect_object(body, "features")? {
                    entries.push((PolicyPath::Feature(normalize(capability)), value.clone()));
                }
            }
            "plans" => {
                for (tier, table) in expect_object(body, "plans")? {
                    let tier_path = format!("plans.{}", normalize(tier));
                    for (capability, value) in expect_object(table, &tier_path)? {
                        let path =
                            PolicyPath::parse(&format!("{tier_path}.{}", normalize(capability)))?;
                        entries.push((path, value.clone()));
                    }
                }
            }
            "rate_limits" => collect_rate_limits(body, entries)?,
            other => return Err(PolicyError::UnsupportedPath(other.to_string())),
        }
    }
    Ok(())
}

fn collect_rate_limits(
    body: &Value,
    entries: &mut Vec<(PolicyPath, Value)>,
) -> Result<(), PolicyError> {
    for (key, value) in expect_object(body, "rate_limits")? {
        match normalize(key).as_str() {
            "default_class" => entries.push((PolicyPath::DefaultClass, value.clone())),
            "classes" => {
                for (class, rule) in expect_object(value, "rate_limits.classes")? {
                    let class_path = format!("rate_limits.classes.{}", normalize(class));
                    for (field, field_value) in expect_object(rule, &class_path)? {
                        let path = PolicyPath::parse(&format!("{class_path}.{}", normalize(field)))?;
                        entries.push((path, field_value.clone()));
                    }
                }
            }
            "capabilities" => {
                for (capability, class) in expect_object(value, "rate_limits.capabilities")? {
                    entries.push((
                        PolicyPath::CapabilityClass(normalize(capability)),
                        class.clone(),
                    ));
                }
            }
            other => return Err(PolicyError::UnsupportedPath(format!("rate_limits.{other}"))),
        }
    }
    Ok(())
}

fn expect_object<'a>(value: &'a Value, at: &str) -> Result<&'a Map<String, Value>, PolicyError> {
    value
        .as_object()
        .ok_or_else(|| PolicyError::InvalidValue(format!("{at} must be a mapping, got {value}")))
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Env values are JSON when they parse as JSON, otherwise plain strings.
fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
