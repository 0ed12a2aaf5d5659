//! Application configuration.
//!
//! Loaded from YAML with every section optional; environment variables can
//! override the generation provider settings.

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use flow_core::openai::{DEFAULT_API_BASE, DEFAULT_MODEL};
use flow_core::OpenAiConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ConfigError;

pub const ENV_LLM_API_KEY: &str = "EVENTRA_LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "EVENTRA_LLM_MODEL";
pub const ENV_LLM_API_BASE: &str = "EVENTRA_LLM_API_BASE";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub policy_paths: Vec<PathBuf>,
    pub rate_limit_gc: RateLimitGcConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8787,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Openai,
    Disabled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub api_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            temperature: 0.4,
            timeout_ms: 30_000,
        }
    }
}

impl ProviderConfig {
    /// Key, model and base from `EVENTRA_LLM_*` win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env(ENV_LLM_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(model) = non_empty_env(ENV_LLM_MODEL) {
            self.model = model;
        }
        if let Some(base) = non_empty_env(ENV_LLM_API_BASE) {
            self.api_base = base;
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.api_key.clone().unwrap_or_default(),
            model: self.model.clone(),
            api_base: self.api_base.clone(),
            temperature: self.temperature,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitGcConfig {
    /// Idle time after which a rate-limit window is dropped. `0` disables GC.
    pub bucket_ttl_secs: u64,
    pub interval_secs: u64,
}

impl Default for RateLimitGcConfig {
    fn default() -> Self {
        Self {
            bucket_ttl_secs: 600,
            interval_secs: 60,
        }
    }
}

impl RateLimitGcConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.bucket_ttl_secs)
    }

    /// Never tighter than five seconds.
    pub fn interval(&self) -> Duration {
        match self.interval_secs {
            0 => Duration::from_secs(30),
            secs => Duration::from_secs(secs.max(5)),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    /// Daily-rotated log files are written here when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl Config {
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.kind == ProviderKind::Openai {
            let base = self.provider.api_base.trim();
            Url::parse(base).map_err(|err| {
                ConfigError::Invalid(format!("provider.api_base '{base}' is not a URL: {err}"))
            })?;
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid(format!(
                "provider.temperature must be within 0.0..=2.0 (got {})",
                self.provider.temperature
            )));
        }
        if self.provider.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "provider.timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.provider.kind, ProviderKind::Openai);
        assert_eq!(config.rate_limit_gc.ttl(), Duration::from_secs(600));
        assert!(config.policy_paths.is_empty());
    }

    #[test]
    fn sections_are_parsed() {
        let config = Config::from_yaml(
            r#"
server:
  bind: 0.0.0.0
  port: 9000
provider:
  kind: disabled
  api_base: not-checked-when-disabled
policy_paths:
  - config/policy.yaml
rate_limit_gc:
  bucket_ttl_secs: 0
  interval_secs: 1
logging:
  json: true
  dir: /var/log/eventra
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.provider.kind, ProviderKind::Disabled);
        assert_eq!(config.policy_paths, vec![PathBuf::from("config/policy.yaml")]);
        assert!(config.rate_limit_gc.ttl().is_zero());
        assert_eq!(config.rate_limit_gc.interval(), Duration::from_secs(5));
        assert!(config.logging.json);
    }

    #[test]
    fn invalid_api_base_is_rejected() {
        let err = Config::from_yaml("provider:\n  api_base: nope\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    #[serial]
    fn env_overrides_provider_settings() {
        env::set_var(ENV_LLM_API_KEY, "sk-env");
        env::set_var(ENV_LLM_MODEL, "gpt-test");
        let mut provider = ProviderConfig::default();
        provider.apply_env_overrides();
        env::remove_var(ENV_LLM_API_KEY);
        env::remove_var(ENV_LLM_MODEL);

        assert!(provider.has_api_key());
        assert_eq!(provider.model, "gpt-test");
        assert_eq!(provider.api_base, DEFAULT_API_BASE);
        assert_eq!(provider.openai_config().api_key, "sk-env");
    }
}
