use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use eventra_policy_center::{load_snapshot_with_options, LoadOptions, PolicySnapshot};
use tokio::fs;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};

const LOCAL_ENV_PATH: &str = "config/local.env";
const LOG_FILE_PREFIX: &str = "eventra-gateway.log";

/// Outcome of reading a local env file, reported once logging is installed.
#[derive(Debug, Default)]
pub struct LocalEnvReport {
    pub path: PathBuf,
    pub found: bool,
    pub applied: usize,
    pub kept_existing: usize,
    pub invalid_lines: Vec<usize>,
    pub read_error: Option<String>,
}

impl LocalEnvReport {
    pub fn log(&self) {
        if let Some(err) = &self.read_error {
            warn!(path = %self.path.display(), err = %err, "failed to read local.env overrides");
            return;
        }
        if !self.found {
            return;
        }
        for line in &self.invalid_lines {
            warn!(path = %self.path.display(), line, "invalid local.env entry; skipping");
        }
        info!(
            path = %self.path.display(),
            applied = self.applied,
            kept_existing = self.kept_existing,
            "Loaded environment overrides from local.env"
        );
    }
}

/// Loads `config/local.env` without replacing variables that are already set.
pub fn load_local_env_overrides() -> LocalEnvReport {
    load_env_file(Path::new(LOCAL_ENV_PATH))
}

pub fn load_env_file(path: &Path) -> LocalEnvReport {
    let mut report = LocalEnvReport {
        path: path.to_path_buf(),
        ..LocalEnvReport::default()
    };
    if !path.exists() {
        return report;
    }
    report.found = true;

    let contents = match stdfs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            report.read_error = Some(err.to_string());
            return report;
        }
    };
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            report.invalid_lines.push(idx + 1);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            report.invalid_lines.push(idx + 1);
            continue;
        }
        if env::var(key).is_ok() {
            report.kept_existing += 1;
            continue;
        }
        env::set_var(key, unescape_value(value.trim()));
        report.applied += 1;
    }
    report
}

/// Installs the global subscriber. Keep the returned guard alive to flush file logs.
pub fn init_logging(level: &str, debug: bool, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let (json_layer, text_layer) = if logging.json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            stdfs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
}

pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Logging is not installed while the config loads, so the outcome is reported afterwards.
    pub fn log_source(&self) {
        match &self.source {
            ConfigSource::File(path) => info!("Loaded configuration from: {}", path.display()),
            ConfigSource::Defaults(path) => warn!(
                "Config file not found, using defaults: {}",
                path.display()
            ),
        }
    }
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let (mut config, source) = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config = Config::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        (config, ConfigSource::File(config_path))
    } else {
        (Config::default(), ConfigSource::Defaults(config_path))
    };
    config.provider.apply_env_overrides();

    Ok(LoadedConfig { config, source })
}

// Priority: ./config/config.yaml > ~/.config/eventra/config.yaml
fn default_config_path() -> Result<PathBuf> {
    let local_config = PathBuf::from("config/config.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("eventra");
    path.push("config.yaml");
    Ok(path)
}

/// Builds the effective policy: defaults, then `policy_paths`, then env overrides.
pub fn load_policy(config: &Config) -> Result<PolicySnapshot> {
    let options = LoadOptions::with_paths(&config.policy_paths);
    let snapshot = load_snapshot_with_options(&options).context("Failed to load admission policy")?;
    info!(
        rev = snapshot.rev,
        files = config.policy_paths.len(),
        capabilities = snapshot.known_capabilities().len(),
        "Admission policy loaded"
    );
    Ok(snapshot)
}

fn unescape_value(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}
