//! Supervisor configuration
//!
//! Loaded from a YAML file with `${VAR}` / `${VAR:-default}` environment
//! expansion. The `worker` section carries the operator-facing scalar
//! options; everything else wires the supervisor to the managed service,
//! its filesystem and its retry budgets.

use crate::options::WorkerOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root supervisor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Scalar worker options
    #[serde(default)]
    pub worker: WorkerOptions,

    /// Kafka cluster the worker connects to
    pub kafka: KafkaConfig,

    /// Control commands for the managed worker process
    pub service: ServiceConfig,

    /// Filesystem layout for worker config, plugins and secrets
    #[serde(default)]
    pub paths: PathsConfig,

    /// Path where the plugin archive resource is attached, if wired
    #[serde(default)]
    pub plugin_resource: Option<PathBuf>,

    /// Host advertised on the worker REST listener
    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,

    /// Hot-reload behavior
    #[serde(default)]
    pub reload: ReloadPolicy,

    /// Restart retry budget
    #[serde(default)]
    pub restart: RestartSettings,

    /// Health probing of the worker REST API
    #[serde(default)]
    pub health: HealthSettings,
}

/// Kafka connection details rendered into the worker properties
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Bootstrap servers (host:port)
    pub bootstrap_servers: Vec<String>,
}

/// Control commands for the managed service.
///
/// Each entry is an argv vector executed as-is. When `restart` is unset the
/// supervisor falls back to `stop` followed by `start`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name used in logs and events
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Command starting the worker
    pub start: Vec<String>,

    /// Command stopping the worker
    pub stop: Vec<String>,

    /// Optional dedicated restart command
    #[serde(default)]
    pub restart: Option<Vec<String>>,
}

fn default_service_name() -> String {
    "connect-distributed".to_string()
}

/// Filesystem layout the supervisor owns
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory for rendered worker configuration files
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory connector plugins are installed into
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// Directory holding user-defined secrets, one file per id
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            plugin_dir: default_plugin_dir(),
            secrets_dir: default_secrets_dir(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/connect")
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("/var/lib/connect/plugins")
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/var/lib/connect-supervisor/secrets")
}

fn default_advertised_host() -> String {
    "localhost".to_string()
}

/// Hot-reload policy.
///
/// Whether the worker can pick up credential and log-level changes without
/// a restart is deployment-dependent, so it is opt-in rather than assumed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReloadPolicy {
    /// Apply credential / log-level-only drift without restarting
    #[serde(default)]
    pub hot_credential_reload: bool,
}

/// Restart retry budget with exponential backoff
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestartSettings {
    /// Attempt ceiling, including the first attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Health probe settings for the worker REST API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthSettings {
    /// Probe attempts per wait
    #[serde(default = "default_health_attempts")]
    pub attempts: u32,

    /// Fixed interval between probes, milliseconds
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,

    /// Per-request timeout, milliseconds
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            attempts: default_health_attempts(),
            interval_ms: default_health_interval_ms(),
            timeout_ms: default_health_timeout_ms(),
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_health_attempts() -> u32 {
    5
}
fn default_health_interval_ms() -> u64 {
    3000
}
fn default_health_timeout_ms() -> u64 {
    2000
}

impl SupervisorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let expanded = Self::expand_env_vars(&content);

        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kafka.bootstrap_servers.is_empty() {
            anyhow::bail!("kafka.bootstrap_servers must not be empty");
        }
        if self.service.start.is_empty() {
            anyhow::bail!("service.start command must not be empty");
        }
        if self.service.stop.is_empty() {
            anyhow::bail!("service.stop command must not be empty");
        }
        if let Some(restart) = &self.service.restart {
            if restart.is_empty() {
                anyhow::bail!("service.restart command must not be empty when set");
            }
        }
        if self.restart.max_attempts == 0 {
            anyhow::bail!("restart.max_attempts must be at least 1");
        }
        if self.health.attempts == 0 {
            anyhow::bail!("health.attempts must be at least 1");
        }

        self.worker
            .validate()
            .map_err(|e| anyhow::anyhow!("worker options: {}", e))?;

        Ok(())
    }
}
