//! Error types for the supervisor
//!
//! Three families: input errors (bad secret/resource/option, fixed by the
//! operator, abort the pass without side effects), transient errors
//! (service control and health probing, retried with backoff) and fatal
//! errors (retry budget exhausted, surfaced to the caller).

use thiserror::Error;

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors raised while resolving external inputs into a desired snapshot.
///
/// None of these are retryable: they describe operator-correctable state
/// and abort the reconciliation pass before any side effect.
#[derive(Error, Debug)]
pub enum InputError {
    /// Secret reference does not resolve to a stored secret
    #[error("secret '{0}' not found")]
    SecretNotFound(String),

    /// Secret exists but has not been granted to this supervisor
    #[error("access to secret '{0}' denied")]
    SecretAccessDenied(String),

    /// Secret payload is not a flat username=password mapping
    #[error("secret '{id}' is malformed: {reason}")]
    SecretFormat { id: String, reason: String },

    /// Plugin resource path is configured but nothing is attached there
    #[error("resource '{0}' is not attached")]
    ResourceMissing(String),

    /// Plugin resource is attached but its content could not be read
    #[error("resource '{name}' could not be read: {reason}")]
    ResourceUnreadable { name: String, reason: String },

    /// Scalar option value is outside its declared domain
    #[error("invalid value '{value}' for option '{name}', accepted: {accepted}")]
    InvalidOption {
        name: &'static str,
        value: String,
        accepted: String,
    },
}

/// Main error type for the supervisor
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Input resolution failed
    #[error(transparent)]
    Input(#[from] InputError),

    /// Supervisor configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Managed service control failure (start/stop/restart)
    #[error("service control error: {0}")]
    Service(String),

    /// Health probe failure
    #[error("health check failed: {0}")]
    Health(String),

    /// Restart retry budget exhausted; the applied snapshot is left stale
    /// so the next pass re-detects the same drift
    #[error("restart budget exhausted after {attempts} attempts: {last_error}")]
    RestartExhausted { attempts: u32, last_error: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SupervisorError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a service control error
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    /// Create a health probe error
    pub fn health(msg: impl Into<String>) -> Self {
        Self::Health(msg.into())
    }

    /// Check if this error is retryable within a reconciliation pass
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service(_) | Self::Health(_))
    }

    /// Check if this error terminates the pass without any retry
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RestartExhausted { .. })
    }
}
