//! Desired and applied configuration snapshots
//!
//! `DesiredConfig` is ephemeral: rebuilt from external state on every
//! reconciliation pass. `AppliedConfig` is the configuration the worker was
//! last started (or hot-reloaded) with; only the dispatcher replaces it,
//! and only after a confirmed success.

use crate::error::InputError;
use crate::options::WorkerOptions;
use crate::resource::PluginArchive;
use crate::secrets::{self, Credentials, SecretStore, ADMIN_USERNAME};
use crate::types::SensitiveString;
use serde::Serialize;
use std::path::PathBuf;

/// Immutable snapshot of the desired worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredConfig {
    /// Users for the worker REST API, always containing `admin`
    pub credentials: Credentials,
    /// SHA-256 of the attached plugin archive, if any
    pub plugin_checksum: Option<String>,
    /// Scalar worker options
    pub options: WorkerOptions,
}

impl DesiredConfig {
    /// Password of the distinguished admin user.
    ///
    /// [`observe`] always merges one in, but the fields are public, so a
    /// hand-built snapshot may lack it.
    pub fn admin_password(&self) -> Option<&SensitiveString> {
        self.credentials.get(ADMIN_USERNAME)
    }
}

/// The configuration the worker process was last started with
#[derive(Debug, Clone, Default)]
pub struct AppliedConfig {
    inner: Option<DesiredConfig>,
}

impl AppliedConfig {
    /// Applied state for a worker that has never been configured
    pub fn unapplied() -> Self {
        Self::default()
    }

    /// The last successfully applied snapshot, if any
    pub fn get(&self) -> Option<&DesiredConfig> {
        self.inner.as_ref()
    }

    /// Record a confirmed successful apply.
    ///
    /// Called by the dispatcher only, after the health probe passes.
    pub fn record(&mut self, desired: DesiredConfig) {
        self.inner = Some(desired);
    }
}

/// The external inputs a reconciliation pass observes
pub struct InputSources {
    /// Store holding the `system-users` secret
    pub secrets: Box<dyn SecretStore>,
    /// Path where the plugin archive is attached, if the resource is wired
    pub plugin_resource: Option<PathBuf>,
    /// Scalar worker options
    pub options: WorkerOptions,
    /// Fallback admin password, generated once at supervisor startup and
    /// used whenever the secret does not define `admin`
    pub admin_fallback: SensitiveString,
}

/// Build the desired snapshot from current external state.
///
/// Pure observation: no side effects. Any failure here aborts the pass
/// before the reconciler or dispatcher run.
pub fn observe(inputs: &InputSources) -> Result<DesiredConfig, InputError> {
    inputs.options.validate()?;

    let mut credentials =
        secrets::resolve_system_users(inputs.secrets.as_ref(), inputs.options.system_users.as_ref())?;

    credentials
        .entry(ADMIN_USERNAME.to_string())
        .or_insert_with(|| inputs.admin_fallback.clone());

    let plugin_checksum = match &inputs.plugin_resource {
        Some(path) => Some(PluginArchive::resolve(path)?.checksum),
        None => None,
    };

    Ok(DesiredConfig {
        credentials,
        plugin_checksum,
        options: inputs.options.clone(),
    })
}
