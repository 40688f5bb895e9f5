//! Drift detection
//!
//! Pure functions: [`diff`] compares the desired snapshot against the last
//! applied one field by field and names every mismatch in a [`ChangeSet`];
//! [`decide`] maps a change-set to the action the dispatcher should take.
//! No side effects, fully deterministic.

use crate::config::ReloadPolicy;
use crate::state::{AppliedConfig, DesiredConfig};
use std::fmt;

/// A single comparable field of the worker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Credentials,
    PluginChecksum,
    RestPort,
    KeyConverter,
    ValueConverter,
    LogLevel,
    Profile,
    ExactlyOnceSourceSupport,
}

impl Field {
    /// All fields, in the order they are diffed and reported
    pub const ALL: [Field; 8] = [
        Field::Credentials,
        Field::PluginChecksum,
        Field::RestPort,
        Field::KeyConverter,
        Field::ValueConverter,
        Field::LogLevel,
        Field::Profile,
        Field::ExactlyOnceSourceSupport,
    ];

    /// Whether drift in this field alone can be applied without a restart
    pub fn hot_reloadable(&self) -> bool {
        matches!(self, Field::Credentials | Field::LogLevel)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Credentials => "credentials",
            Field::PluginChecksum => "plugin_checksum",
            Field::RestPort => "rest_port",
            Field::KeyConverter => "key_converter",
            Field::ValueConverter => "value_converter",
            Field::LogLevel => "log_level",
            Field::Profile => "profile",
            Field::ExactlyOnceSourceSupport => "exactly_once_source_support",
        };
        write!(f, "{name}")
    }
}

/// The set of fields where desired and applied configuration disagree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    fields: Vec<Field>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    /// Drifted fields, in diff order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn push(&mut self, field: Field) {
        self.fields.push(field);
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in &self.fields {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
            first = false;
        }
        Ok(())
    }
}

/// What the dispatcher should do about a change-set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No drift, no side effects
    None,
    /// Apply without bouncing the worker process
    HotReload,
    /// Full stop / rewrite / start cycle
    Restart,
}

/// Structural comparison of desired vs applied configuration.
///
/// A worker that has never been configured drifts in every field.
pub fn diff(desired: &DesiredConfig, applied: &AppliedConfig) -> ChangeSet {
    let mut changes = ChangeSet::default();

    let Some(applied) = applied.get() else {
        for field in Field::ALL {
            changes.push(field);
        }
        return changes;
    };

    if desired.credentials != applied.credentials {
        changes.push(Field::Credentials);
    }
    if desired.plugin_checksum != applied.plugin_checksum {
        changes.push(Field::PluginChecksum);
    }
    if desired.options.rest_port != applied.options.rest_port {
        changes.push(Field::RestPort);
    }
    if desired.options.key_converter != applied.options.key_converter {
        changes.push(Field::KeyConverter);
    }
    if desired.options.value_converter != applied.options.value_converter {
        changes.push(Field::ValueConverter);
    }
    if desired.options.log_level != applied.options.log_level {
        changes.push(Field::LogLevel);
    }
    if desired.options.profile != applied.options.profile {
        changes.push(Field::Profile);
    }
    if desired.options.exactly_once_source_support != applied.options.exactly_once_source_support {
        changes.push(Field::ExactlyOnceSourceSupport);
    }

    changes
}

/// Map a change-set to a dispatch action.
///
/// A plugin checksum change always forces a restart; there is no partial
/// reload path for plugin additions. Drift confined to hot-reloadable
/// fields avoids the restart only when the policy allows it.
pub fn decide(changes: &ChangeSet, policy: &ReloadPolicy) -> ReconcileAction {
    if changes.is_empty() {
        return ReconcileAction::None;
    }

    if changes.contains(Field::PluginChecksum) {
        return ReconcileAction::Restart;
    }

    if policy.hot_credential_reload && changes.fields().iter().all(Field::hot_reloadable) {
        return ReconcileAction::HotReload;
    }

    ReconcileAction::Restart
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{LogLevel, WorkerOptions};
    use crate::secrets::Credentials;
    use crate::types::SensitiveString;

    fn desired() -> DesiredConfig {
        let mut credentials = Credentials::new();
        credentials.insert("admin".to_string(), SensitiveString::new("pass"));
        DesiredConfig {
            credentials,
            plugin_checksum: Some("aa".repeat(32)),
            options: WorkerOptions::default(),
        }
    }

    fn applied(desired: &DesiredConfig) -> AppliedConfig {
        let mut applied = AppliedConfig::unapplied();
        applied.record(desired.clone());
        applied
    }

    fn hot_reload() -> ReloadPolicy {
        ReloadPolicy {
            hot_credential_reload: true,
        }
    }

    #[test]
    fn test_no_drift_no_action() {
        let d = desired();
        let changes = diff(&d, &applied(&d));
        assert!(changes.is_empty());
        assert_eq!(decide(&changes, &hot_reload()), ReconcileAction::None);
        assert_eq!(
            decide(&changes, &ReloadPolicy::default()),
            ReconcileAction::None
        );
    }

    #[test]
    fn test_unapplied_drifts_everywhere() {
        let d = desired();
        let changes = diff(&d, &AppliedConfig::unapplied());
        assert_eq!(changes.fields().len(), Field::ALL.len());
        assert_eq!(decide(&changes, &hot_reload()), ReconcileAction::Restart);
    }

    #[test]
    fn test_plugin_change_forces_restart() {
        let d = desired();
        let a = applied(&d);
        let mut d2 = d;
        d2.plugin_checksum = Some("bb".repeat(32));

        let changes = diff(&d2, &a);
        assert_eq!(changes.fields(), &[Field::PluginChecksum]);
        // even with hot reload enabled
        assert_eq!(decide(&changes, &hot_reload()), ReconcileAction::Restart);
    }

    #[test]
    fn test_credentials_only_hot_reload_gated_by_policy() {
        let d = desired();
        let a = applied(&d);
        let mut d2 = d;
        d2.credentials
            .insert("admin".to_string(), SensitiveString::new("rotated"));

        let changes = diff(&d2, &a);
        assert_eq!(changes.fields(), &[Field::Credentials]);
        assert_eq!(decide(&changes, &hot_reload()), ReconcileAction::HotReload);
        assert_eq!(
            decide(&changes, &ReloadPolicy::default()),
            ReconcileAction::Restart
        );
    }

    #[test]
    fn test_log_level_only_hot_reload() {
        let d = desired();
        let a = applied(&d);
        let mut d2 = d;
        d2.options.log_level = LogLevel::Debug;

        let changes = diff(&d2, &a);
        assert_eq!(changes.fields(), &[Field::LogLevel]);
        assert_eq!(decide(&changes, &hot_reload()), ReconcileAction::HotReload);
    }

    #[test]
    fn test_mixed_drift_restarts() {
        let d = desired();
        let a = applied(&d);
        let mut d2 = d;
        d2.options.log_level = LogLevel::Debug;
        d2.options.rest_port = 9090;

        let changes = diff(&d2, &a);
        assert!(changes.contains(Field::LogLevel));
        assert!(changes.contains(Field::RestPort));
        assert_eq!(decide(&changes, &hot_reload()), ReconcileAction::Restart);
    }

    #[test]
    fn test_changeset_display() {
        let d = desired();
        let a = applied(&d);
        let mut d2 = d;
        d2.options.rest_port = 9999;
        d2.options.log_level = LogLevel::Error;

        let changes = diff(&d2, &a);
        assert_eq!(changes.to_string(), "rest_port, log_level");
    }
}
