//! Reconciliation loop
//!
//! One supervisor owns the applied snapshot and runs passes one at a
//! time. Requests arriving while a pass is in flight are queued on a
//! channel and drained into a single follow-up pass, so a burst of
//! change notifications converges in two passes at most.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::plugins::PluginStore;
use crate::reconcile::{decide, diff, ChangeSet, Field, ReconcileAction};
use crate::resource::PluginArchive;
use crate::state::{observe, AppliedConfig, DesiredConfig, InputSources};
use crate::config::ReloadPolicy;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why a pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    /// Supervisor startup
    Startup,
    /// The system-users secret changed
    SecretChanged,
    /// The plugin resource was re-attached
    ResourceChanged,
    /// A scalar option changed
    OptionsChanged,
    /// Explicit operator request
    Requested,
}

/// Cloneable handle for requesting passes from other tasks
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::UnboundedSender<ReconcileTrigger>,
}

impl ReconcileHandle {
    /// Queue a pass. Requests overlapping an in-flight pass coalesce.
    pub fn request(&self, trigger: ReconcileTrigger) {
        // a closed channel means the supervisor is shutting down
        let _ = self.tx.send(trigger);
    }
}

/// What a completed pass observed and did
#[derive(Debug)]
pub struct PassOutcome {
    pub changes: ChangeSet,
    pub action: ReconcileAction,
}

pub struct Supervisor {
    inputs: InputSources,
    plugins: PluginStore,
    dispatcher: Dispatcher,
    policy: ReloadPolicy,
    applied: AppliedConfig,
    rx: mpsc::UnboundedReceiver<ReconcileTrigger>,
}

impl Supervisor {
    pub fn new(
        inputs: InputSources,
        plugins: PluginStore,
        dispatcher: Dispatcher,
        policy: ReloadPolicy,
    ) -> (Self, ReconcileHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            inputs,
            plugins,
            dispatcher,
            policy,
            applied: AppliedConfig::unapplied(),
            rx,
        };
        (supervisor, ReconcileHandle { tx })
    }

    /// The last successfully applied snapshot
    pub fn applied(&self) -> &AppliedConfig {
        &self.applied
    }

    /// Replace the scalar options observed by future passes.
    ///
    /// Callers should follow up with a [`ReconcileTrigger::OptionsChanged`]
    /// request; the change takes effect on the next pass either way.
    pub fn set_options(&mut self, options: crate::options::WorkerOptions) {
        self.inputs.options = options;
    }

    /// Run a single pass: observe, diff, decide, dispatch.
    ///
    /// Input errors abort before any side effect. Dispatch failures leave
    /// the applied snapshot untouched so the drift is found again next pass.
    pub async fn pass(&mut self) -> Result<PassOutcome> {
        counter!("supervisor_passes_total").increment(1);

        let desired = observe(&self.inputs)?;

        let changes = diff(&desired, &self.applied);
        if changes.is_empty() {
            debug!("no drift");
            return Ok(PassOutcome {
                changes,
                action: ReconcileAction::None,
            });
        }

        info!(drift = %changes, "configuration drift detected");

        if changes.contains(Field::PluginChecksum) {
            self.install_plugin(&desired)?;
        }

        let action = decide(&changes, &self.policy);
        self.dispatcher
            .apply(action, &changes, desired, &mut self.applied)
            .await?;

        Ok(PassOutcome { changes, action })
    }

    /// Unpack the attached archive into the plugin path under its
    /// checksum. Idempotent: an already installed checksum is a no-op.
    fn install_plugin(&self, desired: &DesiredConfig) -> Result<()> {
        let (Some(path), Some(checksum)) =
            (&self.inputs.plugin_resource, &desired.plugin_checksum)
        else {
            return Ok(());
        };

        let archive = PluginArchive {
            path: path.clone(),
            checksum: checksum.clone(),
        };
        if self.plugins.install(&archive)? {
            info!(checksum = %archive.checksum, "installed plugin archive");
        }
        Ok(())
    }

    /// Serve queued triggers until the channel closes.
    ///
    /// All triggers queued behind the current one are drained first, so
    /// one pass answers the whole burst.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(trigger) = self.rx.recv().await {
            let mut triggers = vec![trigger];
            while let Ok(queued) = self.rx.try_recv() {
                triggers.push(queued);
            }
            if triggers.len() > 1 {
                debug!(coalesced = triggers.len(), "coalescing queued triggers");
            }

            match self.pass().await {
                Ok(outcome) => {
                    debug!(?triggers, action = ?outcome.action, "pass complete");
                }
                // the stale applied snapshot keeps the drift visible, so a
                // later trigger can retry once the cause is fixed
                Err(e) if e.is_fatal() => {
                    counter!("supervisor_pass_errors_total").increment(1);
                    tracing::error!(error = %e, "pass failed, worker left in previous state");
                }
                Err(e) => {
                    counter!("supervisor_pass_errors_total").increment(1);
                    warn!(error = %e, "pass failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_survives_clone() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ReconcileHandle { tx };
        let cloned = handle.clone();

        handle.request(ReconcileTrigger::Startup);
        cloned.request(ReconcileTrigger::SecretChanged);

        assert_eq!(rx.recv().await, Some(ReconcileTrigger::Startup));
        assert_eq!(rx.recv().await, Some(ReconcileTrigger::SecretChanged));
    }

    #[test]
    fn test_request_after_shutdown_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ReconcileHandle { tx };
        handle.request(ReconcileTrigger::Requested);
    }
}
