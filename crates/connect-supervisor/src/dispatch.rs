//! Action dispatch
//!
//! Takes a decided [`ReconcileAction`] and carries it out against the
//! filesystem and the managed worker. The applied snapshot is only
//! advanced after the action completed, so a failed dispatch leaves the
//! drift visible to the next pass.

use crate::config::{HealthSettings, RestartSettings};
use crate::error::{Result, SupervisorError};
use crate::health::{wait_until_healthy, HealthProbe};
use crate::properties::{write_credentials, write_log4j, write_worker_files, WorkerPaths};
use crate::reconcile::{ChangeSet, ReconcileAction};
use crate::retry::BackoffSchedule;
use crate::service::ManagedService;
use crate::state::{AppliedConfig, DesiredConfig};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Dispatcher {
    service: Arc<dyn ManagedService>,
    probe: Arc<dyn HealthProbe>,
    paths: WorkerPaths,
    bootstrap_servers: Vec<String>,
    advertised_host: String,
    restart: RestartSettings,
    health: HealthSettings,
}

impl Dispatcher {
    pub fn new(
        service: Arc<dyn ManagedService>,
        probe: Arc<dyn HealthProbe>,
        paths: WorkerPaths,
        bootstrap_servers: Vec<String>,
        advertised_host: String,
        restart: RestartSettings,
        health: HealthSettings,
    ) -> Self {
        Self {
            service,
            probe,
            paths,
            bootstrap_servers,
            advertised_host,
            restart,
            health,
        }
    }

    /// Carry out `action` for `desired` and advance `applied` on success.
    pub async fn apply(
        &self,
        action: ReconcileAction,
        changes: &ChangeSet,
        desired: DesiredConfig,
        applied: &mut AppliedConfig,
    ) -> Result<()> {
        match action {
            ReconcileAction::None => Ok(()),
            ReconcileAction::HotReload => {
                info!(%changes, "hot reloading worker configuration");
                write_credentials(&desired, &self.paths)?;
                write_log4j(&desired, &self.paths)?;
                counter!("supervisor_hot_reloads_total").increment(1);
                applied.record(desired);
                Ok(())
            }
            ReconcileAction::Restart => {
                info!(%changes, "restarting worker");
                self.restart_worker(desired, applied).await
            }
        }
    }

    /// Render config files once, then restart until healthy or the
    /// attempt budget runs out.
    async fn restart_worker(
        &self,
        desired: DesiredConfig,
        applied: &mut AppliedConfig,
    ) -> Result<()> {
        write_worker_files(
            &desired,
            &self.bootstrap_servers,
            &self.advertised_host,
            &self.paths,
        )?;

        let schedule = BackoffSchedule::from(&self.restart);
        let mut last_error = String::new();

        for attempt in 0..self.restart.max_attempts {
            let delay = schedule.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            counter!("supervisor_restart_attempts_total").increment(1);

            if let Err(e) = self.service.restart().await {
                warn!(attempt = attempt + 1, error = %e, "restart command failed");
                last_error = e.to_string();
                continue;
            }

            match wait_until_healthy(self.probe.as_ref(), &desired, &self.health).await {
                Ok(()) => {
                    info!(attempt = attempt + 1, "worker restarted and healthy");
                    counter!("supervisor_restarts_total").increment(1);
                    applied.record(desired);
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "worker unhealthy after restart");
                    last_error = e.to_string();
                }
            }
        }

        counter!("supervisor_restart_failures_total").increment(1);
        Err(SupervisorError::RestartExhausted {
            attempts: self.restart.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::options::WorkerOptions;
    use crate::secrets::{Credentials, ADMIN_USERNAME};
    use crate::service::FakeService;
    use crate::types::SensitiveString;
    use async_trait::async_trait;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthProbe for AlwaysHealthy {
        async fn check(&self, _desired: &DesiredConfig) -> Result<bool> {
            Ok(true)
        }
    }

    fn desired() -> DesiredConfig {
        let mut credentials = Credentials::new();
        credentials.insert(ADMIN_USERNAME.to_string(), SensitiveString::new("pw"));
        DesiredConfig {
            credentials,
            plugin_checksum: None,
            options: WorkerOptions::default(),
        }
    }

    fn dispatcher_in(dir: &std::path::Path, service: Arc<FakeService>) -> Dispatcher {
        let paths = WorkerPaths::new(&PathsConfig {
            config_dir: dir.join("etc"),
            plugin_dir: dir.join("plugins"),
            secrets_dir: dir.join("secrets"),
        });
        Dispatcher::new(
            service,
            Arc::new(AlwaysHealthy),
            paths,
            vec!["localhost:9092".to_string()],
            "localhost".to_string(),
            RestartSettings {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
                backoff_multiplier: 2.0,
            },
            HealthSettings {
                attempts: 1,
                interval_ms: 1,
                timeout_ms: 100,
            },
        )
    }

    #[tokio::test]
    async fn test_none_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new());
        let dispatcher = dispatcher_in(dir.path(), service.clone());

        let mut applied = AppliedConfig::unapplied();
        dispatcher
            .apply(
                ReconcileAction::None,
                &ChangeSet::default(),
                desired(),
                &mut applied,
            )
            .await
            .unwrap();

        assert_eq!(service.restart_count(), 0);
        assert!(applied.get().is_none());
    }

    #[tokio::test]
    async fn test_restart_records_applied() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new());
        let dispatcher = dispatcher_in(dir.path(), service.clone());

        let mut applied = AppliedConfig::unapplied();
        dispatcher
            .apply(
                ReconcileAction::Restart,
                &ChangeSet::default(),
                desired(),
                &mut applied,
            )
            .await
            .unwrap();

        assert_eq!(service.restart_count(), 1);
        assert_eq!(applied.get(), Some(&desired()));
        // rendered files land on disk
        assert!(dir.path().join("etc/connect-distributed.properties").exists());
        assert!(dir.path().join("etc/connect.password").exists());
    }

    #[tokio::test]
    async fn test_restart_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new());
        service.fail_next(2);
        let dispatcher = dispatcher_in(dir.path(), service.clone());

        let mut applied = AppliedConfig::unapplied();
        dispatcher
            .apply(
                ReconcileAction::Restart,
                &ChangeSet::default(),
                desired(),
                &mut applied,
            )
            .await
            .unwrap();

        assert_eq!(service.restart_count(), 3);
        assert!(applied.get().is_some());
    }

    #[tokio::test]
    async fn test_restart_budget_exhausted_leaves_applied_stale() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new());
        service.fail_next(3);
        let dispatcher = dispatcher_in(dir.path(), service.clone());

        let mut applied = AppliedConfig::unapplied();
        let err = dispatcher
            .apply(
                ReconcileAction::Restart,
                &ChangeSet::default(),
                desired(),
                &mut applied,
            )
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SupervisorError::RestartExhausted { attempts: 3, .. }
        ));
        assert!(applied.get().is_none());
    }

    #[tokio::test]
    async fn test_hot_reload_writes_only_reloadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeService::new());
        let dispatcher = dispatcher_in(dir.path(), service.clone());

        let mut applied = AppliedConfig::unapplied();
        dispatcher
            .apply(
                ReconcileAction::HotReload,
                &ChangeSet::default(),
                desired(),
                &mut applied,
            )
            .await
            .unwrap();

        assert_eq!(service.restart_count(), 0);
        assert!(applied.get().is_some());
        assert!(dir.path().join("etc/connect.password").exists());
        assert!(dir.path().join("etc/connect-log4j.properties").exists());
        assert!(!dir.path().join("etc/connect-distributed.properties").exists());
    }
}
