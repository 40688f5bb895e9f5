//! Worker health checks
//!
//! A worker counts as healthy once its REST API answers 200 with a
//! cluster id in the body. The REST listener is basic-auth protected,
//! so the probe authenticates as the admin user from the desired
//! credentials.

use crate::config::HealthSettings;
use crate::error::{Result, SupervisorError};
use crate::secrets::ADMIN_USERNAME;
use crate::state::DesiredConfig;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Marker the root endpoint returns once the worker has joined the cluster
const CLUSTER_ID_FIELD: &str = "kafka_cluster_id";

/// Liveness check against a (re)started worker
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Single probe attempt. `Ok(false)` means the worker answered but
    /// is not ready yet; `Err` means the endpoint was unreachable.
    async fn check(&self, desired: &DesiredConfig) -> Result<bool>;
}

/// Probe against the worker REST API
pub struct RestHealthProbe {
    client: reqwest::Client,
    base_url: String,
}

impl RestHealthProbe {
    pub fn new(host: &str, port: u16, settings: &HealthSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| SupervisorError::health(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("http://{host}:{port}/"),
        })
    }
}

#[async_trait]
impl HealthProbe for RestHealthProbe {
    async fn check(&self, desired: &DesiredConfig) -> Result<bool> {
        let password = desired
            .admin_password()
            .ok_or_else(|| SupervisorError::health("no admin credential in desired snapshot"))?;

        let response = self
            .client
            .get(&self.base_url)
            .basic_auth(ADMIN_USERNAME, Some(password.expose_secret()))
            .send()
            .await
            .map_err(|e| SupervisorError::health(format!("worker unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "worker answered but is not ready");
            return Ok(false);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SupervisorError::health(format!("failed to read response: {e}")))?;

        Ok(body.get(CLUSTER_ID_FIELD).is_some())
    }
}

/// Probe repeatedly until the worker reports healthy or attempts run out
pub async fn wait_until_healthy(
    probe: &dyn HealthProbe,
    desired: &DesiredConfig,
    settings: &HealthSettings,
) -> Result<()> {
    let mut last_error = None;

    for attempt in 1..=settings.attempts {
        match probe.check(desired).await {
            Ok(true) => {
                debug!(attempt, "worker healthy");
                return Ok(());
            }
            Ok(false) => {
                debug!(attempt, "worker not ready");
                last_error = Some("worker answered but reported no cluster id".to_string());
            }
            Err(e) => {
                warn!(attempt, error = %e, "health check failed");
                last_error = Some(e.to_string());
            }
        }

        if attempt < settings.attempts {
            tokio::time::sleep(settings.interval()).await;
        }
    }

    Err(SupervisorError::health(format!(
        "worker failed {} health checks: {}",
        settings.attempts,
        last_error.unwrap_or_else(|| "no probe response".to_string())
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WorkerOptions;
    use crate::secrets::Credentials;
    use crate::types::SensitiveString;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn desired() -> DesiredConfig {
        let mut credentials = Credentials::new();
        credentials.insert(
            ADMIN_USERNAME.to_string(),
            SensitiveString::new("password"),
        );
        DesiredConfig {
            credentials,
            plugin_checksum: None,
            options: WorkerOptions::default(),
        }
    }

    fn settings(attempts: u32) -> HealthSettings {
        HealthSettings {
            attempts,
            interval_ms: 1,
            timeout_ms: 100,
        }
    }

    struct ScriptedProbe {
        healthy_after: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn check(&self, _desired: &DesiredConfig) -> Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(call >= self.healthy_after)
        }
    }

    #[tokio::test]
    async fn test_healthy_on_first_attempt() {
        let probe = ScriptedProbe {
            healthy_after: 1,
            calls: AtomicU32::new(0),
        };
        wait_until_healthy(&probe, &desired(), &settings(5))
            .await
            .unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_healthy_after_retries() {
        let probe = ScriptedProbe {
            healthy_after: 3,
            calls: AtomicU32::new(0),
        };
        wait_until_healthy(&probe, &desired(), &settings(5))
            .await
            .unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let probe = ScriptedProbe {
            healthy_after: 10,
            calls: AtomicU32::new(0),
        };
        let err = wait_until_healthy(&probe, &desired(), &settings(3))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Health(_)));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_admin_credential_is_an_error() {
        let probe = RestHealthProbe::new("localhost", 8083, &settings(1)).unwrap();
        let no_admin = DesiredConfig {
            credentials: Credentials::new(),
            plugin_checksum: None,
            options: WorkerOptions::default(),
        };

        // fails before any request is attempted
        let err = probe.check(&no_admin).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Health(_)));
        assert!(err.to_string().contains("admin"));
    }

    #[tokio::test]
    async fn test_unreachable_worker_reported() {
        struct DownProbe;

        #[async_trait]
        impl HealthProbe for DownProbe {
            async fn check(&self, _desired: &DesiredConfig) -> Result<bool> {
                Err(SupervisorError::health("connection refused"))
            }
        }

        let err = wait_until_healthy(&DownProbe, &desired(), &settings(2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
