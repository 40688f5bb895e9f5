//! Managed service control
//!
//! The worker process itself belongs to the external Kafka Connect
//! runtime; the supervisor only drives its lifecycle through a small
//! trait. The production implementation shells out to configured
//! commands; [`FakeService`] is an in-memory double for tests.

use crate::config::ServiceConfig;
use crate::error::{Result, SupervisorError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Lifecycle control over the worker process
#[async_trait]
pub trait ManagedService: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn restart(&self) -> Result<()>;
    async fn is_active(&self) -> bool;
}

/// Service controlled through configured argv commands
pub struct CommandService {
    config: ServiceConfig,
}

impl CommandService {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    async fn run(&self, argv: &[String]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SupervisorError::config("empty service command"))?;

        debug!(service = %self.config.name, command = %argv.join(" "), "running service command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| SupervisorError::service(format!("failed to spawn '{program}': {e}")))?;

        if !output.status.success() {
            return Err(SupervisorError::service(format!(
                "'{}' exited with {}: {}",
                argv.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ManagedService for CommandService {
    async fn start(&self) -> Result<()> {
        self.run(&self.config.start).await
    }

    async fn stop(&self) -> Result<()> {
        self.run(&self.config.stop).await
    }

    async fn restart(&self) -> Result<()> {
        match &self.config.restart {
            Some(restart) => self.run(restart).await,
            None => {
                self.stop().await?;
                self.start().await
            }
        }
    }

    async fn is_active(&self) -> bool {
        // command-backed services expose liveness through the health
        // probe, not through a status command
        true
    }
}

/// In-memory service double.
///
/// Tracks lifecycle calls and can be told to fail the next N start or
/// restart attempts.
#[derive(Default)]
pub struct FakeService {
    active: AtomicBool,
    starts: AtomicU32,
    stops: AtomicU32,
    restarts: AtomicU32,
    fail_next: AtomicU32,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` start/restart calls
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    fn try_consume_failure(&self) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SupervisorError::service("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ManagedService for FakeService {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.try_consume_failure()?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.try_consume_failure()?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
