//! connect-supervisor - Configuration reconciler for a Kafka Connect worker
//!
//! Watches three external inputs (a credentials secret, an attached
//! plugin archive, scalar worker options), diffs the desired
//! configuration against what the worker was last started with, and
//! restarts or hot-reloads the worker to close the gap.
//!
//! ```text
//! ┌─────────┐    ┌───────────┐    ┌────────────┐
//! │ observe │───▶│   diff /  │───▶│  dispatch  │
//! │ inputs  │    │   decide  │    │ (restart)  │
//! └─────────┘    └───────────┘    └────────────┘
//! ```
//!
//! A pass is all-or-nothing on the observe side: any input error aborts
//! before files are written or the worker is touched. On the dispatch
//! side the applied snapshot only advances after the worker came back
//! healthy, so failures are retried on the next pass.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod options;
pub mod plugins;
pub mod properties;
pub mod reconcile;
pub mod resource;
pub mod retry;
pub mod secrets;
pub mod service;
pub mod state;
pub mod supervisor;
pub mod types;

pub use config::SupervisorConfig;
pub use dispatch::Dispatcher;
pub use error::{InputError, Result, SupervisorError};
pub use health::{HealthProbe, RestHealthProbe};
pub use options::{LogLevel, Profile, WorkerOptions};
pub use plugins::PluginStore;
pub use reconcile::{decide, diff, ChangeSet, Field, ReconcileAction};
pub use resource::PluginArchive;
pub use secrets::{DirSecretStore, SecretRef, SecretStore};
pub use service::{CommandService, FakeService, ManagedService};
pub use state::{observe, AppliedConfig, DesiredConfig, InputSources};
pub use supervisor::{PassOutcome, ReconcileHandle, ReconcileTrigger, Supervisor};
pub use types::SensitiveString;
