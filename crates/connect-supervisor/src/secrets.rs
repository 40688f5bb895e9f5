//! User-defined credential secrets
//!
//! Operators manage REST API users by storing a secret and pointing the
//! `system-users` option at it:
//!
//! ```text
//! echo 'admin=goodpass' > /var/lib/connect-supervisor/secrets/cvh7kruupa1s46bqvuig
//! system_users: secret:cvh7kruupa1s46bqvuig
//! ```
//!
//! A secret payload is a flat `username=password` mapping, one entry per
//! line. Only the `admin` user is functional today; it bootstraps basic
//! auth on the worker REST API.

use crate::error::InputError;
use crate::types::SensitiveString;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::str::FromStr;

/// The distinguished username required for REST API bootstrap
pub const ADMIN_USERNAME: &str = "admin";

/// Ordered username -> password mapping resolved from a secret
pub type Credentials = BTreeMap<String, SensitiveString>;

/// A validated `secret:<id>` reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretRef {
    id: String,
}

impl SecretRef {
    const SCHEME: &'static str = "secret:";

    /// The secret identifier without the `secret:` scheme
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for SecretRef {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(Self::SCHEME) {
            Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(Self { id: id.to_string() })
            }
            _ => Err(InputError::InvalidOption {
                name: "system_users",
                value: s.to_string(),
                accepted: "secret:<alphanumeric id>".to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SecretRef {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecretRef> for String {
    fn from(value: SecretRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::SCHEME, self.id)
    }
}

/// Read access to stored secrets
pub trait SecretStore: Send + Sync {
    /// Fetch the raw payload of a secret by id
    fn read(&self, id: &str) -> Result<String, InputError>;
}

/// Secret store backed by a directory, one file per secret id
pub struct DirSecretStore {
    root: PathBuf,
}

impl DirSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SecretStore for DirSecretStore {
    fn read(&self, id: &str) -> Result<String, InputError> {
        let path = self.root.join(id);
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => InputError::SecretNotFound(id.to_string()),
            ErrorKind::PermissionDenied => InputError::SecretAccessDenied(id.to_string()),
            _ => InputError::SecretAccessDenied(id.to_string()),
        })
    }
}

/// Parse a secret payload into an ordered credential mapping.
///
/// Each non-blank line must be a `username=password` pair. Duplicate
/// usernames and entries without a `=` are rejected.
pub fn parse_credentials(id: &str, payload: &str) -> Result<Credentials, InputError> {
    let mut credentials = Credentials::new();

    for line in payload.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (username, password) = line.split_once('=').ok_or_else(|| {
            InputError::SecretFormat {
                id: id.to_string(),
                reason: format!("entry '{line}' is not a key=value pair"),
            }
        })?;

        let username = username.trim();
        if username.is_empty() {
            return Err(InputError::SecretFormat {
                id: id.to_string(),
                reason: "entry has an empty username".to_string(),
            });
        }

        if credentials
            .insert(username.to_string(), SensitiveString::new(password.trim()))
            .is_some()
        {
            return Err(InputError::SecretFormat {
                id: id.to_string(),
                reason: format!("duplicate username '{username}'"),
            });
        }
    }

    Ok(credentials)
}

/// Resolve the `system-users` secret into credentials.
///
/// Returns an empty mapping when no reference is configured, mirroring a
/// deployment that has not defined any users yet.
pub fn resolve_system_users(
    store: &dyn SecretStore,
    reference: Option<&SecretRef>,
) -> Result<Credentials, InputError> {
    let Some(reference) = reference else {
        return Ok(Credentials::new());
    };

    let payload = store.read(reference.id())?;
    parse_credentials(reference.id(), &payload)
}

/// Generate a random password for internal users
pub fn generate_password() -> SensitiveString {
    let value: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    SensitiveString::new(value)
}
