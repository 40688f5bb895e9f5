//! Scalar worker options
//!
//! The small set of operator-facing options that shape the worker
//! configuration. Every option has a declared domain; resolution fails with
//! [`InputError::InvalidOption`] naming the option and its accepted values
//! when a value falls outside it.

use crate::error::InputError;
use crate::secrets::SecretRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default converter class for key and value converters
pub const DEFAULT_CONVERTER_CLASS: &str = "org.apache.kafka.connect.json.JsonConverter";

/// Default port for the worker REST API
pub const DEFAULT_REST_PORT: u16 = 8083;

/// Deployment profile, toggles development-friendly behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Hardened defaults, sensitive command output is never logged
    #[default]
    Production,
    /// Relaxed defaults for integration testing
    Testing,
}

impl Profile {
    const ACCEPTED: &'static str = "production, testing";
}

impl FromStr for Profile {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "testing" => Ok(Self::Testing),
            other => Err(InputError::InvalidOption {
                name: "profile",
                value: other.to_string(),
                accepted: Self::ACCEPTED.to_string(),
            }),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Worker log level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    const ACCEPTED: &'static str = "ERROR, WARNING, INFO, DEBUG";
}

impl FromStr for LogLevel {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ERROR" => Ok(Self::Error),
            "WARNING" => Ok(Self::Warning),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            other => Err(InputError::InvalidOption {
                name: "log_level",
                value: other.to_string(),
                accepted: Self::ACCEPTED.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
            Self::Info => write!(f, "INFO"),
            Self::Debug => write!(f, "DEBUG"),
        }
    }
}

/// Resolved scalar options for the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Reference to the user-defined credentials secret
    #[serde(default)]
    pub system_users: Option<SecretRef>,

    /// Enable exactly-once support for source connectors
    #[serde(default)]
    pub exactly_once_source_support: bool,

    /// Converter class for record keys
    #[serde(default = "default_converter")]
    pub key_converter: String,

    /// Converter class for record values
    #[serde(default = "default_converter")]
    pub value_converter: String,

    /// Worker log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Deployment profile
    #[serde(default)]
    pub profile: Profile,

    /// Port for the worker REST API
    #[serde(default = "default_rest_port")]
    pub rest_port: u16,
}

fn default_converter() -> String {
    DEFAULT_CONVERTER_CLASS.to_string()
}

fn default_rest_port() -> u16 {
    DEFAULT_REST_PORT
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            system_users: None,
            exactly_once_source_support: false,
            key_converter: default_converter(),
            value_converter: default_converter(),
            log_level: LogLevel::default(),
            profile: Profile::default(),
            rest_port: default_rest_port(),
        }
    }
}

impl WorkerOptions {
    /// Resolve options from a flat key/value surface.
    ///
    /// Keys use the operator-facing kebab-case names (`system-users`,
    /// `rest-port`, ...). Unknown keys are rejected, missing keys take
    /// their defaults, empty strings are treated as unset.
    pub fn from_flat(raw: &BTreeMap<String, String>) -> Result<Self, InputError> {
        let mut options = Self::default();

        for (key, value) in raw {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "system-users" => options.system_users = Some(value.parse()?),
                "exactly-once-source-support" => {
                    options.exactly_once_source_support =
                        parse_bool("exactly_once_source_support", value)?
                }
                "key-converter" => options.key_converter = value.to_string(),
                "value-converter" => options.value_converter = value.to_string(),
                "log-level" => options.log_level = value.parse()?,
                "profile" => options.profile = value.parse()?,
                "rest-port" => options.rest_port = parse_port(value)?,
                _ => {
                    return Err(InputError::InvalidOption {
                        name: "option",
                        value: key.clone(),
                        accepted: "system-users, exactly-once-source-support, key-converter, \
                                   value-converter, log-level, profile, rest-port"
                            .to_string(),
                    })
                }
            }
        }

        options.validate()?;
        Ok(options)
    }

    /// Validate domains that serde alone does not enforce
    pub fn validate(&self) -> Result<(), InputError> {
        if self.rest_port < 1024 {
            return Err(InputError::InvalidOption {
                name: "rest_port",
                value: self.rest_port.to_string(),
                accepted: "1024..=65535".to_string(),
            });
        }
        if self.key_converter.is_empty() || self.value_converter.is_empty() {
            return Err(InputError::InvalidOption {
                name: "converter",
                value: String::new(),
                accepted: "a non-empty converter class name".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, InputError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(InputError::InvalidOption {
            name,
            value: other.to_string(),
            accepted: "true, false".to_string(),
        }),
    }
}

fn parse_port(value: &str) -> Result<u16, InputError> {
    value
        .parse::<u16>()
        .ok()
        .filter(|p| *p >= 1024)
        .ok_or_else(|| InputError::InvalidOption {
            name: "rest_port",
            value: value.to_string(),
            accepted: "1024..=65535".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WorkerOptions::default();
        assert_eq!(options.rest_port, 8083);
        assert_eq!(options.log_level, LogLevel::Info);
        assert_eq!(options.profile, Profile::Production);
        assert_eq!(options.key_converter, DEFAULT_CONVERTER_CLASS);
        assert!(!options.exactly_once_source_support);
        assert!(options.system_users.is_none());
    }

    #[test]
    fn test_all_valid_enum_values_resolve() {
        for value in ["production", "testing"] {
            assert!(value.parse::<Profile>().is_ok(), "{value}");
        }
        for value in ["ERROR", "WARNING", "INFO", "DEBUG"] {
            assert!(value.parse::<LogLevel>().is_ok(), "{value}");
        }
    }

    #[test]
    fn test_invalid_profile_names_accepted_set() {
        let err = "staging".parse::<Profile>().unwrap_err();
        match err {
            InputError::InvalidOption { name, accepted, .. } => {
                assert_eq!(name, "profile");
                assert!(accepted.contains("production"));
                assert!(accepted.contains("testing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_log_level() {
        assert!("TRACE".parse::<LogLevel>().is_err());
        // lowercase is not in the declared domain
        assert!("debug".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_from_flat() {
        let raw: BTreeMap<String, String> = [
            ("log-level", "DEBUG"),
            ("profile", "testing"),
            ("rest-port", "9090"),
            ("exactly-once-source-support", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let options = WorkerOptions::from_flat(&raw).unwrap();
        assert_eq!(options.log_level, LogLevel::Debug);
        assert_eq!(options.profile, Profile::Testing);
        assert_eq!(options.rest_port, 9090);
        assert!(options.exactly_once_source_support);
    }

    #[test]
    fn test_from_flat_empty_string_is_unset() {
        let raw: BTreeMap<String, String> =
            [("profile".to_string(), "".to_string())].into_iter().collect();
        let options = WorkerOptions::from_flat(&raw).unwrap();
        assert_eq!(options.profile, Profile::Production);
    }

    #[test]
    fn test_from_flat_unknown_key() {
        let raw: BTreeMap<String, String> =
            [("bogus".to_string(), "1".to_string())].into_iter().collect();
        assert!(WorkerOptions::from_flat(&raw).is_err());
    }

    #[test]
    fn test_privileged_port_rejected() {
        let raw: BTreeMap<String, String> =
            [("rest-port".to_string(), "80".to_string())].into_iter().collect();
        assert!(WorkerOptions::from_flat(&raw).is_err());

        let mut options = WorkerOptions::default();
        options.rest_port = 80;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let yaml = "log_level: DEBUG\nprofile: testing\n";
        let options: WorkerOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.log_level, LogLevel::Debug);
        assert_eq!(options.profile, Profile::Testing);
        assert_eq!(options.rest_port, 8083);
    }
}
