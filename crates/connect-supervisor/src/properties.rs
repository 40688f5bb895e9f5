//! Rendering of worker configuration files
//!
//! Turns a [`DesiredConfig`] into the files the Kafka Connect worker reads
//! at startup: `connect-distributed.properties`, the
//! PropertyFileLoginModule credential store, the JAAS config naming it,
//! and the log4j properties. Rendering is deterministic so the property
//! set can double as a drift signal.

use crate::config::PathsConfig;
use crate::secrets::Credentials;
use crate::state::DesiredConfig;
use std::io;
use std::path::{Path, PathBuf};

/// Consumer group id for the Connect cluster
pub const GROUP_ID: &str = "connect-cluster";

/// REST extension enabling basic auth on the worker API
pub const REST_AUTH_CLASS: &str =
    "org.apache.kafka.connect.rest.basic.auth.extension.BasicAuthSecurityRestExtension";

/// Internal topics, `(mode, topic name)`; `-1` replication uses the
/// broker default
pub const INTERNAL_TOPICS: [(&str, &str); 3] = [
    ("offset", "connect-offset"),
    ("config", "connect-config"),
    ("status", "connect-status"),
];

/// Replication factor for internal topics
pub const REPLICATION_FACTOR: i32 = -1;

/// Delimiter of the credential store entries
const CREDENTIALS_DELIMITER: &str = ":";

/// Resolved file locations for the rendered worker configuration
#[derive(Debug, Clone)]
pub struct WorkerPaths {
    config_dir: PathBuf,
    plugin_dir: PathBuf,
}

impl WorkerPaths {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            config_dir: paths.config_dir.clone(),
            plugin_dir: paths.plugin_dir.clone(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// `connect-distributed.properties` location
    pub fn worker_properties(&self) -> PathBuf {
        self.config_dir.join("connect-distributed.properties")
    }

    /// Credential store consumed by PropertyFileLoginModule
    pub fn passwords(&self) -> PathBuf {
        self.config_dir.join("connect.password")
    }

    /// JAAS configuration naming the credential store
    pub fn jaas(&self) -> PathBuf {
        self.config_dir.join("connect-jaas.cfg")
    }

    /// Worker log4j configuration
    pub fn log4j(&self) -> PathBuf {
        self.config_dir.join("connect-log4j.properties")
    }
}

/// Render the full `connect-distributed.properties` line set.
///
/// Ordering is fixed; two renders of equal snapshots are byte-identical.
pub fn worker_properties(
    desired: &DesiredConfig,
    bootstrap_servers: &[String],
    advertised_host: &str,
    paths: &WorkerPaths,
) -> Vec<String> {
    let options = &desired.options;
    let mut properties = vec![
        format!("bootstrap.servers={}", bootstrap_servers.join(",")),
        format!("group.id={GROUP_ID}"),
        format!("plugin.path={}", paths.plugin_dir().display()),
        "offset.flush.interval.ms=10000".to_string(),
        "key.converter.schemas.enable=false".to_string(),
        "value.converter.schemas.enable=false".to_string(),
    ];

    // REST listener
    properties.extend([
        format!("listeners=http://{advertised_host}:{}", options.rest_port),
        "rest.advertised.listener=http".to_string(),
        format!("rest.advertised.host.name={advertised_host}"),
        format!("rest.advertised.host.port={}", options.rest_port),
        format!("rest.extension.classes={REST_AUTH_CLASS}"),
    ]);

    // Converters
    properties.extend([
        format!("key.converter={}", options.key_converter),
        format!("value.converter={}", options.value_converter),
    ]);

    properties.push(format!(
        "exactly.once.source.support={}",
        if options.exactly_once_source_support {
            "enabled"
        } else {
            "disabled"
        }
    ));

    // Internal topics
    for (mode, topic) in INTERNAL_TOPICS {
        properties.push(format!("{mode}.storage.topic={topic}"));
        properties.push(format!("{mode}.storage.replication.factor={REPLICATION_FACTOR}"));
    }

    properties
}

/// Render the PropertyFileLoginModule credential store (`user: password`
/// lines, ordered by username)
pub fn credentials_store(credentials: &Credentials) -> String {
    let mut out = String::new();
    for (username, password) in credentials {
        out.push_str(username);
        out.push_str(CREDENTIALS_DELIMITER);
        out.push(' ');
        out.push_str(password.expose_secret());
        out.push('\n');
    }
    out
}

/// Render the JAAS config pointing basic auth at the credential store
pub fn jaas_config(passwords_path: &Path) -> String {
    format!(
        "KafkaConnect {{\n    \
         org.apache.kafka.connect.rest.basic.auth.extension.PropertyFileLoginModule required\n    \
         file=\"{}\";\n}};\n",
        passwords_path.display()
    )
}

/// Render the worker log4j configuration
pub fn log4j_properties(desired: &DesiredConfig) -> String {
    format!(
        "log4j.rootLogger={}, stderr\n\
         log4j.appender.stderr=org.apache.log4j.ConsoleAppender\n\
         log4j.appender.stderr.layout=org.apache.log4j.PatternLayout\n\
         log4j.appender.stderr.layout.ConversionPattern=[%d] %p %m (%c)%n\n",
        desired.options.log_level
    )
}

/// Write every rendered file for a desired snapshot.
///
/// Creates the config directory if needed. The credential store is written
/// owner-only since it holds plaintext passwords.
pub fn write_worker_files(
    desired: &DesiredConfig,
    bootstrap_servers: &[String],
    advertised_host: &str,
    paths: &WorkerPaths,
) -> io::Result<()> {
    std::fs::create_dir_all(paths.config_dir())?;

    let properties = worker_properties(desired, bootstrap_servers, advertised_host, paths);
    std::fs::write(paths.worker_properties(), properties.join("\n") + "\n")?;

    write_credentials(desired, paths)?;
    std::fs::write(paths.jaas(), jaas_config(&paths.passwords()))?;
    write_log4j(desired, paths)?;

    Ok(())
}

/// Write only the credential store, for hot credential reloads
pub fn write_credentials(desired: &DesiredConfig, paths: &WorkerPaths) -> io::Result<()> {
    std::fs::create_dir_all(paths.config_dir())?;
    let store = paths.passwords();
    std::fs::write(&store, credentials_store(&desired.credentials))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&store, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Write only the log4j configuration, for hot log-level reloads
pub fn write_log4j(desired: &DesiredConfig, paths: &WorkerPaths) -> io::Result<()> {
    std::fs::create_dir_all(paths.config_dir())?;
    std::fs::write(paths.log4j(), log4j_properties(desired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WorkerOptions;
    use crate::types::SensitiveString;

    fn paths_in(dir: &Path) -> WorkerPaths {
        WorkerPaths::new(&PathsConfig {
            config_dir: dir.join("etc"),
            plugin_dir: dir.join("plugins"),
            secrets_dir: dir.join("secrets"),
        })
    }

    fn desired() -> DesiredConfig {
        let mut credentials = Credentials::new();
        credentials.insert("admin".to_string(), SensitiveString::new("p4ss"));
        credentials.insert("alice".to_string(), SensitiveString::new("wonder"));
        DesiredConfig {
            credentials,
            plugin_checksum: None,
            options: WorkerOptions::default(),
        }
    }

    #[test]
    fn test_worker_properties_content() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let servers = vec!["kafka-0:9092".to_string(), "kafka-1:9092".to_string()];

        let properties = worker_properties(&desired(), &servers, "10.0.0.5", &paths);

        assert!(properties.contains(&"bootstrap.servers=kafka-0:9092,kafka-1:9092".to_string()));
        assert!(properties.contains(&"group.id=connect-cluster".to_string()));
        assert!(properties.contains(&"listeners=http://10.0.0.5:8083".to_string()));
        assert!(properties.contains(&format!("rest.extension.classes={REST_AUTH_CLASS}")));
        assert!(properties.contains(&"offset.storage.topic=connect-offset".to_string()));
        assert!(properties.contains(&"status.storage.replication.factor=-1".to_string()));
        assert!(properties.contains(&"exactly.once.source.support=disabled".to_string()));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let servers = vec!["localhost:9092".to_string()];

        let first = worker_properties(&desired(), &servers, "localhost", &paths);
        let second = worker_properties(&desired(), &servers, "localhost", &paths);
        assert_eq!(first, second);
    }

    #[test]
    fn test_credentials_store_format() {
        let store = credentials_store(&desired().credentials);
        assert_eq!(store, "admin: p4ss\nalice: wonder\n");
    }

    #[test]
    fn test_jaas_names_store_path() {
        let jaas = jaas_config(Path::new("/etc/connect/connect.password"));
        assert!(jaas.contains("PropertyFileLoginModule"));
        assert!(jaas.contains("/etc/connect/connect.password"));
        assert!(jaas.starts_with("KafkaConnect {"));
    }

    #[test]
    fn test_log4j_uses_log_level() {
        let mut d = desired();
        d.options.log_level = crate::options::LogLevel::Debug;
        assert!(log4j_properties(&d).starts_with("log4j.rootLogger=DEBUG"));
    }

    #[test]
    fn test_write_worker_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        let servers = vec!["localhost:9092".to_string()];

        write_worker_files(&desired(), &servers, "localhost", &paths).unwrap();

        assert!(paths.worker_properties().is_file());
        assert!(paths.passwords().is_file());
        assert!(paths.jaas().is_file());
        assert!(paths.log4j().is_file());

        let store = std::fs::read_to_string(paths.passwords()).unwrap();
        assert!(store.contains("admin: p4ss"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(paths.passwords()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
