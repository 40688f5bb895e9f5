//! Connector plugin installation
//!
//! Plugins arrive as TAR archives and are unpacked into a directory named
//! after their content checksum under the plugin path. The checksum-named
//! layout makes installation idempotent: re-attaching an unchanged archive
//! is a no-op.

use crate::error::{Result, SupervisorError};
use crate::resource::PluginArchive;
use flate2::read::GzDecoder;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Registry of installed plugins, keyed by archive checksum
pub struct PluginStore {
    plugin_dir: PathBuf,
    installed: RwLock<HashSet<String>>,
}

impl PluginStore {
    /// Open a store over the given plugin directory, scanning anything
    /// already installed
    pub fn open(plugin_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            plugin_dir: plugin_dir.into(),
            installed: RwLock::new(HashSet::new()),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-scan the plugin directory into the checksum cache
    pub fn reload(&self) -> Result<()> {
        let mut installed = HashSet::new();

        match std::fs::read_dir(&self.plugin_dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().to_string();
                    if entry.file_type()?.is_dir() && !name.starts_with('.') {
                        installed.insert(name);
                    }
                }
            }
            // plugin directory not created yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        *self.installed.write() = installed;
        Ok(())
    }

    /// Whether a plugin with this checksum is already installed
    pub fn is_installed(&self, checksum: &str) -> bool {
        self.installed.read().contains(checksum)
    }

    /// Checksums of all installed plugins
    pub fn installed(&self) -> Vec<String> {
        self.installed.read().iter().cloned().collect()
    }

    /// Unpack an archive into a checksum-named directory.
    ///
    /// Returns `false` when the checksum is already installed and nothing
    /// was done.
    pub fn install(&self, archive: &PluginArchive) -> Result<bool> {
        if self.is_installed(&archive.checksum) {
            debug!(checksum = %archive.checksum, "plugin already installed, skipping");
            return Ok(false);
        }

        let target = self.plugin_dir.join(&archive.checksum);
        std::fs::create_dir_all(&target)?;

        if let Err(e) = unpack_archive(&archive.path, &target) {
            // do not leave a half-unpacked dir that would be mistaken for
            // an installed plugin on the next scan
            let _ = std::fs::remove_dir_all(&target);
            return Err(e);
        }

        self.installed.write().insert(archive.checksum.clone());
        info!(checksum = %archive.checksum, path = %target.display(), "installed plugin");
        Ok(true)
    }
}

/// Unpack a `.tar`, `.tar.gz` or `.tgz` archive into `target`
fn unpack_archive(source: &Path, target: &Path) -> Result<()> {
    let file = File::open(source)?;

    let gzipped = matches!(
        source.extension().and_then(|e| e.to_str()),
        Some("gz") | Some("tgz")
    );

    let result = if gzipped {
        tar::Archive::new(GzDecoder::new(file)).unpack(target)
    } else {
        tar::Archive::new(file).unpack(target)
    };

    result.map_err(|e| {
        SupervisorError::service(format!(
            "failed to unpack plugin archive {}: {e}",
            source.display()
        ))
    })
}
