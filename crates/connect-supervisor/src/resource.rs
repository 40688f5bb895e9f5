//! Plugin archive resource
//!
//! The connector plugin is attached as a TAR archive. The supervisor never
//! parses it; it only hashes the content so change detection stays cheap.

use crate::error::InputError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// The operator-facing name of the plugin resource
pub const PLUGIN_RESOURCE_KEY: &str = "connect-plugin";

/// An attached plugin archive with its content checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginArchive {
    /// Location of the attached archive
    pub path: PathBuf,
    /// SHA-256 of the archive content, hex encoded
    pub checksum: String,
}

impl PluginArchive {
    /// Resolve an attached archive, hashing its content.
    ///
    /// Fails with [`InputError::ResourceMissing`] when nothing is attached
    /// at the given path.
    pub fn resolve(path: &Path) -> Result<Self, InputError> {
        if !path.is_file() {
            return Err(InputError::ResourceMissing(PLUGIN_RESOURCE_KEY.to_string()));
        }

        // the file is attached; a read failure from here on is an access
        // problem, not a missing resource
        let checksum = sha256_file(path).map_err(unreadable)?;

        Ok(Self {
            path: path.to_path_buf(),
            checksum,
        })
    }
}

fn unreadable(e: io::Error) -> InputError {
    InputError::ResourceUnreadable {
        name: PLUGIN_RESOURCE_KEY.to_string(),
        reason: e.to_string(),
    }
}

/// Stream a file through SHA-256 and hex encode the digest
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
