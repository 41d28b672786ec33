//! Persisted configuration artifact: a JSON key/value document rewritten
//! wholesale on every save.
//!
//! The artifact is normally kept read-only on disk. Writes go through a
//! temporary file in the same directory followed by a rename, with best-effort
//! permission toggling around the swap. When the site is deployed over FTP the
//! artifact is managed by the FTP layer instead and the permission toggling is
//! skipped.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::error::{FsOpsError, FsOpsResult};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// FTP deployment credentials carried by the configuration document.
///
/// Passed explicitly to every write so that credentials submitted in the same
/// request are used for the write that persists them, without any
/// process-global state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FtpSettings {
    /// Whether the site's files are managed through the FTP layer.
    pub enabled: bool,
    /// FTP host.
    pub host: String,
    /// FTP port.
    pub port: u16,
    /// FTP account name.
    pub username: String,
    /// FTP account password.
    pub password: String,
    /// Root path of the site within the FTP account.
    pub root: String,
}

/// Abstraction over the configuration artifact used by the save pipeline.
pub trait ArtifactStore: Send + Sync {
    /// Read and decode the current artifact document.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be read or decoded.
    fn load(&self) -> FsOpsResult<Value>;

    /// Replace the artifact with the supplied document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized or the artifact
    /// cannot be written. Permission toggling failures are reported as
    /// warnings, never as errors.
    fn write(&self, document: &Value, ftp: &FtpSettings) -> FsOpsResult<()>;
}

/// File-backed artifact store rooted at a platform-fixed path.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    path: PathBuf,
}

impl FileArtifactStore {
    /// Create a store for the artifact at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the managed artifact.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| "artifact".into(), std::ffi::OsStr::to_os_string);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ArtifactStore for FileArtifactStore {
    fn load(&self) -> FsOpsResult<Value> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| FsOpsError::io("artifact.read", &self.path, source))?;
        serde_json::from_str(&raw).map_err(|source| FsOpsError::json("artifact.parse", &self.path, source))
    }

    fn write(&self, document: &Value, ftp: &FtpSettings) -> FsOpsResult<()> {
        let mut serialized = serde_json::to_string_pretty(document)
            .map_err(|source| FsOpsError::json("artifact.serialize", &self.path, source))?;
        serialized.push('\n');

        if !ftp.enabled {
            set_mode_best_effort(&self.path, WRITABLE_MODE, "artifact.make_writable");
        }

        let temp = self.temp_path();
        let write_result = fs::write(&temp, serialized.as_bytes())
            .map_err(|source| FsOpsError::io("artifact.write_temp", &temp, source))
            .and_then(|()| {
                fs::rename(&temp, &self.path)
                    .map_err(|source| FsOpsError::io("artifact.rename", &self.path, source))
            });

        if !ftp.enabled {
            set_mode_best_effort(&self.path, READ_ONLY_MODE, "artifact.make_read_only");
        }

        // The write failure wins over whatever the permission restore did.
        write_result
    }
}

#[cfg(unix)]
const WRITABLE_MODE: u32 = 0o644;
#[cfg(unix)]
const READ_ONLY_MODE: u32 = 0o444;
#[cfg(not(unix))]
const WRITABLE_MODE: u32 = 0;
#[cfg(not(unix))]
const READ_ONLY_MODE: u32 = 1;

fn set_mode_best_effort(path: &Path, mode: u32, operation: &'static str) {
    if !path.exists() {
        return;
    }

    #[cfg(unix)]
    let result = fs::set_permissions(path, fs::Permissions::from_mode(mode));

    #[cfg(not(unix))]
    let result = fs::metadata(path).and_then(|meta| {
        let mut perms = meta.permissions();
        perms.set_readonly(mode == READ_ONLY_MODE);
        fs::set_permissions(path, perms)
    });

    if let Err(err) = result {
        warn!(
            error = %err,
            path = %path.display(),
            operation,
            "failed to toggle artifact permission bits"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileArtifactStore {
        FileArtifactStore::new(dir.path().join("configuration.json"))
    }

    #[test]
    fn write_then_load_round_trips() -> FsOpsResult<()> {
        let dir = TempDir::new().map_err(|e| FsOpsError::io("tempdir", ".", e))?;
        let artifact = store(&dir);
        let document = json!({"sitename": "Masthead", "caching": 0});

        artifact.write(&document, &FtpSettings::default())?;
        assert_eq!(artifact.load()?, document);
        Ok(())
    }

    #[test]
    fn write_replaces_existing_document_wholesale() -> FsOpsResult<()> {
        let dir = TempDir::new().map_err(|e| FsOpsError::io("tempdir", ".", e))?;
        let artifact = store(&dir);
        let ftp = FtpSettings::default();

        artifact.write(&json!({"sitename": "Old", "stale": true}), &ftp)?;
        artifact.write(&json!({"sitename": "New"}), &ftp)?;

        let loaded = artifact.load()?;
        assert_eq!(loaded, json!({"sitename": "New"}));
        assert!(loaded.get("stale").is_none());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn write_restores_read_only_bits() -> FsOpsResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().map_err(|e| FsOpsError::io("tempdir", ".", e))?;
        let artifact = store(&dir);
        artifact.write(&json!({}), &FtpSettings::default())?;

        let mode = fs::metadata(artifact.path())
            .map_err(|e| FsOpsError::io("metadata", artifact.path(), e))?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, READ_ONLY_MODE);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn ftp_managed_write_skips_permission_toggle() -> FsOpsResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().map_err(|e| FsOpsError::io("tempdir", ".", e))?;
        let artifact = store(&dir);
        let ftp = FtpSettings {
            enabled: true,
            ..FtpSettings::default()
        };
        artifact.write(&json!({}), &ftp)?;

        let mode = fs::metadata(artifact.path())
            .map_err(|e| FsOpsError::io("metadata", artifact.path(), e))?
            .permissions()
            .mode();
        assert_ne!(mode & 0o777, READ_ONLY_MODE);
        Ok(())
    }

    #[test]
    fn load_missing_artifact_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let artifact = store(&dir);
        assert!(matches!(artifact.load(), Err(FsOpsError::Io { .. })));
    }
}
