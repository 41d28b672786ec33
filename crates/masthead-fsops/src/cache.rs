//! File-backed component cache.
//!
//! Cached output lives under one directory per deployment surface. Each cache
//! group is a subdirectory named after the owning component; purging a group
//! removes that subdirectory in every scope.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};

/// Deployment surface owning a cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Public site cache.
    Site,
    /// Administrative backend cache.
    Admin,
}

impl CacheScope {
    /// All scopes, in purge order.
    pub const ALL: [Self; 2] = [Self::Site, Self::Admin];
}

/// Abstraction over the component cache used by the save pipeline.
pub trait CacheStore: Send + Sync {
    /// Remove the cache group belonging to `component` in every scope.
    ///
    /// A group that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing group cannot be removed.
    fn purge_component(&self, component: &str) -> FsOpsResult<()>;

    /// Remove every cache group in every scope.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing group cannot be removed.
    fn flush_all(&self) -> FsOpsResult<()>;

    /// Whether the cache directory for `scope` exists and accepts writes.
    fn dir_writable(&self, scope: CacheScope) -> bool;
}

/// Cache store over per-scope directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    site_dir: PathBuf,
    admin_dir: PathBuf,
}

impl FileCacheStore {
    /// Create a store over the given site and admin cache directories.
    pub fn new(site_dir: impl Into<PathBuf>, admin_dir: impl Into<PathBuf>) -> Self {
        Self {
            site_dir: site_dir.into(),
            admin_dir: admin_dir.into(),
        }
    }

    fn dir(&self, scope: CacheScope) -> &Path {
        match scope {
            CacheScope::Site => &self.site_dir,
            CacheScope::Admin => &self.admin_dir,
        }
    }

    fn remove_group(dir: &Path, component: &str) -> FsOpsResult<()> {
        let group = dir.join(component);
        if !group.is_dir() {
            return Ok(());
        }
        fs::remove_dir_all(&group).map_err(|source| FsOpsError::io("cache.purge", &group, source))?;
        debug!(path = %group.display(), "purged cache group");
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn purge_component(&self, component: &str) -> FsOpsResult<()> {
        for scope in CacheScope::ALL {
            Self::remove_group(self.dir(scope), component)?;
        }
        Ok(())
    }

    fn flush_all(&self) -> FsOpsResult<()> {
        for scope in CacheScope::ALL {
            let dir = self.dir(scope);
            if !dir.is_dir() {
                continue;
            }
            let entries =
                fs::read_dir(dir).map_err(|source| FsOpsError::io("cache.list", dir, source))?;
            for entry in entries {
                let entry = entry.map_err(|source| FsOpsError::io("cache.list", dir, source))?;
                let path = entry.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)
                        .map_err(|source| FsOpsError::io("cache.flush", &path, source))?;
                }
            }
        }
        Ok(())
    }

    fn dir_writable(&self, scope: CacheScope) -> bool {
        let dir = self.dir(scope);
        if !dir.is_dir() {
            return false;
        }
        let probe = dir.join(".write-probe");
        match fs::write(&probe, b"") {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    }
}
