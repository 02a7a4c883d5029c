//! Reading opened files from outside the app's own storage.
//!
//! Files handed to the app by another app may only be read while a
//! security-scoped access grant is held. [`read_scoped`] takes the grant
//! right before reading and a guard releases it on every exit path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Platform hook granting temporary access to a file outside the sandbox.
pub trait SecurityScope: Send + Sync {
    /// Starts access. Returns `false` when no grant was needed or given.
    fn start_access(&self, path: &Path) -> bool;

    /// Ends an access started by [`Self::start_access`].
    fn stop_access(&self, path: &Path);
}

/// Scope for platforms without sandboxed file grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unscoped;

impl SecurityScope for Unscoped {
    fn start_access(&self, _path: &Path) -> bool {
        false
    }

    fn stop_access(&self, _path: &Path) {}
}

/// RAII guard that releases a started grant on drop.
pub struct ScopedAccess<'a> {
    scope: &'a dyn SecurityScope,
    path: PathBuf,
    started: bool,
}

impl<'a> ScopedAccess<'a> {
    pub fn acquire(scope: &'a dyn SecurityScope, path: &Path) -> Self {
        let started = scope.start_access(path);
        Self {
            scope,
            path: path.to_path_buf(),
            started,
        }
    }

    #[must_use]
    pub const fn started(&self) -> bool {
        self.started
    }
}

impl Drop for ScopedAccess<'_> {
    fn drop(&mut self) {
        if self.started {
            self.scope.stop_access(&self.path);
        }
    }
}

/// Abstraction over reading file bytes, for testability.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
}

/// Default reader using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileReader;

#[async_trait]
impl FileReader for TokioFileReader {
    async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// Reads a file while holding a security-scoped grant.
///
/// # Errors
///
/// Returns [`Error::Read`] if the file cannot be read. The grant is released
/// before this returns in every case.
pub async fn read_scoped(
    scope: &dyn SecurityScope,
    reader: &dyn FileReader,
    path: &Path,
) -> Result<Vec<u8>> {
    let access = ScopedAccess::acquire(scope, path);
    let bytes = reader.read(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(
        "Read {} bytes from {} (security scoped: {})",
        bytes.len(),
        path.display(),
        access.started()
    );
    Ok(bytes)
}
