//! Transactional patching of a single source file.
//!
//! A [`PatchSession`] snapshots a file when opened, stages replacement content
//! with an atomic temp-file-and-rename write, and puts the snapshot back on
//! [`PatchSession::restore`]. Dropping a session that is still staged restores
//! it as well, so early returns and panics cannot leave a patched file behind.

use sha2::{Digest, Sha256};
use std::fs::Permissions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stage patched content into {}: {source}", path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The source tree could not be put back; nothing after this is trustworthy.
    #[error("failed to restore original content of {}: {reason}", path.display())]
    Restore { path: PathBuf, reason: String },
}

impl PatchError {
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, PatchError::Restore { .. })
    }
}

/// SHA256 of the content, hex encoded
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Write `content` to `path` so readers only ever see the old or the new file.
///
/// The replacement gets `permissions`; a fresh temp file would otherwise be 0600.
fn atomic_write(path: &Path, content: &str, permissions: &Permissions) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".funcmut-write-")
        .tempfile_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().set_permissions(permissions.clone())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Exclusive, always-restored modification of one file.
#[derive(Debug)]
pub struct PatchSession {
    path: PathBuf,
    original: String,
    original_hash: String,
    permissions: Permissions,
    staged: bool,
}

impl PatchSession {
    /// Snapshot `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PatchError> {
        let path = path.into();
        let original = std::fs::read_to_string(&path).map_err(|source| PatchError::Read {
            path: path.clone(),
            source,
        })?;
        let permissions = std::fs::metadata(&path)
            .map_err(|source| PatchError::Read {
                path: path.clone(),
                source,
            })?
            .permissions();
        let original_hash = compute_hash(original.as_bytes());

        Ok(Self {
            path,
            original,
            original_hash,
            permissions,
            staged: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The snapshot taken by [`PatchSession::open`].
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_staged(&self) -> bool {
        self.staged
    }

    /// Atomically replace the file with `content`.
    pub fn stage(&mut self, content: &str) -> Result<(), PatchError> {
        // Mark first: a failed rename leaves the original in place, and restoring
        // an unchanged file is harmless.
        self.staged = true;
        atomic_write(&self.path, content, &self.permissions).map_err(|source| {
            PatchError::Stage {
                path: self.path.clone(),
                source,
            }
        })?;
        tracing::debug!("Staged patched content into {}", self.path.display());
        Ok(())
    }

    /// Put the snapshot back and verify it byte-for-byte.
    pub fn restore(&mut self) -> Result<(), PatchError> {
        let restore_err = |reason: String| PatchError::Restore {
            path: self.path.clone(),
            reason,
        };

        atomic_write(&self.path, &self.original, &self.permissions)
            .map_err(|e| restore_err(e.to_string()))?;

        let on_disk = std::fs::read(&self.path).map_err(|e| restore_err(e.to_string()))?;
        if compute_hash(&on_disk) != self.original_hash {
            return Err(restore_err(
                "content on disk does not match the snapshot".to_string(),
            ));
        }

        self.staged = false;
        tracing::debug!("Restored original content of {}", self.path.display());
        Ok(())
    }
}

impl Drop for PatchSession {
    fn drop(&mut self) {
        if !self.is_staged() {
            return;
        }
        if let Err(e) = self.restore() {
            tracing::error!(
                "CRITICAL: source tree left patched, {} could not be restored: {}",
                self.path.display(),
                e
            );
        }
    }
}
