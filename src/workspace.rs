//! Working tree a program run operates on.
//!
//! An isolated workspace is a temporary copy of the source tree; the original
//! is never patched. Artifacts worth keeping (mutation reports) are copied back
//! explicitly before the copy is dropped.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug)]
pub enum Workspace {
    /// Operate on the source tree itself
    InPlace(PathBuf),
    /// Operate on a temporary copy, removed on drop
    Isolated { original: PathBuf, copy: TempDir },
}

fn copy_options(overwrite: bool) -> fs_extra::dir::CopyOptions {
    fs_extra::dir::CopyOptions {
        overwrite,
        skip_exist: false,
        buffer_size: 64 * 1024,
        copy_inside: true,
        content_only: true,
        depth: 0,
    }
}

impl Workspace {
    /// Set up the workspace for `source_root`.
    pub async fn prepare(source_root: &Path, isolate: bool) -> anyhow::Result<Self> {
        if !source_root.is_dir() {
            anyhow::bail!("Source root {} is not a directory", source_root.display());
        }
        let original = source_root.to_path_buf();
        if !isolate {
            return Ok(Workspace::InPlace(original));
        }

        tracing::info!("Copying {} to a temporary workspace", original.display());
        let from = original.clone();
        // fs_extra is synchronous
        let copy = tokio::task::spawn_blocking(move || -> anyhow::Result<TempDir> {
            let copy = TempDir::with_prefix("funcmut-")?;
            fs_extra::dir::copy(&from, copy.path(), &copy_options(false))
                .map_err(|e| anyhow::anyhow!("Failed to copy source tree: {}", e))?;
            Ok(copy)
        })
        .await??;
        tracing::info!("Workspace ready at {}", copy.path().display());

        Ok(Workspace::Isolated { original, copy })
    }

    /// Directory commands and patches operate in.
    pub fn root(&self) -> &Path {
        match self {
            Workspace::InPlace(path) => path,
            Workspace::Isolated { copy, .. } => copy.path(),
        }
    }

    /// The source tree the run was started for.
    pub fn original(&self) -> &Path {
        match self {
            Workspace::InPlace(path) => path,
            Workspace::Isolated { original, .. } => original,
        }
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, Workspace::Isolated { .. })
    }

    /// Copy `relative_dir` from the workspace back into the original tree.
    ///
    /// A no-op in place, or when the directory was never created.
    pub async fn copy_back(&self, relative_dir: &Path) -> anyhow::Result<()> {
        let Workspace::Isolated { original, copy } = self else {
            return Ok(());
        };
        let from = copy.path().join(relative_dir);
        if !from.is_dir() {
            return Ok(());
        }
        let to = original.join(relative_dir);

        tracing::debug!("Copying {} back to {}", from.display(), to.display());
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            std::fs::create_dir_all(&to)
                .with_context(|| format!("Failed to create {}", to.display()))?;
            fs_extra::dir::copy(&from, &to, &copy_options(true))
                .map_err(|e| anyhow::anyhow!("Failed to copy {} back: {}", from.display(), e))?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}
