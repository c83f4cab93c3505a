//! Bundle - on-disk working area for one task
//!
//! A bundle spans two storage locations: a persistent path under the root
//! (`<root>/<namespace>/<id>`) holding the task's filesystem view and
//! metadata, and a transient work directory under the state root
//! (`<state>/<namespace>/<id>`) for shim scratch space. The work directory is
//! only ever discovered through the `work` symlink inside the persistent
//! path, never duplicated in stored state.
//!
//! Creation is atomic from an observer's point of view: either both
//! locations come up fully initialized or a failed attempt removes
//! everything it created before returning.

use keel_foundation::{Context, Error, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Raw execution spec file inside the bundle
const CONFIG_FILENAME: &str = "config";

/// Symlink from the persistent path to the work directory
const WORK_LINK: &str = "work";

/// Root filesystem subdirectory
const ROOTFS_DIR: &str = "rootfs";

/// Directory mode: owner full, group/other traverse only
const DIR_MODE: u32 = 0o711;

/// On-disk working area for one task
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Task identifier, unique within a namespace
    pub id: String,

    /// Persistent path: `<root>/<namespace>/<id>`
    pub path: PathBuf,
}

impl Bundle {
    /// Create a new bundle on disk
    ///
    /// A pre-existing directory at either location is a duplicate-identifier
    /// conflict. Any failure removes both leaf directories before returning,
    /// so no partially-initialized bundle is ever observable.
    pub async fn new(
        ctx: &Context,
        root: impl AsRef<Path>,
        state: impl AsRef<Path>,
        id: impl Into<String>,
        spec: &[u8],
    ) -> Result<Bundle> {
        let ns = ctx.namespace_required()?;
        let id = id.into();
        let path = root.as_ref().join(ns).join(&id);
        let work = state.as_ref().join(ns).join(&id);

        match populate(&path, &work, &id, spec).await {
            Ok(()) => Ok(Bundle { id, path }),
            Err(err) => {
                // rollback: a failed create must leave no residue
                for dir in [&path, &work] {
                    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(dir = %dir.display(), error = %e, "bundle rollback failed");
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Load an existing bundle
    ///
    /// Pure path computation; bundle identity is fully reconstructible from
    /// (root, namespace, id), so this never touches disk.
    pub fn load(ctx: &Context, root: impl AsRef<Path>, id: impl Into<String>) -> Result<Bundle> {
        let ns = ctx.namespace_required()?;
        let id = id.into();
        let path = root.as_ref().join(ns).join(&id);
        Ok(Bundle { id, path })
    }

    /// Resolve the transient work directory through the `work` symlink
    pub async fn work_dir(&self) -> Result<PathBuf> {
        Ok(tokio::fs::read_link(self.path.join(WORK_LINK)).await?)
    }

    /// Delete the bundle from both storage locations
    ///
    /// Both removals are attempted unconditionally. A failed persistent-path
    /// removal is reported even when the work removal succeeded; only when
    /// both attempts fail are the two errors combined into one.
    pub async fn delete(&self) -> Result<()> {
        let work = self.work_dir().await?;
        let path_res = tokio::fs::remove_dir_all(&self.path).await;
        let work_res = tokio::fs::remove_dir_all(&work).await;
        match (path_res, work_res) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(work_err)) => Err(work_err.into()),
            (Err(path_err), Ok(())) => Err(path_err.into()),
            (Err(path_err), Err(work_err)) => Err(Error::BundleDelete { path_err, work_err }),
        }
    }
}

/// Build out both directory trees; caller rolls back on error
async fn populate(path: &Path, work: &Path, id: &str, spec: &[u8]) -> Result<()> {
    let mut parents = tokio::fs::DirBuilder::new();
    parents.recursive(true);
    #[cfg(unix)]
    parents.mode(DIR_MODE);

    let mut leaf = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    leaf.mode(DIR_MODE);

    // create base directories
    for dir in [path, work] {
        if let Some(parent) = dir.parent() {
            parents.create(parent).await?;
        }
    }
    for dir in [path, work] {
        leaf.create(dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                Error::Conflict(format!("bundle {} already exists", id))
            } else {
                e.into()
            }
        })?;
    }

    leaf.create(path.join(ROOTFS_DIR)).await?;

    #[cfg(unix)]
    tokio::fs::symlink(work, path.join(WORK_LINK)).await?;

    // spec bytes are opaque; written verbatim
    tokio::fs::write(path.join(CONFIG_FILENAME), spec).await?;
    Ok(())
}
