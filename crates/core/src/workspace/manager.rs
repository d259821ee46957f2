//! Per-job directory allocation under the three working roots.

use std::path::{Path, PathBuf};

use sysinfo::Disks;
use thiserror::Error;
use tracing::debug;

use super::config::StorageConfig;

/// Errors raised by workspace allocation and reclamation.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The filesystem hosting the root is below the configured free-space floor.
    #[error("insufficient disk space under {root}: {available} bytes available, {required} required")]
    ResourceExhausted {
        root: PathBuf,
        available: u64,
        required: u64,
    },

    /// I/O error while mutating the tree.
    #[error("workspace I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which of the three roots a workspace lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceKind {
    Uploads,
    Segments,
    Downloads,
}

impl WorkspaceKind {
    /// All kinds, in reclamation order.
    pub const ALL: [WorkspaceKind; 3] = [
        WorkspaceKind::Downloads,
        WorkspaceKind::Uploads,
        WorkspaceKind::Segments,
    ];
}

/// Owns the three working directories and hands out isolated per-job subtrees.
///
/// Allocation and release are scoped to a job identifier, so concurrent calls
/// for different jobs never touch the same tree. No ledger or network access.
pub struct WorkspaceManager {
    config: StorageConfig,
}

impl WorkspaceManager {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn root(&self, kind: WorkspaceKind) -> &Path {
        match kind {
            WorkspaceKind::Uploads => &self.config.uploads_dir,
            WorkspaceKind::Segments => &self.config.segments_dir,
            WorkspaceKind::Downloads => &self.config.downloads_dir,
        }
    }

    /// Path of a job's workspace under the given root. Does not create it.
    pub fn path_of(&self, job_id: &str, kind: WorkspaceKind) -> PathBuf {
        self.root(kind).join(job_id)
    }

    /// Create an isolated directory tree for the job under the given root.
    ///
    /// Fails with [`WorkspaceError::ResourceExhausted`] when the hosting
    /// filesystem is below the configured floor. Creating an already existing
    /// workspace is a no-op, so restart recovery can call this again.
    pub fn allocate(&self, job_id: &str, kind: WorkspaceKind) -> Result<PathBuf, WorkspaceError> {
        let root = self.root(kind);
        self.check_free_space(root)?;

        let path = self.path_of(job_id, kind);
        std::fs::create_dir_all(&path).map_err(|source| WorkspaceError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(job_id, path = %path.display(), "allocated workspace");
        Ok(path)
    }

    /// Recursively remove the job's subtree under every root.
    ///
    /// Idempotent: releasing an absent workspace is a no-op.
    pub fn release(&self, job_id: &str) -> Result<(), WorkspaceError> {
        for kind in WorkspaceKind::ALL {
            self.release_kind(job_id, kind)?;
        }
        Ok(())
    }

    /// Recursively remove the job's subtree under one root. Idempotent.
    pub fn release_kind(&self, job_id: &str, kind: WorkspaceKind) -> Result<(), WorkspaceError> {
        let path = self.path_of(job_id, kind);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(job_id, path = %path.display(), "released workspace");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Io { path, source }),
        }
    }

    fn check_free_space(&self, root: &Path) -> Result<(), WorkspaceError> {
        if self.config.min_free_bytes == 0 {
            return Ok(());
        }

        // Resolve the disk whose mount point is the deepest prefix of the
        // root. If no mount matches (e.g. in minimal containers) the check
        // is skipped rather than failing allocation.
        let target = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let disks = Disks::new_with_refreshed_list();
        let best = disks
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len());

        if let Some(disk) = best {
            let available = disk.available_space();
            if available < self.config.min_free_bytes {
                return Err(WorkspaceError::ResourceExhausted {
                    root: root.to_path_buf(),
                    available,
                    required: self.config.min_free_bytes,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp: &TempDir, min_free_bytes: u64) -> WorkspaceManager {
        WorkspaceManager::new(StorageConfig {
            uploads_dir: temp.path().join("uploads"),
            segments_dir: temp.path().join("segments"),
            downloads_dir: temp.path().join("downloads"),
            min_free_bytes,
        })
    }

    #[test]
    fn test_allocate_creates_isolated_tree() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, 0);

        let a = mgr.allocate("job-a", WorkspaceKind::Downloads).unwrap();
        let b = mgr.allocate("job-b", WorkspaceKind::Downloads).unwrap();

        assert!(a.is_dir());
        assert!(b.is_dir());
        assert_ne!(a, b);
        assert!(a.ends_with("job-a"));
    }

    #[test]
    fn test_allocate_is_repeatable() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, 0);

        let first = mgr.allocate("job-a", WorkspaceKind::Segments).unwrap();
        std::fs::write(first.join("part-00000.mp3"), b"data").unwrap();

        // Re-allocating after a restart must not wipe existing output.
        let second = mgr.allocate("job-a", WorkspaceKind::Segments).unwrap();
        assert_eq!(first, second);
        assert!(second.join("part-00000.mp3").exists());
    }

    #[test]
    fn test_release_removes_all_roots() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, 0);

        let dl = mgr.allocate("job-a", WorkspaceKind::Downloads).unwrap();
        let seg = mgr.allocate("job-a", WorkspaceKind::Segments).unwrap();
        std::fs::write(dl.join("source.mp4"), b"x").unwrap();

        mgr.release("job-a").unwrap();
        assert!(!dl.exists());
        assert!(!seg.exists());
    }

    #[test]
    fn test_release_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, 0);

        mgr.release("never-allocated").unwrap();
        mgr.allocate("job-a", WorkspaceKind::Downloads).unwrap();
        mgr.release("job-a").unwrap();
        mgr.release("job-a").unwrap();
    }

    #[test]
    fn test_release_kind_keeps_other_roots() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, 0);

        let dl = mgr.allocate("job-a", WorkspaceKind::Downloads).unwrap();
        let seg = mgr.allocate("job-a", WorkspaceKind::Segments).unwrap();

        mgr.release_kind("job-a", WorkspaceKind::Downloads).unwrap();
        assert!(!dl.exists());
        assert!(seg.exists());
    }

    #[test]
    fn test_resource_exhausted_when_floor_unreachable() {
        let temp = TempDir::new().unwrap();
        // No filesystem has u64::MAX bytes available.
        let mgr = manager(&temp, u64::MAX);

        // Roots must exist for the mount-point resolution to kick in.
        std::fs::create_dir_all(temp.path().join("downloads")).unwrap();

        let result = mgr.allocate("job-a", WorkspaceKind::Downloads);
        match result {
            Err(WorkspaceError::ResourceExhausted { required, .. }) => {
                assert_eq!(required, u64::MAX);
            }
            // Mount resolution can be unavailable in sandboxed test
            // environments, in which case the check is skipped.
            Ok(path) => assert!(path.is_dir()),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
