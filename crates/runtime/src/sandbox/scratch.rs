//! Per-runner scratch space
//!
//! Each runner owns one temporary root that is removed when the runner is
//! dropped. Every run gets a fresh subdirectory named after its `RunId`, so no
//! two runs ever share files.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::types::{RunId, SandboxError};

/// Temporary root owned by a single runner
#[derive(Debug)]
pub struct ScratchSpace {
    root: TempDir,
}

impl ScratchSpace {
    pub fn new() -> Result<Self, SandboxError> {
        let root = tempfile::Builder::new()
            .prefix("crucible-")
            .tempdir()
            .map_err(|e| SandboxError::Scratch(format!("failed to create scratch root: {}", e)))?;
        tracing::debug!("Scratch root created at {}", root.path().display());
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Create the private directory for one run
    pub fn create_run_dir(&self, run_id: &RunId) -> Result<RunDir, SandboxError> {
        let path = self.root.path().join(format!("run-{}", run_id));
        fs::create_dir(&path).map_err(|e| {
            SandboxError::Scratch(format!("failed to create {}: {}", path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).map_err(|e| {
                SandboxError::Scratch(format!("failed to restrict {}: {}", path.display(), e))
            })?;
        }

        Ok(RunDir { path })
    }
}

/// Directory private to one run, removed when dropped
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
}

/// Files and bytes found under a run directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirUsage {
    pub files: u64,
    pub bytes: u64,
}

impl DirUsage {
    /// Usage added on top of `baseline`
    pub fn since(self, baseline: DirUsage) -> DirUsage {
        DirUsage {
            files: self.files.saturating_sub(baseline.files),
            bytes: self.bytes.saturating_sub(baseline.bytes),
        }
    }
}

impl RunDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file the host prepares for the run (code, policy, harness)
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, SandboxError> {
        let target = self.path.join(name);
        fs::write(&target, contents).map_err(|e| {
            SandboxError::Scratch(format!("failed to write {}: {}", target.display(), e))
        })?;
        Ok(target)
    }

    /// Walk the directory and total what is in it
    pub fn usage(&self) -> DirUsage {
        let mut usage = DirUsage::default();
        accumulate(&self.path, &mut usage);
        usage
    }
}

fn accumulate(dir: &Path, usage: &mut DirUsage) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            accumulate(&entry.path(), usage);
        } else {
            usage.files += 1;
            usage.bytes += meta.len();
        }
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}
