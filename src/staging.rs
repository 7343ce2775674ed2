//! Per-call local staging directories
//!
//! Downloads and previews materialize remote files locally before handing them
//! to the caller. Every call gets its own `<root>/<kind>_<uuid>` directory,
//! removed when the [`StagingArea`] is dropped.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default staging root under the system temp directory
pub fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join("aeroftp-filemanager")
}

#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
}

impl StagingArea {
    /// Create a fresh, empty staging directory below `root`
    pub fn create(root: &Path, kind: &str) -> std::io::Result<Self> {
        let path = root.join(format!("{}_{}", kind, Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        debug!("Created staging area {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Local path for a `/`-separated relative name, creating parent folders
    pub fn file_path(&self, relative: &str) -> std::io::Result<PathBuf> {
        let mut target = self.path.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty() && *s != "..") {
            target.push(segment);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(target)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove staging area {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_areas_are_unique_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let first = StagingArea::create(root.path(), "download").unwrap();
        let second = StagingArea::create(root.path(), "download").unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("download_"));

        let kept = first.path().to_path_buf();
        let file = first.file_path("a/b/c.txt").unwrap();
        std::fs::write(&file, b"x").unwrap();
        assert!(file.starts_with(&kept));

        drop(first);
        assert!(!kept.exists());
        assert!(second.path().exists());
    }

    #[test]
    fn test_file_path_cannot_escape() {
        let root = tempfile::tempdir().unwrap();
        let area = StagingArea::create(root.path(), "image").unwrap();
        let path = area.file_path("../../etc/passwd").unwrap();
        assert!(path.starts_with(area.path()));
    }
}
