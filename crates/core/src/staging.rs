use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Scratch directory next to an install target. It becomes the target in a
/// single rename on [`StagingDir::commit`] and is removed if dropped first.
pub(crate) struct StagingDir {
    path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagingDir {
    /// Create `.<name>.partial` beside `target`, wiping any leftover from an
    /// earlier failed attempt.
    pub fn create(target: &Path) -> io::Result<Self> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "models".to_string());
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        let path = parent.join(format!(".{}.partial", name));

        if path.exists() {
            tracing::info!("Removing stale staging directory {:?}", path);
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;

        Ok(Self {
            path,
            target: target.to_path_buf(),
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(mut self) -> io::Result<PathBuf> {
        fs::rename(&self.path, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Discarded staging directory {:?}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove staging directory {:?}: {}", self.path, e),
        }
    }
}
