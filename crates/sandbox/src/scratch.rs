use std::path::{Path, PathBuf};

use crate::error::Result;

/// Per-call scratch directory staging the generated script file.
///
/// Exclusively owned by one execution. The tree is removed when the value
/// drops, so cleanup happens on every exit path — normal return, error, or
/// timeout — without any explicit call.
pub struct ScratchWorkspace {
    dir: tempfile::TempDir,
}

impl ScratchWorkspace {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("sandbox-").tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a staged file inside the workspace.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
