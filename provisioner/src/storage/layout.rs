//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Name of the generated remote-state pointer
pub const BACKEND_FILE: &str = "backend.tf";

/// Where run artifacts live on disk
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Parent of every per-package working directory
    pub deployments_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(deployments_dir: impl Into<PathBuf>) -> Self {
        Self {
            deployments_dir: deployments_dir.into(),
        }
    }

    /// Working directory of the package's runs
    pub fn run_dir(&self, package_id: &str) -> Dir {
        Dir::new(self.deployments_dir.join(package_id))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("deployments")
    }
}

/// Generated merged-parameter file
pub fn inputs_file(dir: &Dir, package_id: &str) -> File {
    dir.file(&format!("{}_inputs.auto.tfvars.json", package_id))
}

/// Generated secrets file
pub fn secrets_file(dir: &Dir, package_id: &str) -> File {
    dir.file(&format!("{}_secrets.auto.tfvars.json", package_id))
}

/// Final filtered outputs
pub fn output_file(dir: &Dir, package_id: &str) -> File {
    dir.file(&format!("{}_output.json", package_id))
}

/// Remote-state pointer
pub fn backend_file(dir: &Dir) -> File {
    dir.file(BACKEND_FILE)
}
