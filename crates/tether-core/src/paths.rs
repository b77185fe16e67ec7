//! Toolchain cache directory management.
//!
//! Downloaded components are cached under a single root shared by every
//! session and by `tether fetch`:
//!
//! ```text
//! ~/.cache/tether/toolchain/
//! ├── clang              # compiler
//! ├── wasm-ld            # linker
//! ├── runtime-support    # sysroot archive or directory
//! └── partial/           # downloads in progress
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::compile::Component;
use crate::error::Result;

/// Directory layout of the toolchain cache.
#[derive(Debug, Clone)]
pub struct ToolchainDirs {
    /// The cache root.
    pub root: PathBuf,

    /// Staging area for downloads, on the same filesystem as `root` so that
    /// finished files can be renamed into place.
    pub partial_dir: PathBuf,
}

impl ToolchainDirs {
    /// Default cache root, `<user cache dir>/tether/toolchain`.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tether")
            .join("toolchain")
    }

    /// Create the directory structure under `root`.
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub fn create(root: &Path) -> Result<Self> {
        let partial_dir = root.join("partial");
        fs::create_dir_all(&partial_dir)?;

        Ok(Self {
            root: root.to_path_buf(),
            partial_dir,
        })
    }

    /// Where a component is cached once downloaded.
    pub fn component_path(&self, component: Component) -> PathBuf {
        self.root.join(component.file_name())
    }

    /// Whether a component is already cached.
    pub fn is_cached(&self, component: Component) -> bool {
        self.component_path(component).exists()
    }
}
