//! Toolchain selection for CLI commands.

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use tether_core::{
    ClangToolchain, HttpToolchainStore, LocalToolchainStore, TetherConfig, Toolchain,
    ToolchainDirs, ToolchainStore, WatToolchain,
};

/// Which toolchain compiles the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolchainKind {
    /// WebAssembly text format, compiled in-process
    Wat,
    /// C++ compiled with clang for wasm32-wasi
    Clang,
}

impl ToolchainKind {
    /// Guess from the source file extension.
    pub fn infer(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("wat" | "wast") => Self::Wat,
            _ => Self::Clang,
        }
    }
}

/// Component store the clang toolchain resolves its tools through.
pub fn store(config: &TetherConfig) -> anyhow::Result<Arc<dyn ToolchainStore>> {
    Ok(match &config.toolchain_url {
        Some(url) => {
            let dirs = ToolchainDirs::create(&config.cache_dir)?;
            Arc::new(HttpToolchainStore::new(url.clone(), dirs))
        }
        None => Arc::new(LocalToolchainStore::new()),
    })
}

/// Build the toolchain for `kind`.
pub fn build(kind: ToolchainKind, config: &TetherConfig) -> anyhow::Result<Arc<dyn Toolchain>> {
    Ok(match kind {
        ToolchainKind::Wat => Arc::new(WatToolchain),
        ToolchainKind::Clang => Arc::new(ClangToolchain::new(store(config)?)),
    })
}
