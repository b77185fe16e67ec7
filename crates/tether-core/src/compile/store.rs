//! Toolchain component delivery.
//!
//! Components are fetched by logical name and never change once published,
//! so a downloaded file is cached forever.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::paths::ToolchainDirs;

/// Content types a delivery service is expected to serve components with.
const EXPECTED_CONTENT_TYPES: &[&str] = &["application/wasm", "application/octet-stream"];

/// A logical toolchain component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// The C/C++ compiler driver (`clang`).
    Compiler,
    /// The wasm linker (`wasm-ld`).
    Linker,
    /// Headers and libraries the compiled program links against.
    RuntimeSupport,
}

impl Component {
    pub const ALL: [Component; 3] = [Self::Compiler, Self::Linker, Self::RuntimeSupport];

    /// Canonical name, used both remotely and in the cache.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Compiler => "clang",
            Self::Linker => "wasm-ld",
            Self::RuntimeSupport => "runtime-support",
        }
    }

    /// Executable names to search for on `PATH`.
    fn search_names(self) -> &'static [&'static str] {
        match self {
            Self::Compiler => &["clang"],
            Self::Linker => &["wasm-ld", "wasm-lld", "lld"],
            Self::RuntimeSupport => &[],
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compiler" | "clang" => Ok(Self::Compiler),
            "linker" | "lld" | "wasm-ld" | "wasm-lld" => Ok(Self::Linker),
            "runtime-support" => Ok(Self::RuntimeSupport),
            other => Err(Error::Toolchain(format!("unknown toolchain component '{}'", other))),
        }
    }
}

/// Source of toolchain component files.
pub trait ToolchainStore: Send + Sync {
    /// Path to a usable copy of `component`, fetching it if needed.
    fn resolve(&self, component: Component) -> Result<PathBuf>;
}

/// Downloads components from `{base_url}/{name}` into an on-disk cache.
pub struct HttpToolchainStore {
    base_url: String,
    dirs: ToolchainDirs,
}

impl HttpToolchainStore {
    pub fn new(base_url: impl Into<String>, dirs: ToolchainDirs) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dirs,
        }
    }

    /// URL a component is served from.
    pub fn url_for(&self, component: Component) -> String {
        format!("{}/{}", self.base_url, component.file_name())
    }

    /// Download `component` into the cache, replacing nothing that exists.
    pub fn fetch(&self, component: Component) -> Result<PathBuf> {
        let url = self.url_for(component);
        tracing::info!("Downloading {} from: {}", component, url);

        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Toolchain(format!("Failed to create HTTP client: {}", e)))?;

        let response = client
            .get(&url)
            .send()
            .map_err(|e| Error::Toolchain(format!("Failed to download {}: {}", component, e)))?;

        if !response.status().is_success() {
            return Err(Error::Toolchain(format!(
                "Failed to download {}: HTTP {}",
                component,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !EXPECTED_CONTENT_TYPES
            .iter()
            .any(|expected| content_type.starts_with(expected))
        {
            tracing::warn!(
                "{} served with unexpected content type '{}'",
                component,
                content_type
            );
        }

        let bytes = response
            .bytes()
            .map_err(|e| Error::Toolchain(format!("Failed to read response: {}", e)))?;

        let mut staged = tempfile::NamedTempFile::new_in(&self.dirs.partial_dir)?;
        staged.write_all(&bytes)?;
        staged.flush()?;

        // Make executable on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o755))?;
        }

        let path = self.dirs.component_path(component);
        staged
            .persist(&path)
            .map_err(|e| Error::Io(e.error))?;

        tracing::info!("{} downloaded to: {}", component, path.display());
        Ok(path)
    }
}

impl ToolchainStore for HttpToolchainStore {
    fn resolve(&self, component: Component) -> Result<PathBuf> {
        let cached = self.dirs.component_path(component);
        if cached.exists() {
            tracing::debug!("Using cached {}: {}", component, cached.display());
            return Ok(cached);
        }
        self.fetch(component)
    }
}

/// Components already installed on this machine.
#[derive(Debug, Default, Clone)]
pub struct LocalToolchainStore {
    paths: HashMap<Component, PathBuf>,
}

impl LocalToolchainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit path for a component instead of searching `PATH`.
    pub fn with_path(mut self, component: Component, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(component, path.into());
        self
    }
}

impl ToolchainStore for LocalToolchainStore {
    fn resolve(&self, component: Component) -> Result<PathBuf> {
        if let Some(path) = self.paths.get(&component) {
            return Ok(path.clone());
        }

        component
            .search_names()
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| {
                Error::Toolchain(format!("{} not found; install it or set its path", component))
            })
    }
}
