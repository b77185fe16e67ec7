//! Runtime configuration.
//!
//! Values start from [`TetherConfig::default`], are overridden by `TETHER_*`
//! environment variables, and finally by command-line flags in the CLI.

use std::path::PathBuf;
use std::time::Duration;

use crate::channel::{DEFAULT_CHANNEL_CAPACITY, MAX_CHANNEL_CAPACITY};
use crate::error::{Error, Result};
use crate::paths::ToolchainDirs;

/// Default time a session waits for its host to stop after an abort.
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_millis(100);

/// Configuration shared by every session of a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TetherConfig {
    /// Size of the shared input region in bytes.
    pub channel_capacity: usize,
    /// How long an abort waits for the host thread before detaching it.
    pub abort_grace: Duration,
    /// Whether interactive mode may be used at all.
    pub interactive: bool,
    /// Base URL of the toolchain delivery service.
    pub toolchain_url: Option<String>,
    /// Where downloaded toolchain components are cached.
    pub cache_dir: PathBuf,
    /// Print a warning when a fixed-input program reads past its input.
    pub warn_on_exhausted_input: bool,
    /// Strip ANSI escape sequences from program output before display.
    pub strip_ansi: bool,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            abort_grace: DEFAULT_ABORT_GRACE,
            interactive: true,
            toolchain_url: None,
            cache_dir: ToolchainDirs::default_root(),
            warn_on_exhausted_input: true,
            strip_ansi: false,
        }
    }
}

impl TetherConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TETHER_*` overrides looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("TETHER_CHANNEL_CAPACITY") {
            let capacity = parse_number("TETHER_CHANNEL_CAPACITY", &value)?;
            if capacity == 0 || capacity > MAX_CHANNEL_CAPACITY as u64 {
                return Err(Error::Config(format!(
                    "TETHER_CHANNEL_CAPACITY must be between 1 and {}",
                    MAX_CHANNEL_CAPACITY
                )));
            }
            self.channel_capacity = capacity as usize;
        }

        if let Some(value) = lookup("TETHER_ABORT_GRACE_MS") {
            self.abort_grace = Duration::from_millis(parse_number("TETHER_ABORT_GRACE_MS", &value)?);
        }

        if lookup("TETHER_DISABLE_INTERACTIVE").is_some() {
            self.interactive = false;
        }

        if let Some(url) = lookup("TETHER_TOOLCHAIN_URL").filter(|url| !url.is_empty()) {
            self.toolchain_url = Some(url);
        }

        if let Some(dir) = lookup("TETHER_CACHE_DIR").filter(|dir| !dir.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }

        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
