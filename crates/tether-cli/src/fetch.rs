//! Fetch command implementation for Tether CLI.
//!
//! Downloads toolchain components into the local cache ahead of the first
//! compile, so `run` does not stall on the network.

use std::sync::Arc;

use tether_core::{Component, HttpToolchainStore, TetherConfig, ToolchainDirs};

use crate::colors;

/// Fetch `names` (all components when empty).
pub async fn execute(names: &[String], force: bool) -> anyhow::Result<()> {
    let components = if names.is_empty() {
        Component::ALL.to_vec()
    } else {
        names
            .iter()
            .map(|name| name.parse::<Component>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let config = TetherConfig::from_env()?;
    let Some(url) = config.toolchain_url.clone() else {
        anyhow::bail!(
            "No toolchain URL configured (set TETHER_TOOLCHAIN_URL to the component server)"
        );
    };

    let dirs = ToolchainDirs::create(&config.cache_dir)?;
    let store = Arc::new(HttpToolchainStore::new(url, dirs.clone()));

    eprintln!(
        "{} {} component(s) into {}",
        colors::paint(colors::BOLD, "Fetching"),
        components.len(),
        dirs.root.display()
    );

    for component in components {
        if dirs.is_cached(component) && !force {
            eprintln!(
                "  {} {} (cached)",
                colors::paint(colors::CYAN, "="),
                component
            );
            continue;
        }

        let store = Arc::clone(&store);
        let path = tokio::task::spawn_blocking(move || store.fetch(component)).await??;
        eprintln!(
            "  {} {} -> {}",
            colors::paint(colors::GREEN, "+"),
            component,
            path.display()
        );
    }

    Ok(())
}
