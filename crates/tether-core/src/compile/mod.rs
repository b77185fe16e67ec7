//! Compilation pipeline for Tether sessions.
//!
//! This module provides:
//! - Toolchains (source text → [`Program`](crate::execute::Program))
//! - Toolchain component delivery (download cache or locally installed tools)
//!
//! # Architecture
//!
//! ```text
//! source ──► WatToolchain ───────────────────────────────┐
//!                                                        ├──► WasmProgram
//! source ──► ClangToolchain ──► clang --target=wasm32-wasi ┘
//!                 │
//!                 └── ToolchainStore (compiler, linker, runtime-support)
//! ```

mod store;
mod toolchain;

pub use store::{Component, HttpToolchainStore, LocalToolchainStore, ToolchainStore};
pub use toolchain::{ClangToolchain, Toolchain, WatToolchain};
