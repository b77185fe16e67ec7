//! Turning source text into a runnable [`Program`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::execute::{AbortHandle, Program, WasmProgram};

use super::store::{Component, ToolchainStore};

/// Compiles one source text for the execution host.
pub trait Toolchain: Send + Sync {
    /// Short name shown in logs.
    fn name(&self) -> &str;

    /// Compile `source`. Long-running work must stop when `abort` fires.
    fn compile(&self, source: &str, abort: &AbortHandle) -> Result<Box<dyn Program>>;
}

/// Source is a WebAssembly module in text format.
#[derive(Debug, Default, Clone, Copy)]
pub struct WatToolchain;

impl Toolchain for WatToolchain {
    fn name(&self) -> &str {
        "wat"
    }

    fn compile(&self, source: &str, _abort: &AbortHandle) -> Result<Box<dyn Program>> {
        Ok(Box::new(WasmProgram::compile(source.as_bytes())?))
    }
}

/// C++ compiled to `wasm32-wasi` by an external clang.
pub struct ClangToolchain {
    store: Arc<dyn ToolchainStore>,
    extra_flags: Vec<String>,
}

impl ClangToolchain {
    pub fn new(store: Arc<dyn ToolchainStore>) -> Self {
        Self {
            store,
            extra_flags: vec!["-O2".to_string()],
        }
    }

    /// Replace the optimization and warning flags passed to the compiler.
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    /// Build the compiler command line for one compilation.
    fn command_line(
        &self,
        linker: &Path,
        runtime_support: Option<&Path>,
        input: &Path,
        output: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "--target=wasm32-wasi".to_string(),
            format!("--ld-path={}", linker.display()),
        ];
        args.extend(self.extra_flags.iter().cloned());

        if let Some(dir) = runtime_support.filter(|p| p.is_dir()) {
            args.push(format!("--sysroot={}", dir.display()));
        }

        args.push("-o".to_string());
        args.push(output.display().to_string());
        args.push(input.display().to_string());

        // A runtime-support archive is linked after the program's objects.
        if let Some(archive) = runtime_support.filter(|p| !p.is_dir()) {
            args.push(archive.display().to_string());
        }
        args
    }

    fn runtime_support(&self) -> Option<PathBuf> {
        match self.store.resolve(Component::RuntimeSupport) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!("No runtime support: {}", e);
                None
            }
        }
    }
}

impl Toolchain for ClangToolchain {
    fn name(&self) -> &str {
        "clang"
    }

    fn compile(&self, source: &str, abort: &AbortHandle) -> Result<Box<dyn Program>> {
        let compiler = self.store.resolve(Component::Compiler)?;
        let linker = self.store.resolve(Component::Linker)?;
        let runtime_support = self.runtime_support();

        let work_dir = tempfile::Builder::new().prefix("tether-build-").tempdir()?;
        let input = work_dir.path().join("main.cpp");
        let output = work_dir.path().join("main.wasm");
        std::fs::write(&input, source)?;

        let args = self.command_line(&linker, runtime_support.as_deref(), &input, &output);
        tracing::debug!("Running {} {}", compiler.display(), args.join(" "));

        let mut child = Command::new(&compiler)
            .args(&args)
            .current_dir(work_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Toolchain(format!("Failed to run {}: {}", compiler.display(), e))
            })?;

        let pid = child.id();
        let _kill = abort.on_abort(move || {
            #[cfg(unix)]
            {
                // SIGKILL for immediate termination
                unsafe {
                    libc::kill(pid as i32, libc::SIGKILL);
                }
            }
        });

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            pipe.read_to_string(&mut stderr)?;
        }
        let status = child.wait()?;

        if abort.is_aborted() {
            return Err(Error::Aborted);
        }
        if !status.success() {
            return Err(Error::Compile {
                message: if stderr.trim().is_empty() {
                    format!("compiler exited with {}", status)
                } else {
                    stderr
                },
            });
        }
        if !stderr.is_empty() {
            tracing::debug!("Compiler warnings:\n{}", stderr);
        }

        let bytes = std::fs::read(&output)?;
        Ok(Box::new(WasmProgram::compile(&bytes)?))
    }
}
