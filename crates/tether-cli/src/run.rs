//! Run command implementation for Tether CLI.
//!
//! Compiles and runs one source file. Standard input comes from one of:
//! - `--inputs FILE`: fixed lines, the program is never prompted
//! - `--script FILE`: scripted answers to each input request
//! - the terminal: every request shows a prompt and reads one line

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tether_core::{
    DoneStatus, FixedInputQueue, ForegroundController, PromptResponder, Responder, RunRequest,
    ScriptedResponder, SessionManager, SessionOutcome, TetherConfig,
};

use crate::colors;
use crate::console::{TerminalConsole, stdin_lines};
use crate::toolchain::{self, ToolchainKind};

/// Options of `tether run`.
pub struct RunOptions {
    pub source: PathBuf,
    pub inputs: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub toolchain: Option<ToolchainKind>,
    pub strip_ansi: bool,
    pub abort_grace_ms: Option<u64>,
}

/// Run a program and report how it ended.
pub async fn execute(options: RunOptions) -> anyhow::Result<DoneStatus> {
    let start = Instant::now();

    if !options.source.exists() {
        anyhow::bail!("Source file not found: {}", options.source.display());
    }
    let source = std::fs::read_to_string(&options.source)?;

    let mut config = TetherConfig::from_env()?;
    config.strip_ansi |= options.strip_ansi;
    if let Some(ms) = options.abort_grace_ms {
        config.abort_grace = Duration::from_millis(ms);
    }

    let kind = options
        .toolchain
        .unwrap_or_else(|| ToolchainKind::infer(&options.source));
    tracing::debug!("Using {:?} toolchain", kind);
    let toolchain = toolchain::build(kind, &config)?;
    let strip_ansi = config.strip_ansi;
    let manager = SessionManager::new(config, toolchain);

    let request = match &options.inputs {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            RunRequest::fixed(source, FixedInputQueue::from_text(&text))
        }
        None => RunRequest::interactive(source),
    };

    let outcome = match &options.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let responder = ScriptedResponder::new(FixedInputQueue::from_text(&text));
            drive(&manager, request, responder, strip_ansi).await?
        }
        None => {
            let responder = PromptResponder::new(stdin_lines());
            drive(&manager, request, responder, strip_ansi).await?
        }
    };

    let elapsed = start.elapsed().as_secs_f64();
    match outcome.status {
        DoneStatus::Ok => tracing::info!("Completed in {:.2}s", elapsed),
        DoneStatus::Error => eprintln!(
            "{} after {:.2}s",
            colors::paint(colors::RED, "Failed"),
            elapsed
        ),
        DoneStatus::Aborted => {}
    }

    Ok(outcome.status)
}

async fn drive<R: Responder>(
    manager: &SessionManager,
    request: RunRequest,
    responder: R,
    strip_ansi: bool,
) -> anyhow::Result<SessionOutcome> {
    let mut session = manager.start(request)?;
    let mut controller =
        ForegroundController::new(TerminalConsole, responder).with_strip_ansi(strip_ansi);

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    Ok(controller.drive(&mut session, ctrl_c).await?)
}
