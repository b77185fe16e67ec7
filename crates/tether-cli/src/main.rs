//! Tether CLI - run WebAssembly programs with an interactive stdin relay.

mod colors;
mod console;
mod fetch;
mod run;
mod serve;
mod toolchain;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tether_core::DoneStatus;

use crate::toolchain::ToolchainKind;

/// Exit code of a run aborted by Ctrl-C, as a shell reports SIGINT.
const EXIT_ABORTED: u8 = 130;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Run WebAssembly programs with an interactive stdin relay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a program in the foreground
    Run {
        /// Path to the source file (.wat or C++)
        source: PathBuf,

        /// Read all input from FILE instead of prompting
        #[arg(long, value_name = "FILE", conflicts_with = "script")]
        inputs: Option<PathBuf>,

        /// Answer each input request with the next line of FILE
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,

        /// Toolchain to compile with (inferred from the extension by default)
        #[arg(long, value_enum)]
        toolchain: Option<ToolchainKind>,

        /// Remove ANSI escape sequences from program output
        #[arg(long)]
        strip_ansi: bool,

        /// How long an abort waits for the program to stop
        #[arg(long, value_name = "MS")]
        abort_grace_ms: Option<u64>,
    },

    /// Serve sessions over JSON lines on stdin/stdout
    Serve {
        /// Toolchain every session compiles with
        #[arg(long, value_enum, default_value = "wat")]
        toolchain: ToolchainKind,
    },

    /// Download toolchain components into the cache
    Fetch {
        /// Components to fetch (compiler, linker, runtime-support); all by default
        components: Vec<String>,

        /// Download again even if cached
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format tether-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        match err.downcast_ref::<tether_core::Error>().and_then(|e| e.hint()) {
            Some(hint) => anyhow::anyhow!("{}\n  hint: {}", err, hint),
            None => err,
        }
    };

    match cli.command {
        Commands::Run {
            source,
            inputs,
            script,
            toolchain,
            strip_ansi,
            abort_grace_ms,
        } => {
            let options = run::RunOptions {
                source,
                inputs,
                script,
                toolchain,
                strip_ansi,
                abort_grace_ms,
            };
            let status = run::execute(options).await.map_err(format_error)?;
            return Ok(match status {
                DoneStatus::Ok => ExitCode::SUCCESS,
                DoneStatus::Error => ExitCode::FAILURE,
                DoneStatus::Aborted => ExitCode::from(EXIT_ABORTED),
            });
        }

        Commands::Serve { toolchain } => {
            serve::execute(toolchain).await.map_err(format_error)?;
        }

        Commands::Fetch { components, force } => {
            fetch::execute(&components, force).await.map_err(format_error)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
