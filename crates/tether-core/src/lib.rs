//! Core engine for Tether, a blocking-stdin bridge for sandboxed programs.
//!
//! This crate provides:
//! - A single-producer, single-consumer input handoff channel
//! - An input bridge that turns the channel into blocking standard input
//! - An execution host that compiles and runs programs on their own thread
//! - Session lifecycle management with bounded-time abort
//! - A foreground controller that renders output and answers input requests
//! - A JSON-lines protocol for out-of-process front ends

pub mod bridge;
pub mod channel;
pub mod compile;
pub mod config;
pub mod controller;
pub mod error;
pub mod execute;
pub mod host;
pub mod ipc;
pub mod paths;
pub mod session;

pub use bridge::{FixedInputQueue, FixedSource, InputBridge, InputSource, InteractiveSource};
pub use channel::{ChannelCloser, InputConsumer, InputProducer, Payload, SharedChannel};
pub use compile::{
    ClangToolchain, Component, HttpToolchainStore, LocalToolchainStore, Toolchain,
    ToolchainStore, WatToolchain,
};
pub use config::TetherConfig;
pub use controller::{
    Console, ForegroundController, LineSource, OutputAccumulator, PromptResponder, Reply,
    Responder, ScriptedResponder,
};
pub use error::{ChannelError, Error, Result};
pub use execute::{AbortHandle, DoneStatus, FnProgram, Program, ProgramIo, WasmProgram};
pub use host::ExecutionHost;
pub use ipc::protocol;
pub use paths::ToolchainDirs;
pub use session::{
    Capabilities, InputMode, RunRequest, Session, SessionEvent, SessionId, SessionManager,
    SessionOutcome, SessionState,
};
