//! Program execution for Tether sessions.
//!
//! # Architecture
//!
//! ```text
//! ExecutionHost thread
//!     │
//!     └── Box<dyn Program>
//!             │
//!             ├── WasmProgram ── wasmtime Store<WasiState>
//!             │       │
//!             │       ├── fd_read  ──► InputBridge ──► InputSource
//!             │       └── fd_write ──► OutputStream ──► EventSink ──► foreground
//!             │
//!             └── FnProgram (native closure, same ProgramIo)
//! ```
//!
//! Cancellation goes through [`AbortHandle`]: aborting seals the event sink,
//! closes the input channel, bumps the wasm engine epoch and kills a running
//! compiler.
//!
//! # Module Structure
//!
//! - `context` - Abort handle and hook registrations
//! - `events` - Host events and the sink that delivers them
//! - `program` - Program trait and standard streams
//! - `wasm` - wasmtime-backed programs
//! - `wasi` - The `wasi_snapshot_preview1` functions programs may import

mod context;
mod events;
mod program;
mod wasi;
mod wasm;

pub use context::{AbortHandle, AbortRegistration};
pub use events::{DoneStatus, EventSink, HostEvent, SinkSeal};
pub use program::{FnProgram, OutputStream, Program, ProgramIo, StreamKind};
pub use wasi::ProcExit;
pub use wasm::WasmProgram;
