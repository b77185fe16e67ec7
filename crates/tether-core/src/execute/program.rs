//! Executable programs and the standard streams they run against.

use std::io::{self, Write};

use crate::bridge::InputBridge;
use crate::error::Result;

use super::context::AbortHandle;
use super::events::EventSink;

/// Which output stream a write goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A compiled program ready to run on the execution host.
pub trait Program: Send {
    /// Run to completion, returning the exit status.
    fn run(self: Box<Self>, io: ProgramIo) -> Result<i32>;
}

/// Program backed by a Rust closure.
///
/// Used by embedders that run native code on the host, and by tests.
pub struct FnProgram<F>(F);

impl<F> FnProgram<F>
where
    F: FnOnce(&mut ProgramIo) -> Result<i32> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }

    pub fn boxed(f: F) -> Box<dyn Program> {
        Box::new(Self(f))
    }
}

impl<F> Program for FnProgram<F>
where
    F: FnOnce(&mut ProgramIo) -> Result<i32> + Send + 'static,
{
    fn run(self: Box<Self>, mut io: ProgramIo) -> Result<i32> {
        let status = (self.0)(&mut io);
        io.flush();
        status
    }
}

/// Standard streams and cancellation state of one run.
pub struct ProgramIo {
    stdin: InputBridge,
    stdout: OutputStream,
    stderr: OutputStream,
    abort: AbortHandle,
}

impl ProgramIo {
    pub fn new(stdin: InputBridge, sink: EventSink, abort: AbortHandle) -> Self {
        Self {
            stdin,
            stdout: OutputStream::new(sink.clone(), StreamKind::Stdout),
            stderr: OutputStream::new(sink, StreamKind::Stderr),
            abort,
        }
    }

    pub fn stdin(&mut self) -> &mut InputBridge {
        &mut self.stdin
    }

    pub fn stdout(&mut self) -> &mut OutputStream {
        &mut self.stdout
    }

    pub fn stderr(&mut self) -> &mut OutputStream {
        &mut self.stderr
    }

    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Write raw bytes to one of the output streams.
    pub fn write_stream(&mut self, kind: StreamKind, bytes: &[u8]) {
        match kind {
            StreamKind::Stdout => self.stdout.push(bytes),
            StreamKind::Stderr => self.stderr.push(bytes),
        }
    }

    /// Emit anything still held back by the output streams.
    pub fn flush(&mut self) {
        self.stdout.finish();
        self.stderr.finish();
    }
}

/// Output stream that turns program writes into host events.
///
/// Bytes are forwarded as text as soon as they form complete UTF-8
/// sequences; an incomplete trailing sequence is held until the next write.
pub struct OutputStream {
    sink: EventSink,
    kind: StreamKind,
    pending: Vec<u8>,
}

impl OutputStream {
    fn new(sink: EventSink, kind: StreamKind) -> Self {
        Self {
            sink,
            kind,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.pending.extend_from_slice(bytes);

        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // An invalid byte is emitted lossily right away; only a sequence
            // cut off at the end is held back.
            Err(e) if e.error_len().is_some() => self.pending.len(),
            Err(e) => e.valid_up_to(),
        };
        if complete == 0 {
            return;
        }

        let rest = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        self.send(text);
    }

    fn finish(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.send(text);
    }

    fn send(&self, text: String) {
        match self.kind {
            StreamKind::Stdout => self.sink.stdout(text),
            StreamKind::Stderr => self.sink.stderr(text),
        };
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.finish();
    }
}
