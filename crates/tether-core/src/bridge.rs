//! Blocking standard-input emulation for the execution host.
//!
//! [`InputBridge`] is what the running program reads from. It keeps the bytes
//! of the last delivered chunk and, once they are used up, asks its
//! [`InputSource`] for more. How the next chunk is obtained is the only
//! difference between the two input policies:
//!
//! - [`FixedSource`] drains a pre-supplied [`FixedInputQueue`] and never
//!   prompts.
//! - [`InteractiveSource`] arms a request on the shared channel, tells the
//!   foreground, and parks until the foreground answers.
//!
//! End of input is sticky: once a source reports it, every later read returns
//! zero without consulting the source again.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};

use crate::channel::{InputConsumer, Payload};
use crate::execute::{EventSink, HostEvent};

/// Message written to stderr the first time a program reads past the end of
/// its fixed input.
pub const EXHAUSTED_INPUT_WARNING: &str = "EOFError: insufficient input provided\n";

/// Strategy for obtaining the next chunk of input.
pub trait InputSource: Send {
    /// Block until the next chunk is available. `None` means end of input.
    fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// Ordered lines supplied before the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedInputQueue {
    lines: VecDeque<String>,
}

impl FixedInputQueue {
    /// Split raw text into lines.
    ///
    /// Carriage returns are dropped and a single trailing empty line (from a
    /// final newline) is ignored.
    pub fn from_text(text: &str) -> Self {
        let cleaned = text.replace('\r', "");
        let mut lines: VecDeque<String> = cleaned.split('\n').map(str::to_string).collect();
        if lines.back().is_some_and(|line| line.is_empty()) {
            lines.pop_back();
        }
        Self { lines }
    }

    /// Build a queue from already split lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Take the next line, without its terminator.
    pub fn pop_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Fixed-mode input: lines are served in order, each with a `\n` terminator.
pub struct FixedSource {
    queue: FixedInputQueue,
    warn: Option<EventSink>,
}

impl FixedSource {
    pub fn new(queue: FixedInputQueue) -> Self {
        Self { queue, warn: None }
    }

    /// Report the first read past the end of the queue on stderr.
    pub fn with_exhaustion_warning(mut self, sink: EventSink) -> Self {
        self.warn = Some(sink);
        self
    }
}

impl InputSource for FixedSource {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        match self.queue.pop_line() {
            Some(mut line) => {
                line.push('\n');
                Some(line.into_bytes())
            }
            None => {
                if let Some(sink) = self.warn.take() {
                    sink.stderr(EXHAUSTED_INPUT_WARNING);
                }
                None
            }
        }
    }
}

/// Interactive-mode input: every chunk is one request/response exchange on
/// the shared channel.
pub struct InteractiveSource {
    consumer: InputConsumer,
    sink: EventSink,
}

impl InteractiveSource {
    pub fn new(consumer: InputConsumer, sink: EventSink) -> Self {
        Self { consumer, sink }
    }
}

impl InputSource for InteractiveSource {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.consumer.is_closed() {
            return None;
        }

        // Arm before announcing, so an answer can never arrive unrequested.
        let pending = self.consumer.request();

        if !self.sink.emit(HostEvent::RequestInput) {
            tracing::debug!("Input request dropped; foreground is gone");
            return None;
        }

        match pending.wait() {
            Payload::Data(bytes) => Some(bytes),
            Payload::EndOfInput => None,
        }
    }
}

/// Byte-oriented blocking reader over an [`InputSource`].
pub struct InputBridge {
    source: Box<dyn InputSource>,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl InputBridge {
    pub fn new(source: impl InputSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn InputSource>) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    /// Bytes delivered but not yet read.
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Whether the source reported end of input and the buffer is drained.
    pub fn is_eof(&self) -> bool {
        self.eof && self.buffered() == 0
    }

    /// Copy already buffered bytes without ever blocking.
    pub fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let n = self.buffered().min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

impl Read for InputBridge {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for InputBridge {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.buffer.len() && !self.eof {
            match self.source.next_chunk() {
                Some(chunk) if !chunk.is_empty() => {
                    self.buffer = chunk;
                    self.pos = 0;
                }
                _ => {
                    self.buffer.clear();
                    self.pos = 0;
                    self.eof = true;
                }
            }
        }
        Ok(&self.buffer[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buffer.len());
    }
}
