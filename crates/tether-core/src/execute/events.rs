//! Events flowing from the execution host to the foreground.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneStatus {
    /// The program ran to completion with exit status 0.
    Ok,
    /// Build failure, trap, or non-zero exit.
    Error,
    /// The run was cancelled from the foreground.
    Aborted,
}

/// Message emitted by the execution host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Compilation succeeded and the program is about to run.
    Started,
    /// Program standard output.
    Stdout(String),
    /// Program standard error (also carries build diagnostics).
    Stderr(String),
    /// The program is blocked until the foreground supplies input.
    RequestInput,
    /// The run is over.
    Done {
        status: DoneStatus,
        diagnostic: Option<String>,
    },
}

/// Sending half of the host event stream.
///
/// Once sealed (on abort) every event is discarded, so nothing the host
/// emits afterwards reaches the foreground.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<HostEvent>,
    sealed: Arc<AtomicBool>,
}

impl EventSink {
    /// Create a sink and the receiver the foreground reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                sealed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Stop delivering events.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    /// A handle that can only seal this sink.
    ///
    /// It does not keep the event stream open: once every sink is gone the
    /// receiver sees the end of the stream even if a seal handle survives.
    pub fn sealer(&self) -> SinkSeal {
        SinkSeal {
            sealed: Arc::clone(&self.sealed),
        }
    }

    /// Whether the sink has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Deliver an event. Returns `false` if it was discarded.
    pub fn emit(&self, event: HostEvent) -> bool {
        if self.is_sealed() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn stdout(&self, text: impl Into<String>) -> bool {
        self.emit(HostEvent::Stdout(text.into()))
    }

    pub fn stderr(&self, text: impl Into<String>) -> bool {
        self.emit(HostEvent::Stderr(text.into()))
    }

    pub fn done(&self, status: DoneStatus, diagnostic: Option<String>) -> bool {
        self.emit(HostEvent::Done { status, diagnostic })
    }
}

/// Seal-only handle to an [`EventSink`], used from abort hooks.
#[derive(Clone)]
pub struct SinkSeal {
    sealed: Arc<AtomicBool>,
}

impl SinkSeal {
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }
}
