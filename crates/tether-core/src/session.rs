//! Session lifecycle: one run of one program.
//!
//! [`SessionManager::start`] allocates the input channel, wires the abort
//! hooks and spawns the execution host. The returned [`Session`] is the
//! foreground's handle: it yields output events, carries input to the host
//! and tears the run down.
//!
//! ```text
//! Idle ─► Compiling ─► Running ◄──► AwaitingInput
//!             │           │               │
//!             ▼           ▼               ▼
//!           Failed    Completed / Failed / Aborted
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bridge::{FixedInputQueue, FixedSource, InputSource, InteractiveSource};
use crate::channel::{InputProducer, Payload, SharedChannel};
use crate::compile::Toolchain;
use crate::config::TetherConfig;
use crate::error::{ChannelError, Error, Result};
use crate::execute::{AbortHandle, DoneStatus, EventSink, HostEvent};
use crate::host::{ExecutionHost, HostRequest, HostThread};

/// Identifier of a session, unique within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a running program's standard input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Lines supplied up front; never prompts.
    Fixed,
    /// Each read the buffer cannot satisfy asks the foreground.
    #[default]
    Interactive,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Compiling,
    Running,
    AwaitingInput,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    /// Whether the run is over.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    fn from_status(status: DoneStatus) -> Self {
        match status {
            DoneStatus::Ok => Self::Completed,
            DoneStatus::Error => Self::Failed,
            DoneStatus::Aborted => Self::Aborted,
        }
    }
}

/// Event delivered to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Stdout(String),
    Stderr(String),
    /// The program is waiting for [`Session::submit_input`] or
    /// [`Session::end_input`].
    RequestInput,
    Done {
        status: DoneStatus,
        diagnostic: Option<String>,
    },
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub status: DoneStatus,
    pub diagnostic: Option<String>,
}

impl SessionOutcome {
    fn aborted() -> Self {
        Self {
            status: DoneStatus::Aborted,
            diagnostic: None,
        }
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub source: String,
    pub mode: InputMode,
    /// Input lines for [`InputMode::Fixed`]. Ignored in interactive mode.
    pub fixed_input: Option<FixedInputQueue>,
}

impl RunRequest {
    pub fn interactive(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: InputMode::Interactive,
            fixed_input: None,
        }
    }

    pub fn fixed(source: impl Into<String>, input: FixedInputQueue) -> Self {
        Self {
            source: source.into(),
            mode: InputMode::Fixed,
            fixed_input: Some(input),
        }
    }
}

/// How long the capability probe waits for its thread to park.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// What this process can do, determined once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// A thread can park on the input channel and be woken from another.
    pub blocking_wait: bool,
}

impl Capabilities {
    /// Park a thread on a tiny channel and wake it by closing the channel.
    pub fn probe() -> Self {
        let blocking_wait = match SharedChannel::allocate(1) {
            Ok((producer, mut consumer)) => {
                match thread::Builder::new()
                    .name("tether-probe".to_string())
                    .spawn(move || consumer.consume())
                {
                    Ok(waiter) => {
                        // Close only once the waiter is parked, so the wake-up is tested.
                        let deadline = Instant::now() + PROBE_TIMEOUT;
                        while !producer.is_request_pending() && Instant::now() < deadline {
                            thread::sleep(Duration::from_millis(1));
                        }
                        let parked = producer.is_request_pending();
                        producer.close();
                        let woken = matches!(waiter.join(), Ok(Payload::EndOfInput));
                        parked && woken
                    }
                    Err(e) => {
                        tracing::debug!("Probe thread failed to start: {}", e);
                        false
                    }
                }
            }
            Err(e) => {
                tracing::debug!("Probe channel unavailable: {}", e);
                false
            }
        };

        tracing::debug!("Capabilities: blocking_wait={}", blocking_wait);
        Self { blocking_wait }
    }

    /// Capabilities with interactive input turned off.
    pub fn disabled() -> Self {
        Self {
            blocking_wait: false,
        }
    }
}

/// Starts sessions and keeps at most one of them live.
pub struct SessionManager {
    config: TetherConfig,
    toolchain: Arc<dyn Toolchain>,
    capabilities: Capabilities,
    next_id: AtomicU64,
    current: Mutex<Option<(SessionId, AbortHandle)>>,
}

impl SessionManager {
    /// Create a manager, probing for interactive support unless disabled.
    pub fn new(config: TetherConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let capabilities = if config.interactive {
            Capabilities::probe()
        } else {
            Capabilities::disabled()
        };
        Self::with_capabilities(config, toolchain, capabilities)
    }

    pub fn with_capabilities(
        config: TetherConfig,
        toolchain: Arc<dyn Toolchain>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            config,
            toolchain,
            capabilities,
            next_id: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Start a run, aborting the previous one if it is still going.
    ///
    /// # Errors
    /// - `Error::Environment` if interactive input is requested but not
    ///   available.
    /// - `Error::Resource` if the input channel or host thread cannot be
    ///   created.
    pub fn start(&self, request: RunRequest) -> Result<Session> {
        if request.mode == InputMode::Interactive && !self.capabilities.blocking_wait {
            return Err(Error::Environment(
                "interactive input is not supported here: blocking wait/notify is unavailable"
                    .to_string(),
            ));
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((previous, abort)) = current.take() {
            if !abort.is_aborted() {
                tracing::debug!("Aborting session {} for a new run", previous);
                abort.abort();
            }
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sink, events) = EventSink::channel();
        let abort = AbortHandle::new();

        let (producer, input): (Option<InputProducer>, Box<dyn InputSource>) = match request.mode
        {
            InputMode::Fixed => {
                let mut source = FixedSource::new(request.fixed_input.unwrap_or_default());
                if self.config.warn_on_exhausted_input {
                    source = source.with_exhaustion_warning(sink.clone());
                }
                (None, Box::new(source))
            }
            InputMode::Interactive => {
                let (producer, consumer) = SharedChannel::allocate(self.config.channel_capacity)?;
                let closer = producer.closer();
                abort.on_abort(move || closer.close()).keep();
                (
                    Some(producer),
                    Box::new(InteractiveSource::new(consumer, sink.clone())),
                )
            }
        };

        // Registered last so it runs first: nothing the host emits while
        // unwinding reaches the foreground.
        let seal = sink.sealer();
        abort.on_abort(move || seal.seal()).keep();

        let host = ExecutionHost::spawn(HostRequest {
            label: id.as_u64().to_string(),
            source: request.source,
            input,
            sink,
            abort: abort.clone(),
            toolchain: self.toolchain.clone(),
        })?;

        *current = Some((id, abort.clone()));
        tracing::info!("Session {} started ({:?} input)", id, request.mode);

        Ok(Session {
            id,
            mode: request.mode,
            state: SessionState::Compiling,
            events,
            producer,
            abort,
            host: Some(host),
            grace: self.config.abort_grace,
            outcome: None,
        })
    }
}

/// Foreground handle of a running session.
pub struct Session {
    id: SessionId,
    mode: InputMode,
    state: SessionState,
    events: mpsc::UnboundedReceiver<HostEvent>,
    producer: Option<InputProducer>,
    abort: AbortHandle,
    host: Option<HostThread>,
    grace: Duration,
    outcome: Option<SessionOutcome>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// How the session ended, once it has.
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Handle that aborts this session from anywhere, without the grace wait.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Next event from the host. `None` once the session is over.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        while self.outcome.is_none() {
            let Some(event) = self.events.recv().await else {
                // The host is gone without reporting; only an abort does that.
                let outcome = if self.abort.is_aborted() {
                    SessionOutcome::aborted()
                } else {
                    SessionOutcome {
                        status: DoneStatus::Error,
                        diagnostic: Some("execution host exited unexpectedly".to_string()),
                    }
                };
                self.finish(outcome);
                return None;
            };

            match event {
                HostEvent::Started => self.transition(SessionState::Running),
                HostEvent::Stdout(text) => return Some(SessionEvent::Stdout(text)),
                HostEvent::Stderr(text) => return Some(SessionEvent::Stderr(text)),
                HostEvent::RequestInput => {
                    self.transition(SessionState::AwaitingInput);
                    return Some(SessionEvent::RequestInput);
                }
                HostEvent::Done { status, diagnostic } => {
                    self.finish(SessionOutcome {
                        status,
                        diagnostic: diagnostic.clone(),
                    });
                    self.join_host();
                    return Some(SessionEvent::Done { status, diagnostic });
                }
            }
        }
        None
    }

    /// Answer the pending input request with `data`.
    ///
    /// Only valid after [`Session::next_event`] has reported
    /// [`SessionEvent::RequestInput`]; otherwise fails with
    /// [`ChannelError::Unsolicited`].
    ///
    /// Returns the number of bytes delivered, which is less than `data.len()`
    /// if the input was longer than the channel.
    pub fn submit_input(&mut self, data: &[u8]) -> Result<usize> {
        let delivered = self.producer()?.publish(data)?;
        self.transition(SessionState::Running);
        Ok(delivered)
    }

    /// Answer the pending input request with end of input.
    pub fn end_input(&mut self) -> Result<()> {
        self.producer()?.end_of_input()?;
        self.transition(SessionState::Running);
        Ok(())
    }

    /// Stop the run and wait up to the grace period for the host to exit.
    ///
    /// Output the host produces after this call never reaches the
    /// foreground. A host that does not stop in time is detached.
    pub async fn abort(&mut self) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        tracing::info!("Aborting session {}", self.id);
        self.abort.abort();

        if let Some(host) = self.host.take() {
            match tokio::time::timeout(self.grace, host.exited).await {
                Ok(_) => {
                    if host.handle.is_finished() {
                        let _ = host.handle.join();
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        "Execution host of session {} did not stop within {:?}; detaching it",
                        self.id,
                        self.grace
                    );
                }
            }
        }

        let outcome = SessionOutcome::aborted();
        self.finish(outcome.clone());
        outcome
    }

    /// The producer, if the program is waiting for input right now.
    fn producer(&self) -> Result<&InputProducer> {
        match &self.producer {
            _ if self.state.is_terminal() => Err(ChannelError::Released.into()),
            Some(producer) if self.state == SessionState::AwaitingInput => Ok(producer),
            _ => Err(ChannelError::Unsolicited.into()),
        }
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state && !self.state.is_terminal() {
            tracing::debug!("Session {}: {:?} -> {:?}", self.id, self.state, state);
            self.state = state;
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        self.transition(SessionState::from_status(outcome.status));
        if let Some(producer) = self.producer.take() {
            producer.release();
        }
        tracing::info!("Session {} finished: {:?}", self.id, outcome.status);
        self.outcome = Some(outcome);
    }

    fn join_host(&mut self) {
        // `Done` is the host's last act; the thread is exiting.
        if let Some(host) = self.host.take() {
            if host.handle.is_finished() {
                let _ = host.handle.join();
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            tracing::debug!("Session {} dropped while running; aborting", self.id);
            self.abort.abort();
        }
    }
}
