//! The execution host: compile, instantiate and run on a dedicated thread.
//!
//! The host owns the consumer side of a session. It reports everything it
//! does through the session's [`EventSink`], always finishing with exactly
//! one `Done` event (unless the sink was sealed by an abort), and then fires
//! the `exited` signal the session waits on.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use crate::bridge::{InputBridge, InputSource};
use crate::compile::Toolchain;
use crate::error::{Error, Result};
use crate::execute::{AbortHandle, DoneStatus, EventSink, HostEvent, ProgramIo};

/// Everything a host needs for one run.
pub struct HostRequest {
    /// Used to name the host thread.
    pub label: String,
    pub source: String,
    pub input: Box<dyn InputSource>,
    pub sink: EventSink,
    pub abort: AbortHandle,
    pub toolchain: Arc<dyn Toolchain>,
}

/// A running host thread.
pub struct HostThread {
    pub handle: JoinHandle<()>,
    /// Resolves with the final status once the host is done.
    pub exited: oneshot::Receiver<DoneStatus>,
}

/// Spawns execution hosts.
pub struct ExecutionHost;

impl ExecutionHost {
    /// Start a host thread for `request`.
    pub fn spawn(request: HostRequest) -> Result<HostThread> {
        let (exited_tx, exited) = oneshot::channel();
        let name = format!("tether-host-{}", request.label);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let status = Self::run(request);
                let _ = exited_tx.send(status);
            })
            .map_err(|e| Error::Resource(format!("cannot spawn execution host: {}", e)))?;

        Ok(HostThread { handle, exited })
    }

    fn run(request: HostRequest) -> DoneStatus {
        let HostRequest {
            label,
            source,
            input,
            sink,
            abort,
            toolchain,
        } = request;

        tracing::debug!("Host {} compiling with {}", label, toolchain.name());
        let compiled =
            panic::catch_unwind(AssertUnwindSafe(|| toolchain.compile(&source, &abort)))
                .unwrap_or_else(|payload| {
                    Err(Error::Compile {
                        message: format!(
                            "{} toolchain panicked: {}",
                            toolchain.name(),
                            panic_message(payload.as_ref())
                        ),
                    })
                });
        let program = match compiled {
            Ok(program) => program,
            Err(e) => return Self::finish(&sink, &abort, Err(e)),
        };

        if abort.is_aborted() {
            return Self::finish(&sink, &abort, Err(Error::Aborted));
        }
        sink.emit(HostEvent::Started);

        let io = ProgramIo::new(InputBridge::from_boxed(input), sink.clone(), abort.clone());
        let result = panic::catch_unwind(AssertUnwindSafe(|| program.run(io)))
            .unwrap_or_else(|payload| {
                Err(Error::Runtime(format!(
                    "program panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        Self::finish(&sink, &abort, result)
    }

    /// Report the outcome of a run and return its status.
    fn finish(sink: &EventSink, abort: &AbortHandle, result: Result<i32>) -> DoneStatus {
        let (status, diagnostic) = match result {
            _ if abort.is_aborted() => (DoneStatus::Aborted, None),
            Ok(0) => (DoneStatus::Ok, None),
            Ok(code) => (
                DoneStatus::Error,
                Some(format!("program exited with status {}", code)),
            ),
            Err(Error::Aborted) => (DoneStatus::Aborted, None),
            Err(Error::Compile { message }) => (DoneStatus::Error, Some(message)),
            Err(e) => (DoneStatus::Error, Some(e.to_string())),
        };

        if let Some(diagnostic) = &diagnostic {
            let mut text = diagnostic.clone();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            sink.stderr(text);
        }

        tracing::debug!("Host finished with {:?}", status);
        sink.done(status, diagnostic);
        status
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{FixedInputQueue, FixedSource};
    use crate::execute::{FnProgram, Program};
    use std::io::Write;

    /// Toolchain that hands out a prepared closure program.
    struct ClosureToolchain<F>(std::sync::Mutex<Option<F>>);

    impl<F> Toolchain for ClosureToolchain<F>
    where
        F: FnOnce(&mut ProgramIo) -> Result<i32> + Send + 'static,
    {
        fn name(&self) -> &str {
            "closure"
        }

        fn compile(&self, _source: &str, _abort: &AbortHandle) -> Result<Box<dyn Program>> {
            let f = self.0.lock().unwrap().take().unwrap();
            Ok(FnProgram::boxed(f))
        }
    }

    fn run_closure<F>(f: F) -> Vec<HostEvent>
    where
        F: FnOnce(&mut ProgramIo) -> Result<i32> + Send + 'static,
    {
        let (sink, mut rx) = EventSink::channel();
        let thread = ExecutionHost::spawn(HostRequest {
            label: "test".into(),
            source: String::new(),
            input: Box::new(FixedSource::new(FixedInputQueue::default())),
            sink,
            abort: AbortHandle::new(),
            toolchain: Arc::new(ClosureToolchain(std::sync::Mutex::new(Some(f)))),
        })
        .unwrap();
        thread.handle.join().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_successful_run() {
        let events = run_closure(|io: &mut ProgramIo| {
            write!(io.stdout(), "ok").map_err(Error::Io)?;
            Ok(0)
        });
        assert_eq!(
            events,
            vec![
                HostEvent::Started,
                HostEvent::Stdout("ok".into()),
                HostEvent::Done {
                    status: DoneStatus::Ok,
                    diagnostic: None
                },
            ]
        );
    }

    #[test]
    fn test_nonzero_exit_is_error() {
        let events = run_closure(|_io: &mut ProgramIo| Ok(2));
        assert_eq!(
            events.last().unwrap(),
            &HostEvent::Done {
                status: DoneStatus::Error,
                diagnostic: Some("program exited with status 2".into())
            }
        );
        assert!(events.contains(&HostEvent::Stderr("program exited with status 2\n".into())));
    }

    #[test]
    fn test_panicking_program_is_reported() {
        let events = run_closure(|_io: &mut ProgramIo| panic!("boom"));
        match events.last().unwrap() {
            HostEvent::Done {
                status: DoneStatus::Error,
                diagnostic: Some(d),
            } => assert!(d.contains("boom")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    /// Toolchain whose compiler crashes.
    struct PanickingToolchain;

    impl Toolchain for PanickingToolchain {
        fn name(&self) -> &str {
            "panicking"
        }

        fn compile(&self, _source: &str, _abort: &AbortHandle) -> Result<Box<dyn Program>> {
            panic!("compiler crashed")
        }
    }

    #[test]
    fn test_panicking_toolchain_is_compile_error() {
        let (sink, mut rx) = EventSink::channel();
        let thread = ExecutionHost::spawn(HostRequest {
            label: "panic".into(),
            source: String::new(),
            input: Box::new(FixedSource::new(FixedInputQueue::default())),
            sink,
            abort: AbortHandle::new(),
            toolchain: Arc::new(PanickingToolchain),
        })
        .unwrap();
        thread.handle.join().unwrap();

        assert!(matches!(rx.try_recv().unwrap(), HostEvent::Stderr(_)));
        match rx.try_recv().unwrap() {
            HostEvent::Done {
                status: DoneStatus::Error,
                diagnostic: Some(d),
            } => assert!(d.contains("compiler crashed")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_compile_error_reaches_stderr() {
        let (sink, mut rx) = EventSink::channel();
        let thread = ExecutionHost::spawn(HostRequest {
            label: "wat".into(),
            source: "(module".into(),
            input: Box::new(FixedSource::new(FixedInputQueue::default())),
            sink,
            abort: AbortHandle::new(),
            toolchain: Arc::new(crate::compile::WatToolchain),
        })
        .unwrap();
        thread.handle.join().unwrap();

        assert!(matches!(rx.try_recv().unwrap(), HostEvent::Stderr(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            HostEvent::Done {
                status: DoneStatus::Error,
                diagnostic: Some(_)
            }
        ));
    }
}
