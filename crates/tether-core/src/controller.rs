//! Foreground controller: renders output and answers input requests.
//!
//! The controller never blocks on the program. It waits on the session's
//! event stream and on a cancellation future at the same time, so an abort
//! is honored even while the program is parked on input or while the user
//! is still typing an answer.

use std::future::Future;
use std::sync::OnceLock;

use regex::Regex;
use tokio::sync::mpsc;

use crate::bridge::FixedInputQueue;
use crate::error::Result;
use crate::execute::DoneStatus;
use crate::session::{Session, SessionEvent, SessionOutcome};

static CSI_REGEX: OnceLock<Regex> = OnceLock::new();

/// Remove ANSI CSI escape sequences and bare `>` prompt lines.
pub fn strip_ansi(text: &str) -> String {
    let csi = CSI_REGEX
        .get_or_init(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("Invalid CSI Regex"));
    let plain = csi.replace_all(text, "");

    plain
        .split_inclusive('\n')
        .filter(|line| line.trim() != ">")
        .collect()
}

/// Where the controller renders a session.
pub trait Console {
    fn write_stdout(&mut self, text: &str);

    fn write_stderr(&mut self, text: &str);

    /// Show that the program is waiting for a line.
    fn prompt(&mut self) {}

    /// Show a line of input that was supplied without typing.
    fn echo_input(&mut self, text: &str) {
        self.write_stdout(text);
    }

    /// Status line such as `[Aborted]`.
    fn notice(&mut self, text: &str);
}

/// Answer to one input request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// One line, without terminator.
    Line(String),
    EndOfInput,
}

/// Supplies replies to input requests.
pub trait Responder {
    fn respond(&mut self) -> impl Future<Output = Result<Reply>>;

    /// Whether replies come from a person at a prompt.
    fn is_live(&self) -> bool {
        false
    }
}

/// Asynchronous source of typed lines. `None` means the user closed input.
pub trait LineSource {
    fn next_line(&mut self) -> impl Future<Output = Option<String>>;
}

impl LineSource for mpsc::UnboundedReceiver<String> {
    async fn next_line(&mut self) -> Option<String> {
        self.recv().await
    }
}

/// Interactive answering from a line source.
pub struct PromptResponder<L> {
    lines: L,
}

impl<L: LineSource> PromptResponder<L> {
    pub fn new(lines: L) -> Self {
        Self { lines }
    }
}

impl<L: LineSource> Responder for PromptResponder<L> {
    async fn respond(&mut self) -> Result<Reply> {
        Ok(match self.lines.next_line().await {
            Some(line) => Reply::Line(line.trim_end_matches(['\r', '\n']).to_string()),
            None => Reply::EndOfInput,
        })
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// Answers requests from pre-supplied lines, then with end of input.
pub struct ScriptedResponder {
    queue: FixedInputQueue,
}

impl ScriptedResponder {
    pub fn new(queue: FixedInputQueue) -> Self {
        Self { queue }
    }
}

impl Responder for ScriptedResponder {
    async fn respond(&mut self) -> Result<Reply> {
        Ok(match self.queue.pop_line() {
            Some(line) => Reply::Line(line),
            None => Reply::EndOfInput,
        })
    }
}

/// Append-only transcript of a session as the user saw it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputAccumulator {
    text: String,
}

impl OutputAccumulator {
    pub fn push(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

enum Step {
    Cancelled,
    Event(Option<SessionEvent>),
}

/// Drives one session from the foreground.
pub struct ForegroundController<C, R> {
    console: C,
    responder: R,
    transcript: OutputAccumulator,
    strip_ansi: bool,
}

impl<C: Console, R: Responder> ForegroundController<C, R> {
    pub fn new(console: C, responder: R) -> Self {
        Self {
            console,
            responder,
            transcript: OutputAccumulator::default(),
            strip_ansi: false,
        }
    }

    /// Strip escape sequences from program output before rendering.
    pub fn with_strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    pub fn transcript(&self) -> &OutputAccumulator {
        &self.transcript
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn into_parts(self) -> (C, OutputAccumulator) {
        (self.console, self.transcript)
    }

    /// Run `session` to the end, aborting it when `cancel` resolves.
    pub async fn drive(
        &mut self,
        session: &mut Session,
        cancel: impl Future<Output = ()>,
    ) -> Result<SessionOutcome> {
        tokio::pin!(cancel);

        loop {
            let step = tokio::select! {
                _ = &mut cancel => Step::Cancelled,
                event = session.next_event() => Step::Event(event),
            };

            let event = match step {
                Step::Cancelled => return Ok(self.cancelled(session).await),
                Step::Event(Some(event)) => event,
                Step::Event(None) => {
                    return Ok(session.outcome().cloned().unwrap_or(SessionOutcome {
                        status: DoneStatus::Aborted,
                        diagnostic: None,
                    }));
                }
            };

            match event {
                SessionEvent::Stdout(text) => self.render(&text, false),
                SessionEvent::Stderr(text) => self.render(&text, true),
                SessionEvent::RequestInput => {
                    if self.responder.is_live() {
                        self.console.prompt();
                    }

                    let reply = tokio::select! {
                        _ = &mut cancel => None,
                        reply = self.responder.respond() => Some(reply?),
                    };

                    match reply {
                        None => return Ok(self.cancelled(session).await),
                        Some(Reply::Line(mut line)) => {
                            line.push('\n');
                            self.transcript.push(&line);
                            if !self.responder.is_live() {
                                self.console.echo_input(&line);
                            }
                            session.submit_input(line.as_bytes())?;
                        }
                        Some(Reply::EndOfInput) => session.end_input()?,
                    }
                }
                SessionEvent::Done { status, diagnostic } => {
                    if status == DoneStatus::Aborted {
                        self.console.notice("[Aborted]");
                    }
                    return Ok(SessionOutcome { status, diagnostic });
                }
            }
        }
    }

    async fn cancelled(&mut self, session: &mut Session) -> SessionOutcome {
        let outcome = session.abort().await;
        self.console.notice("[Aborted]");
        outcome
    }

    fn render(&mut self, text: &str, stderr: bool) {
        let text = if self.strip_ansi {
            strip_ansi(text)
        } else {
            text.to_string()
        };
        if text.is_empty() {
            return;
        }

        self.transcript.push(&text);
        if stderr {
            self.console.write_stderr(&text);
        } else {
            self.console.write_stdout(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_removes_escapes_and_prompt_lines() {
        let text = "\x1b[1;32mok\x1b[0m\n>\nnext\n> \n";
        assert_eq!(strip_ansi(text), "ok\nnext\n");
    }

    #[test]
    fn test_strip_ansi_keeps_plain_text() {
        assert_eq!(strip_ansi("a > b\n"), "a > b\n");
        assert_eq!(strip_ansi("no newline"), "no newline");
    }

    #[tokio::test]
    async fn test_scripted_responder_ends_input_when_empty() {
        let mut responder = ScriptedResponder::new(FixedInputQueue::from_lines(["1"]));
        assert_eq!(responder.respond().await.unwrap(), Reply::Line("1".into()));
        assert_eq!(responder.respond().await.unwrap(), Reply::EndOfInput);
        assert!(!responder.is_live());
    }

    #[tokio::test]
    async fn test_prompt_responder_reads_lines_until_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut responder = PromptResponder::new(rx);
        tx.send("hi\r\n".to_string()).unwrap();
        drop(tx);

        assert_eq!(responder.respond().await.unwrap(), Reply::Line("hi".into()));
        assert_eq!(responder.respond().await.unwrap(), Reply::EndOfInput);
        assert!(responder.is_live());
    }

    #[test]
    fn test_accumulator_is_append_only() {
        let mut transcript = OutputAccumulator::default();
        transcript.push("a");
        transcript.push("b\n");
        assert_eq!(transcript.as_str(), "ab\n");
        assert_eq!(transcript.into_string(), "ab\n");
    }
}
