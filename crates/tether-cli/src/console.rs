//! Terminal console and stdin line reader.

use std::io::{self, BufRead, Write};
use std::thread;

use tether_core::Console;
use tokio::sync::mpsc;

use crate::colors;

/// Renders a session on the process's own stdout and stderr.
#[derive(Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn write_stdout(&mut self, text: &str) {
        print!("{}", text);
        colors::flush_stdout();
    }

    fn write_stderr(&mut self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }

    fn prompt(&mut self) {
        eprint!("{}", colors::paint(colors::DIM, "> "));
    }

    fn notice(&mut self, text: &str) {
        eprintln!("{}", colors::paint(colors::YELLOW, text));
    }
}

/// Lines typed on stdin, read on a detached thread.
///
/// A plain thread is used instead of the runtime's stdin so that a read still
/// blocked at exit does not hold up shutdown. The receiver yields `None` once
/// stdin reaches end of file.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = thread::Builder::new()
        .name("tether-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Cannot read stdin: {}", e);
    }

    rx
}
