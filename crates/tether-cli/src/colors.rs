//! Terminal colors for status lines.
//!
//! Program output is never colored; only the CLI's own notices on stderr are,
//! and only when stderr is a terminal.

use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

static ENABLED: OnceLock<bool> = OnceLock::new();

fn enabled() -> bool {
    *ENABLED.get_or_init(|| io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none())
}

/// Wrap `text` in `color` if colors are enabled.
pub fn paint(color: &str, text: &str) -> String {
    if enabled() {
        format!("{}{}{}", color, text, RESET)
    } else {
        text.to_string()
    }
}

/// Flush stdout so partial lines (prompts, unterminated output) show up.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
