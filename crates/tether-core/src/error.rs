//! Error types for tether-core.

use thiserror::Error;

/// Result type for tether-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tether-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The program failed to build. No execution was attempted.
    #[error("compilation failed: {message}")]
    Compile { message: String },

    /// The program trapped or exited with a non-zero status.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A concurrency primitive required for the requested mode is unavailable.
    #[error("environment error: {0}")]
    Environment(String),

    /// The shared input region could not be provided.
    #[error("resource error: {0}")]
    Resource(String),

    /// Misuse of the input channel handshake.
    #[error("input channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Toolchain lookup or download failed.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Execution was aborted by user request.
    #[error("execution aborted")]
    Aborted,
}

/// Contract violations on the shared input channel.
///
/// These are programming errors on the producer side: the foreground tried
/// to hand over bytes the background never asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Publish without an outstanding input request.
    #[error("no input request is pending")]
    Unsolicited,

    /// A second publish for a request that already has its payload.
    #[error("input for the pending request was already published")]
    AlreadyPublished,

    /// The channel was released at the end of its session.
    #[error("input channel has been released")]
    Released,
}

impl Error {
    /// Recovery hint shown by front ends under the error message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::Environment(_) => Some("use fixed input mode (--inputs FILE) instead"),
            Error::Toolchain(_) => {
                Some("set TETHER_TOOLCHAIN_URL or put clang and wasm-ld on PATH")
            }
            Error::Channel(ChannelError::Unsolicited) => {
                Some("wait for the program to request input before sending it")
            }
            _ => None,
        }
    }
}
