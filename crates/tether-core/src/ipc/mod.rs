//! Wire protocol for driving sessions from another process.
//!
//! `tether serve` speaks this protocol over stdin/stdout.

pub mod protocol;

pub use protocol::{
    ClientMessage, ServerMessage, decode_message, encode_message, read_message, write_message,
};
