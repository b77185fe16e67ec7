//! Messages exchanged between a front end and a Tether session.
//!
//! Encoded as one JSON object per line, tagged by `type`:
//!
//! ```text
//! → {"type":"run","source":"...","mode":"interactive"}
//! ← {"type":"request_input"}
//! → {"type":"input","data":"hi\n"}
//! ← {"type":"stdout","data":"hi\n"}
//! ← {"type":"done","status":"ok"}
//! ```

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};
use crate::execute::DoneStatus;
use crate::session::{InputMode, SessionEvent};

/// Message from the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a session, aborting the current one.
    Run {
        source: String,
        #[serde(default)]
        mode: InputMode,
        /// Raw fixed input text, split into lines by the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },

    /// Answer the pending input request.
    Input { data: String },

    /// Answer the pending input request with end of input.
    EndInput,

    /// Stop the current session.
    Abort,
}

/// Message to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Stdout { data: String },

    Stderr { data: String },

    /// The program is waiting for an `input` or `end_input` message.
    RequestInput,

    /// The session is over.
    Done {
        status: DoneStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },

    /// A client message could not be honored. The session, if any, goes on.
    Error { message: String },
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Stdout(data) => Self::Stdout { data },
            SessionEvent::Stderr(data) => Self::Stderr { data },
            SessionEvent::RequestInput => Self::RequestInput,
            SessionEvent::Done { status, diagnostic } => Self::Done { status, diagnostic },
        }
    }
}

/// Encode a message as a single JSON line, including the newline.
pub fn encode_message(message: &impl Serialize) -> Result<String> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| Error::Protocol(format!("Failed to encode message: {}", e)))?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line.
pub fn decode_message<T: DeserializeOwned>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim_end())
        .map_err(|e| Error::Protocol(format!("Invalid message: {}", e)))
}

/// Write a message and flush it.
pub fn write_message<W: Write>(writer: &mut W, message: &impl Serialize) -> Result<()> {
    writer.write_all(encode_message(message)?.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read the next non-blank line as a message. `None` at end of stream.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return decode_message(&line).map(Some);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let message: ClientMessage =
            decode_message(r#"{"type":"run","source":"(module)"}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::Run {
                source: "(module)".into(),
                mode: InputMode::Interactive,
                input: None,
            }
        );

        let message: ClientMessage = decode_message(r#"{"type":"end_input"}"#).unwrap();
        assert_eq!(message, ClientMessage::EndInput);
    }

    #[test]
    fn test_server_message_wire_format() {
        assert_eq!(
            encode_message(&ServerMessage::RequestInput).unwrap(),
            "{\"type\":\"request_input\"}\n"
        );
        assert_eq!(
            encode_message(&ServerMessage::Done {
                status: DoneStatus::Ok,
                diagnostic: None
            })
            .unwrap(),
            "{\"type\":\"done\",\"status\":\"ok\"}\n"
        );
    }

    #[test]
    fn test_unknown_message_is_protocol_error() {
        let result: Result<ClientMessage> = decode_message(r#"{"type":"launch"}"#);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_read_message_skips_blank_lines() {
        let mut input = "\n{\"type\":\"abort\"}\n".as_bytes();
        let message: Option<ClientMessage> = read_message(&mut input).unwrap();
        assert_eq!(message, Some(ClientMessage::Abort));
        let message: Option<ClientMessage> = read_message(&mut input).unwrap();
        assert_eq!(message, None);
    }

    #[test]
    fn test_session_event_conversion() {
        let message = ServerMessage::from(SessionEvent::Stderr("oops\n".into()));
        assert_eq!(
            message,
            ServerMessage::Stderr {
                data: "oops\n".into()
            }
        );
    }
}
