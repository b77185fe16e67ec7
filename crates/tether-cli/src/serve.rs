//! Serve command implementation for Tether CLI.
//!
//! Speaks the JSON-lines session protocol on stdin/stdout so an editor or web
//! front end can drive runs. One session is live at a time; a new `run`
//! aborts the previous one and reports its `done`. When stdin closes, the
//! live session runs to completion with its input at end of file.

use std::io;

use tether_core::protocol::{ClientMessage, ServerMessage, decode_message, write_message};
use tether_core::{
    FixedInputQueue, RunRequest, Session, SessionEvent, SessionManager, TetherConfig,
};

use crate::console::stdin_lines;
use crate::toolchain::{self, ToolchainKind};

/// Serve sessions until stdin closes.
pub async fn execute(kind: ToolchainKind) -> anyhow::Result<()> {
    let config = TetherConfig::from_env()?;
    let toolchain = toolchain::build(kind, &config)?;
    let manager = SessionManager::new(config, toolchain);
    tracing::info!(
        "Serving {:?} sessions (interactive: {})",
        kind,
        manager.capabilities().blocking_wait
    );

    let mut lines = stdin_lines();
    let mut session: Option<Session> = None;

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match decode_message::<ClientMessage>(&line) {
                    Ok(message) => handle(&manager, &mut session, message).await?,
                    Err(e) => send(&ServerMessage::Error { message: e.to_string() })?,
                }
            }
            event = next_event(&mut session) => match event {
                Some(event) => send(&ServerMessage::from(event))?,
                None => session = None,
            },
        }
    }

    // A closed client stream ends the program's input; the live session still
    // reports everything up to `done`.
    if let Some(mut session) = session.take() {
        // Answers a request the client saw but never replied to.
        let _ = session.end_input();
        while let Some(event) = session.next_event().await {
            match event {
                SessionEvent::RequestInput => {
                    let _ = session.end_input();
                }
                event => send(&ServerMessage::from(event))?,
            }
        }
    }
    Ok(())
}

async fn handle(
    manager: &SessionManager,
    session: &mut Option<Session>,
    message: ClientMessage,
) -> anyhow::Result<()> {
    match message {
        ClientMessage::Run {
            source,
            mode,
            input,
        } => {
            if let Some(previous) = session.take() {
                abort_and_report(previous).await?;
            }
            let request = RunRequest {
                source,
                mode,
                fixed_input: input.map(|text| FixedInputQueue::from_text(&text)),
            };
            match manager.start(request) {
                Ok(started) => *session = Some(started),
                Err(e) => send(&ServerMessage::Error {
                    message: e.to_string(),
                })?,
            }
        }

        ClientMessage::Input { data } => {
            let result = match session.as_mut() {
                Some(session) => session.submit_input(data.as_bytes()).map(|_| ()),
                None => Err(no_session()),
            };
            report(result)?;
        }

        ClientMessage::EndInput => {
            let result = match session.as_mut() {
                Some(session) => session.end_input(),
                None => Err(no_session()),
            };
            report(result)?;
        }

        ClientMessage::Abort => {
            if let Some(aborted) = session.take() {
                abort_and_report(aborted).await?;
            }
        }
    }
    Ok(())
}

/// Stop `session` and send its `done`, unless the client already has it.
async fn abort_and_report(mut session: Session) -> anyhow::Result<()> {
    if session.outcome().is_some() {
        return Ok(());
    }
    let outcome = session.abort().await;
    send(&ServerMessage::Done {
        status: outcome.status,
        diagnostic: outcome.diagnostic,
    })
}

/// Next event of the live session; never resolves without one.
async fn next_event(session: &mut Option<Session>) -> Option<SessionEvent> {
    match session {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

fn no_session() -> tether_core::Error {
    tether_core::Error::Protocol("no session is running".to_string())
}

fn report(result: tether_core::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = result {
        send(&ServerMessage::Error {
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn send(message: &ServerMessage) -> anyhow::Result<()> {
    write_message(&mut io::stdout().lock(), message)?;
    Ok(())
}
