//! Command dispatch.
//!
//! Complete command lines are executed by a [`CommandHandler`] on a
//! dedicated worker thread while the reactor waits for the result. The
//! reactor only ever dispatches one command at a time and nothing else
//! enters the dispatcher, so command execution is serialized across the
//! whole process. That keeps handlers trivially simple to write: no
//! handler ever observes another handler running.
//!
//! Handlers stay pure: they turn a line of input into a [`CommandReply`]
//! and never touch sockets, the registry lock's write side or the control
//! channel. The dispatcher applies the reply's effects (response write,
//! prompt, broadcast, disconnect) from the reactor task afterwards.

use std::io;
use std::sync::Arc;
use tokio::task;
use tracing::error;

use crate::connection::{ClientSession, SessionId, SessionRegistry};

/// Prompt written after the greeting and after every command response.
pub const PROMPT: &str = "> ";

/// Notice returned in place of command output while the server is paused.
const PAUSED_NOTICE: &str = "Server is paused; command ignored.";

/// What the handler wants done with a command's outcome.
#[derive(Debug, Clone, Default)]
pub struct CommandReply {
    /// Response text for the issuing session; a trailing newline is
    /// added when missing. Empty means prompt-only.
    pub text: String,
    /// Optional line to broadcast to every live session
    pub broadcast: Option<String>,
    /// Close the issuing session after the response is written
    pub disconnect: bool,
}

impl CommandReply {
    /// Plain response text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// No output beyond the next prompt.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Response text plus a broadcast to everyone.
    pub fn with_broadcast(text: impl Into<String>, broadcast: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            broadcast: Some(broadcast.into()),
            disconnect: false,
        }
    }

    /// Farewell text, then disconnect the session.
    pub fn closing(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            broadcast: None,
            disconnect: true,
        }
    }
}

/// Game-side command interpreter.
///
/// `execute` runs on a worker thread and may block; the session keeps its
/// in-flight flag up for the whole call, so input arriving meanwhile
/// stays queued in the kernel.
pub trait CommandHandler: Send + Sync + 'static {
    fn execute(&self, session: SessionId, line: &str) -> CommandReply;
}

/// What the reactor should do with the session after a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    KeepOpen,
    Disconnect,
}

/// Runs command lines through the handler and applies their effects.
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
    handler: Arc<dyn CommandHandler>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, handler: Arc<dyn CommandHandler>) -> Self {
        Self { registry, handler }
    }

    /// Execute one complete line for `session` and write the response.
    ///
    /// Does not return until the command has fully completed; the
    /// in-flight flag is cleared here in every path, including a failed
    /// response write. An `Err` means the response could not be
    /// delivered and the session should be closed.
    pub async fn dispatch(
        &self,
        session: &Arc<ClientSession>,
        line: String,
    ) -> io::Result<DispatchOutcome> {
        let reply = if session.is_paused() {
            CommandReply::text(PAUSED_NOTICE)
        } else if line.is_empty() {
            CommandReply::empty()
        } else {
            self.execute_on_worker(session.id(), line).await
        };

        let written = session.send(&Self::render(&reply)).await;
        session.complete_command();
        written?;

        if let Some(text) = reply.broadcast {
            let mut message = text.into_bytes();
            if !message.ends_with(b"\n") {
                message.push(b'\n');
            }
            self.registry.broadcast(&message).await;
        }

        if reply.disconnect {
            Ok(DispatchOutcome::Disconnect)
        } else {
            Ok(DispatchOutcome::KeepOpen)
        }
    }

    /// Run the handler on a dedicated worker thread and wait for it.
    async fn execute_on_worker(&self, id: SessionId, line: String) -> CommandReply {
        let handler = Arc::clone(&self.handler);
        let result = task::spawn_blocking(move || handler.execute(id, &line)).await;
        match result {
            Ok(reply) => reply,
            Err(e) => {
                error!("Command worker for session {} failed: {}", id, e);
                CommandReply::text("Internal error.")
            }
        }
    }

    /// Response bytes: text (newline-terminated) followed by the next
    /// prompt, as one write. Disconnecting replies get no prompt.
    fn render(reply: &CommandReply) -> Vec<u8> {
        let mut out = Vec::with_capacity(reply.text.len() + PROMPT.len() + 1);
        out.extend_from_slice(reply.text.as_bytes());
        if !reply.text.is_empty() && !reply.text.ends_with('\n') {
            out.push(b'\n');
        }
        if !reply.disconnect {
            out.extend_from_slice(PROMPT.as_bytes());
        }
        out
    }
}
