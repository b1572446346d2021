//! The reactor: one task that owns every socket.
//!
//! All listening sockets, every session socket and the control channel's
//! read end belong to this single task. It alone accepts connections,
//! reads session input, dispatches commands and changes registry
//! membership, so none of those steps ever race each other. Each
//! iteration waits for exactly one of three things: an accepted
//! connection, a control message, or a session watcher firing.
//!
//! A session watcher is a small future that resolves when its session's
//! socket turns readable or the session closes. Watchers are re-armed
//! after each serviced event, with one deliberate exception: no watcher
//! exists while that session's command is being dispatched, so a client
//! flooding input cannot spin the loop. The bytes wait in the kernel
//! until the command completes and the watcher returns.

use futures::future::select_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::connection::{ClientSession, ReadOutcome, SessionId, SessionRegistry};
use crate::control::{ControlMessage, ControlReceiver};
use crate::dispatch::{CommandDispatcher, DispatchOutcome};
use crate::error::ServerError;
use crate::listener::BoundListener;

/// How a session watcher resolved.
enum WatchEvent {
    /// The session's socket reported readable
    Readable(SessionId),
    /// The session was closed; the watcher is done for good
    Retired(SessionId),
}

/// The one event a loop iteration selected.
enum ReactorEvent {
    Accepted(usize, io::Result<(TcpStream, SocketAddr)>),
    Control(Result<ControlMessage, ServerError>),
    Session(WatchEvent),
}

type SessionWatcher = Pin<Box<dyn Future<Output = WatchEvent> + Send>>;

pub struct Reactor {
    listeners: Vec<BoundListener>,
    registry: Arc<SessionRegistry>,
    dispatcher: CommandDispatcher,
    control: ControlReceiver,
    greeting: Vec<u8>,
    max_line_length: usize,
}

impl Reactor {
    pub fn new(
        listeners: Vec<BoundListener>,
        registry: Arc<SessionRegistry>,
        dispatcher: CommandDispatcher,
        control: ControlReceiver,
        greeting: Vec<u8>,
        max_line_length: usize,
    ) -> Self {
        Self {
            listeners,
            registry,
            dispatcher,
            control,
            greeting,
            max_line_length,
        }
    }

    /// Run until a Terminate message arrives or the control channel
    /// fails. Every live session is drained on the way out either way.
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!("📡 Reactor running with {} listener(s)", self.listeners.len());
        let mut watchers: FuturesUnordered<SessionWatcher> = FuturesUnordered::new();

        loop {
            let event = tokio::select! {
                (index, result) = accept_any(&self.listeners) => {
                    ReactorEvent::Accepted(index, result)
                }
                message = self.control.recv() => ReactorEvent::Control(message),
                Some(watch) = watchers.next() => ReactorEvent::Session(watch),
            };

            match event {
                ReactorEvent::Accepted(index, result) => {
                    if let Some(session) = self.handle_accept(index, result).await {
                        watchers.push(watch_session(session));
                    }
                }
                ReactorEvent::Control(Ok(ControlMessage::Terminate)) => {
                    info!("🛑 Terminate received, shutting down");
                    break;
                }
                ReactorEvent::Control(Ok(message)) => self.handle_control(message).await,
                ReactorEvent::Control(Err(e)) => {
                    error!("❌ Control channel failed: {}", e);
                    self.shutdown(&mut watchers).await;
                    return Err(e);
                }
                ReactorEvent::Session(WatchEvent::Readable(id)) => {
                    if let Some(watcher) = self.service_session(id).await {
                        watchers.push(watcher);
                    }
                }
                ReactorEvent::Session(WatchEvent::Retired(id)) => {
                    debug!("Watcher retired for session {}", id);
                }
            }
        }

        self.shutdown(&mut watchers).await;
        Ok(())
    }

    /// Turn an accepted socket into a registered, greeted session.
    /// Returns the session so the caller can arm its first watcher.
    async fn handle_accept(
        &mut self,
        index: usize,
        result: io::Result<(TcpStream, SocketAddr)>,
    ) -> Option<Arc<ClientSession>> {
        let (socket, peer) = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                // The peer may already be gone again; the listener is fine
                warn!("Accept failed on listener {}: {}", index, e);
                return None;
            }
        };

        let session = Arc::new(ClientSession::new(socket, peer, self.max_line_length));
        info!("🔌 New connection from {} as session {}", peer, session.id());
        self.registry.insert(Arc::clone(&session)).await;

        if let Err(e) = session.send(&self.greeting).await {
            warn!("Session {}: greeting write failed: {}", session.id(), e);
            self.close_session(session.id(), "greeting write failed").await;
            return None;
        }

        Some(session)
    }

    /// Service one readable event for a session. Returns the re-armed
    /// watcher, or `None` when the session is finished.
    async fn service_session(&mut self, id: SessionId) -> Option<SessionWatcher> {
        // Look the session up fresh; the watcher may have fired for a
        // session an earlier event already removed.
        let session = self.registry.find(id).await?;
        if session.is_closing() {
            return None;
        }

        match session.read_ready() {
            ReadOutcome::Line(line) => {
                debug!("Session {} command: {:?}", id, line);
                match self.dispatcher.dispatch(&session, line).await {
                    Ok(DispatchOutcome::KeepOpen) => {}
                    Ok(DispatchOutcome::Disconnect) => {
                        self.close_session(id, "client quit").await;
                        return None;
                    }
                    Err(e) => {
                        warn!("Session {}: response write failed: {}", id, e);
                        self.close_session(id, "write failure").await;
                        return None;
                    }
                }
            }
            ReadOutcome::Pending | ReadOutcome::Busy => {}
            ReadOutcome::Disconnected => {
                self.close_session(id, "peer disconnected").await;
                return None;
            }
            ReadOutcome::TooLong => {
                self.close_session(id, "line length exceeded").await;
                return None;
            }
            ReadOutcome::Failed(e) => {
                warn!("Session {}: read failed: {}", id, e);
                self.close_session(id, "read failure").await;
                return None;
            }
        }

        Some(watch_session(session))
    }

    /// Apply one non-terminating control message.
    async fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::RemoveSession(id) => {
                if self.close_session(id, "removed by administrator").await {
                    info!("Session {} removed by administrator", id);
                } else {
                    warn!("RemoveSession for unknown session {}", id);
                }
            }
            ControlMessage::Broadcast(text) => {
                let mut message = text.into_bytes();
                if !message.ends_with(b"\n") {
                    message.push(b'\n');
                }
                let delivered = self.registry.broadcast(&message).await;
                info!("📣 Broadcast delivered to {} session(s)", delivered);
            }
            ControlMessage::Pause => {
                self.registry.for_each(|session| session.set_paused(true)).await;
                let notified = self.registry.broadcast(b"-- server paused --\n").await;
                info!("⏸️ Pause signalled to {} session(s)", notified);
            }
            ControlMessage::Resume => {
                self.registry.for_each(|session| session.set_paused(false)).await;
                let notified = self.registry.broadcast(b"-- server resumed --\n").await;
                info!("▶️ Resume signalled to {} session(s)", notified);
            }
            // Terminate never reaches here; the run loop breaks on it
            ControlMessage::Terminate => {}
        }
    }

    /// Remove a session from the registry and mark it closed. Returns
    /// false when the id names nobody.
    async fn close_session(&mut self, id: SessionId, reason: &str) -> bool {
        match self.registry.remove(id).await {
            Some(session) => {
                session.close();
                info!("👋 Session {} from {} closed ({})", id, session.peer(), reason);
                true
            }
            None => false,
        }
    }

    /// Tear everything down: watchers first, then every session, then
    /// the listening sockets.
    async fn shutdown(&mut self, watchers: &mut FuturesUnordered<SessionWatcher>) {
        watchers.clear();

        let sessions = self.registry.drain_all().await;
        let drained = sessions.len();
        for session in sessions {
            session.close();
        }
        if drained > 0 {
            info!("🧹 Closed {} session(s) during shutdown", drained);
        }

        self.listeners.clear();
        info!("✅ Reactor stopped, listening sockets closed");
    }
}

/// Watch one session until it turns readable or closes. The future holds
/// its own `Arc`, so the session outlives registry removal until the
/// watcher has resolved.
fn watch_session(session: Arc<ClientSession>) -> SessionWatcher {
    Box::pin(async move {
        tokio::select! {
            _ = session.readable() => WatchEvent::Readable(session.id()),
            _ = session.closed() => WatchEvent::Retired(session.id()),
        }
    })
}

/// Wait for a connection on any listener. Accepting is cancel-safe, so
/// the futures this builds can be dropped and rebuilt every iteration.
async fn accept_any(
    listeners: &[BoundListener],
) -> (usize, io::Result<(TcpStream, SocketAddr)>) {
    let accepts = listeners
        .iter()
        .map(|bound| Box::pin(bound.listener.accept()));
    let (result, index, _) = select_all(accepts).await;
    (index, result)
}
