//! # Starhold Server - Network Core
//!
//! The network front end of a persistent multi-user game server. This
//! crate owns sockets, sessions and dispatch plumbing while delegating
//! every actual game command to a [`CommandHandler`] supplied by the
//! binary.
//!
//! ## Design Philosophy
//!
//! The network core contains **no game logic** - it only provides
//! infrastructure:
//!
//! * **Listener provisioning** - IPv4 and IPv6 wildcard sockets, bound
//!   non-blocking with a bounded backlog
//! * **Single-task reactor** - One task owns every socket, so session
//!   and registry state never race
//! * **Line framing** - Growable per-session receive buffers that turn
//!   byte streams into newline-terminated commands
//! * **Serialized dispatch** - One command at a time, process-wide, on a
//!   dedicated worker thread
//! * **Control channel** - Framed administrative messages (terminate,
//!   remove-session, broadcast, pause, resume) from the console and
//!   signal handlers into the reactor
//!
//! ## Message Flow
//!
//! 1. A client connects; the reactor accepts, registers a session and
//!    sends the greeting
//! 2. Input bytes accumulate in the session's receive buffer until a
//!    line terminator arrives
//! 3. The complete line runs through the [`CommandHandler`] on a worker
//!    thread while the session refuses further reads
//! 4. The reply and the next prompt are written back, then the session's
//!    watcher is re-armed
//!
//! ## Error Handling
//!
//! Failures are categorized by [`ServerError`]: network problems that
//! abort startup, control channel failures that abort the process, and
//! internal errors. Per-session trouble (disconnects, oversized lines,
//! failed writes) never surfaces as an error; the session is closed and
//! the server keeps serving everyone else.

pub mod config;
pub mod connection;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod logging;
pub mod server;

pub use config::{Args, Config, ServerSettings};
pub use connection::{ClientSession, SessionId, SessionInfo, SessionRegistry};
pub use control::{control_channel, ControlHandle, ControlMessage, ControlReceiver};
pub use dispatch::{CommandHandler, CommandReply, DispatchOutcome, PROMPT};
pub use error::{Result, ServerError};
pub use server::GameServer;
