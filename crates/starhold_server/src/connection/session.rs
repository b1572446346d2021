//! Per-session connection state.
//!
//! A [`ClientSession`] owns one accepted TCP socket together with the
//! receive buffer that turns its byte stream into newline-terminated
//! command lines. The reactor task is the only caller of the read side
//! ([`ClientSession::read_ready`], [`ClientSession::complete_command`]),
//! so buffer state needs no async locking; the handful of flags other
//! tasks may observe are atomics.
//!
//! A session moves through a fixed lifecycle: accepted, then reading
//! line fragments, then dispatching whenever a complete line is in the
//! buffer, and finally closing. Closing is one-way. Once [`close`] has
//! been called the watcher retires, the registry entry is gone and the
//! socket drops with the last `Arc`.
//!
//! [`close`]: ClientSession::close

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::SessionId;

/// Starting capacity of a session receive buffer in bytes. Capacity
/// doubles on demand up to the configured maximum line length.
pub const RECV_BUFFER_INITIAL: usize = 256;

/// What one socket readiness event amounted to.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A command is still executing for this session; nothing was read
    Busy,
    /// Bytes may have been buffered but no complete line is ready
    Pending,
    /// One complete line, with the terminator trimmed off
    Line(String),
    /// The peer closed its end of the connection
    Disconnected,
    /// The line under assembly exceeded the maximum length
    TooLong,
    /// The read itself failed
    Failed(io::Error),
}

/// Result of a buffer growth attempt.
enum GrowOutcome {
    Grown,
    AtLimit,
    OutOfMemory,
}

/// Growable receive buffer with explicit capacity accounting.
///
/// `data` is always sized to the current capacity and zero-filled beyond
/// `len`, so the read path can hand out `&mut data[len..]` directly.
struct RecvBuffer {
    data: Vec<u8>,
    len: usize,
}

impl RecvBuffer {
    fn new() -> Self {
        Self {
            data: vec![0; RECV_BUFFER_INITIAL],
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Double the capacity, saturating at `max`. An allocation failure
    /// is reported, not propagated; it costs the session, never the
    /// process.
    fn grow(&mut self, max: usize) -> GrowOutcome {
        let current = self.data.len();
        if current >= max {
            return GrowOutcome::AtLimit;
        }
        let target = (current * 2).min(max);
        if self.data.try_reserve_exact(target - current).is_err() {
            return GrowOutcome::OutOfMemory;
        }
        self.data.resize(target, 0);
        GrowOutcome::Grown
    }

    fn ends_with_newline(&self) -> bool {
        self.len > 0 && self.data[self.len - 1] == b'\n'
    }

    /// Copy the buffered line out, trimming the terminator and a trailing
    /// carriage return. Leaves `len` untouched: the buffer only resets
    /// once the dispatched command has completed.
    fn take_line(&self) -> String {
        let mut end = self.len;
        if end > 0 && self.data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.data[end - 1] == b'\r' {
            end -= 1;
        }
        String::from_utf8_lossy(&self.data[..end]).into_owned()
    }

    fn reset(&mut self) {
        self.len = 0;
    }
}

/// One connected client.
///
/// Shared as `Arc<ClientSession>` between the registry, the reactor's
/// watcher future and in-flight dispatches. All methods take `&self`.
pub struct ClientSession {
    id: SessionId,
    peer: String,
    socket: TcpStream,
    buffer: Mutex<RecvBuffer>,
    max_line_length: usize,
    /// True while a command from this session is executing
    in_flight: AtomicBool,
    /// Advisory flag set by the Pause/Resume control messages
    paused: AtomicBool,
    /// One-way flag; set once by `close`
    closing: AtomicBool,
    /// Wakes the watcher future when the session closes
    retired: Notify,
}

impl ClientSession {
    /// Wrap a freshly accepted socket. Assigns the next session id.
    pub fn new(socket: TcpStream, peer: SocketAddr, max_line_length: usize) -> Self {
        Self {
            id: SessionId::next(),
            peer: peer.to_string(),
            socket,
            buffer: Mutex::new(RecvBuffer::new()),
            max_line_length,
            in_flight: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            retired: Notify::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer address in display form, e.g. `127.0.0.1:54321`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Current receive buffer capacity in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer().capacity()
    }

    /// Bytes currently buffered towards the next line.
    pub fn buffer_len(&self) -> usize {
        self.buffer().len
    }

    /// Wait until the socket reports readable.
    pub async fn readable(&self) {
        let _ = self.socket.readable().await;
    }

    /// Resolve once the session has been closed. Used by the reactor's
    /// watcher future; a close that happened before this call resolves
    /// it immediately.
    pub async fn closed(&self) {
        self.retired.notified().await;
    }

    /// Mark the session closing and wake its watcher. Idempotent. The
    /// socket itself closes when the last `Arc` drops.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        self.retired.notify_one();
    }

    /// Service one readiness event.
    ///
    /// While a command from this session is still executing nothing is
    /// read, leaving the bytes in the kernel buffer; the socket stays
    /// readable and is revisited once the command completes. Otherwise
    /// reads whatever is available into the buffer and reports whether a
    /// complete line came together. Returning [`ReadOutcome::Line`] sets
    /// the in-flight flag; [`complete_command`] clears it again.
    ///
    /// [`complete_command`]: ClientSession::complete_command
    pub fn read_ready(&self) -> ReadOutcome {
        if self.is_in_flight() {
            info!("Session {}: data arrived too fast, dropped", self.id);
            return ReadOutcome::Busy;
        }

        let mut buffer = self.buffer();
        let len = buffer.len;
        match self.socket.try_read(&mut buffer.data[len..]) {
            Ok(0) => ReadOutcome::Disconnected,
            Ok(n) => {
                buffer.len += n;
                self.after_read(&mut buffer)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::Pending,
            Err(e) => ReadOutcome::Failed(e),
        }
    }

    /// Framing decision after bytes arrived: dispatch on a terminator,
    /// grow a full buffer, otherwise keep waiting.
    fn after_read(&self, buffer: &mut MutexGuard<'_, RecvBuffer>) -> ReadOutcome {
        if buffer.ends_with_newline() {
            let line = buffer.take_line();
            self.in_flight.store(true, Ordering::Release);
            return ReadOutcome::Line(line);
        }

        if buffer.is_full() {
            match buffer.grow(self.max_line_length) {
                GrowOutcome::Grown => {
                    debug!(
                        "Session {}: receive buffer grown to {} bytes",
                        self.id,
                        buffer.capacity()
                    );
                }
                GrowOutcome::AtLimit => {
                    warn!(
                        "Session {}: line exceeds {} bytes, closing",
                        self.id, self.max_line_length
                    );
                    return ReadOutcome::TooLong;
                }
                GrowOutcome::OutOfMemory => {
                    warn!("Session {}: receive buffer growth failed, closing", self.id);
                    return ReadOutcome::Failed(io::ErrorKind::OutOfMemory.into());
                }
            }
        }

        ReadOutcome::Pending
    }

    /// Mark the in-flight command finished: the buffer resets and the
    /// session is ready for its next line.
    pub fn complete_command(&self) {
        self.buffer().reset();
        self.in_flight.store(false, Ordering::Release);
    }

    /// Write all of `bytes` to the client.
    ///
    /// Only the reactor task writes to sessions, so whole messages never
    /// interleave on the socket.
    pub async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            self.socket.writable().await?;
            match self.socket.try_write(&bytes[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn buffer(&self) -> MutexGuard<'_, RecvBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
