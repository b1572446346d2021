//! Internal control channel.
//!
//! The reactor task is the only code allowed to touch its own watcher set
//! and the session registry's membership, so everything outside it (the
//! administrative console, signal handlers, workers) requests those actions
//! through this channel instead. Requests travel as framed messages over an
//! in-process duplex byte stream: a 1-byte kind, a big-endian u32 payload
//! length, then exactly that many payload bytes. Frames are written as one
//! unit under a lock so concurrent senders never interleave their bytes.
//!
//! The channel is an internal construct that lives for the whole process:
//! losing it (closed stream, torn frame) is not a recoverable condition and
//! is reported as [`ServerError::ControlChannel`].

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tracing::warn;

use crate::connection::SessionId;
use crate::error::ServerError;

/// Frame header: kind byte plus payload length.
const HEADER_LEN: usize = 5;

/// Upper bound on a control payload, checked before any allocation.
pub const MAX_CONTROL_PAYLOAD: usize = 64 * 1024;

/// In-memory buffer of the underlying duplex stream. Holds at least one
/// maximum-size frame so a sender can never wedge mid-frame.
const CONTROL_BUFFER_SIZE: usize = 2 * MAX_CONTROL_PAYLOAD;

const KIND_TERMINATE: u8 = 0;
const KIND_REMOVE_SESSION: u8 = 1;
const KIND_BROADCAST: u8 = 2;
const KIND_PAUSE: u8 = 3;
const KIND_RESUME: u8 = 4;

/// One administrative request, decoded from the wire.
///
/// Messages are transient: constructed, sent, decoded, acted on, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Shut the server down, draining every session
    Terminate,
    /// Remove one session by id; unknown ids are a no-op
    RemoveSession(SessionId),
    /// Send a line of text to every live session
    Broadcast(String),
    /// Advisory pause, fanned out to every live session
    Pause,
    /// Advisory resume, fanned out to every live session
    Resume,
}

impl ControlMessage {
    /// Serialize the full frame: header and payload as one buffer.
    fn encode(&self) -> Vec<u8> {
        let (kind, payload) = match self {
            ControlMessage::Terminate => (KIND_TERMINATE, Vec::new()),
            ControlMessage::RemoveSession(id) => {
                (KIND_REMOVE_SESSION, id.as_u64().to_be_bytes().to_vec())
            }
            ControlMessage::Broadcast(text) => (KIND_BROADCAST, text.as_bytes().to_vec()),
            ControlMessage::Pause => (KIND_PAUSE, Vec::new()),
            ControlMessage::Resume => (KIND_RESUME, Vec::new()),
        };

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.push(kind);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    /// Decode a received kind/payload pair. `None` means the frame was
    /// well-delimited but not something this server understands.
    fn decode(kind: u8, payload: Vec<u8>) -> Option<ControlMessage> {
        match kind {
            KIND_TERMINATE if payload.is_empty() => Some(ControlMessage::Terminate),
            KIND_REMOVE_SESSION if payload.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&payload);
                Some(ControlMessage::RemoveSession(SessionId::from_u64(
                    u64::from_be_bytes(raw),
                )))
            }
            KIND_BROADCAST => Some(ControlMessage::Broadcast(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            KIND_PAUSE if payload.is_empty() => Some(ControlMessage::Pause),
            KIND_RESUME if payload.is_empty() => Some(ControlMessage::Resume),
            _ => None,
        }
    }
}

/// Create a connected control channel pair.
///
/// The handle goes to the control surface (console, signal handler); the
/// receiver goes to the reactor.
pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let (control_end, reactor_end) = tokio::io::duplex(CONTROL_BUFFER_SIZE);
    (
        ControlHandle {
            writer: Arc::new(Mutex::new(control_end)),
        },
        ControlReceiver {
            stream: reactor_end,
            pending: Vec::new(),
        },
    )
}

/// Cloneable sending side of the control channel.
///
/// All clones share one write lock, so a frame is always written whole and
/// two senders can never interleave their bytes.
#[derive(Clone)]
pub struct ControlHandle {
    writer: Arc<Mutex<DuplexStream>>,
}

impl ControlHandle {
    /// Send one message. Fails only when the channel itself is unusable,
    /// which callers must treat as unrecoverable.
    pub async fn send(&self, message: &ControlMessage) -> Result<(), ServerError> {
        let frame = message.encode();
        if frame.len() - HEADER_LEN > MAX_CONTROL_PAYLOAD {
            return Err(ServerError::ControlChannel(format!(
                "payload of {} bytes exceeds the {} byte limit",
                frame.len() - HEADER_LEN,
                MAX_CONTROL_PAYLOAD
            )));
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| ServerError::ControlChannel(format!("write failed: {}", e)))
    }

    /// Request full shutdown.
    pub async fn terminate(&self) -> Result<(), ServerError> {
        self.send(&ControlMessage::Terminate).await
    }

    /// Request removal of one session.
    pub async fn remove_session(&self, id: SessionId) -> Result<(), ServerError> {
        self.send(&ControlMessage::RemoveSession(id)).await
    }

    /// Send a text line to every live session.
    pub async fn broadcast(&self, text: impl Into<String>) -> Result<(), ServerError> {
        self.send(&ControlMessage::Broadcast(text.into())).await
    }

    /// Advisory pause for every live session.
    pub async fn pause(&self) -> Result<(), ServerError> {
        self.send(&ControlMessage::Pause).await
    }

    /// Advisory resume for every live session.
    pub async fn resume(&self) -> Result<(), ServerError> {
        self.send(&ControlMessage::Resume).await
    }
}

/// Receiving side of the control channel, owned by the reactor.
pub struct ControlReceiver {
    stream: DuplexStream,
    /// Bytes read from the stream but not yet parsed into a frame
    pending: Vec<u8>,
}

impl ControlReceiver {
    /// Read the next recognized message.
    ///
    /// Cancel-safe: a partially received frame stays in the receiver's
    /// buffer and is completed by a later call. Unrecognized or
    /// malformed-but-delimited frames are logged and skipped. A closed
    /// stream or a frame cut short by the stream closing is an error: the
    /// channel is supposed to outlive every sender.
    pub async fn recv(&mut self) -> Result<ControlMessage, ServerError> {
        loop {
            if let Some((kind, payload)) = self.next_frame()? {
                let len = payload.len();
                match ControlMessage::decode(kind, payload) {
                    Some(message) => return Ok(message),
                    None => {
                        warn!(
                            "Discarding unrecognized control frame (kind {}, {} payload bytes)",
                            kind, len
                        );
                        continue;
                    }
                }
            }

            let n = self
                .stream
                .read_buf(&mut self.pending)
                .await
                .map_err(|e| ServerError::ControlChannel(format!("read failed: {}", e)))?;
            if n == 0 {
                return Err(if self.pending.is_empty() {
                    ServerError::ControlChannel("channel closed".to_string())
                } else {
                    ServerError::ControlChannel("truncated frame at channel close".to_string())
                });
            }
        }
    }

    /// Detach one complete frame from the pending bytes, if one is there.
    fn next_frame(&mut self) -> Result<Option<(u8, Vec<u8>)>, ServerError> {
        if self.pending.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = self.pending[0];
        let len = u32::from_be_bytes([
            self.pending[1],
            self.pending[2],
            self.pending[3],
            self.pending[4],
        ]) as usize;
        if len > MAX_CONTROL_PAYLOAD {
            return Err(ServerError::ControlChannel(format!(
                "frame announces {} payload bytes, limit is {}",
                len, MAX_CONTROL_PAYLOAD
            )));
        }
        if self.pending.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let payload = self.pending[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.pending.drain(..HEADER_LEN + len);
        Ok(Some((kind, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn raw_receiver(stream: DuplexStream) -> ControlReceiver {
        ControlReceiver {
            stream,
            pending: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_every_kind() {
        let (handle, mut receiver) = control_channel();

        let messages = vec![
            ControlMessage::Terminate,
            ControlMessage::RemoveSession(SessionId::from_u64(0xdead_beef)),
            ControlMessage::Broadcast("server notice".to_string()),
            ControlMessage::Pause,
            ControlMessage::Resume,
        ];

        for message in &messages {
            handle.send(message).await.unwrap();
        }
        for expected in &messages {
            let received = receiver.recv().await.unwrap();
            assert_eq!(&received, expected);
        }
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (handle, mut receiver) = control_channel();

        for i in 0..10 {
            handle.broadcast(format!("message {}", i)).await.unwrap();
        }
        for i in 0..10 {
            match receiver.recv().await.unwrap() {
                ControlMessage::Broadcast(text) => assert_eq!(text, format!("message {}", i)),
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_is_skipped() {
        let (mut raw, reactor_end) = tokio::io::duplex(1024);
        let mut receiver = raw_receiver(reactor_end);

        // Kind 9 does not exist; the receiver must consume its payload and
        // deliver the following Terminate instead.
        raw.write_all(&[9, 0, 0, 0, 2, b'h', b'i']).await.unwrap();
        raw.write_all(&[KIND_TERMINATE, 0, 0, 0, 0]).await.unwrap();

        assert_eq!(receiver.recv().await.unwrap(), ControlMessage::Terminate);
    }

    #[tokio::test]
    async fn test_wrong_payload_size_is_skipped() {
        let (mut raw, reactor_end) = tokio::io::duplex(1024);
        let mut receiver = raw_receiver(reactor_end);

        // RemoveSession with a 4-byte payload is malformed
        raw.write_all(&[KIND_REMOVE_SESSION, 0, 0, 0, 4, 1, 2, 3, 4])
            .await
            .unwrap();
        raw.write_all(&[KIND_PAUSE, 0, 0, 0, 0]).await.unwrap();

        assert_eq!(receiver.recv().await.unwrap(), ControlMessage::Pause);
    }

    #[tokio::test]
    async fn test_split_frame_is_reassembled() {
        let (mut raw, reactor_end) = tokio::io::duplex(1024);
        let mut receiver = raw_receiver(reactor_end);

        // Deliver one Broadcast frame in three fragments
        raw.write_all(&[KIND_BROADCAST, 0, 0]).await.unwrap();
        raw.write_all(&[0, 5, b'h', b'e']).await.unwrap();
        raw.write_all(&[b'l', b'l', b'o']).await.unwrap();

        assert_eq!(
            receiver.recv().await.unwrap(),
            ControlMessage::Broadcast("hello".to_string())
        );
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (mut raw, reactor_end) = tokio::io::duplex(1024);
        let mut receiver = raw_receiver(reactor_end);

        // Header promises 10 payload bytes but only 3 arrive before the
        // writer goes away.
        raw.write_all(&[KIND_BROADCAST, 0, 0, 0, 10, b'a', b'b', b'c'])
            .await
            .unwrap();
        drop(raw);

        let result = receiver.recv().await;
        assert!(matches!(result, Err(ServerError::ControlChannel(_))));
    }

    #[tokio::test]
    async fn test_oversized_length_rejected_before_allocation() {
        let (mut raw, reactor_end) = tokio::io::duplex(1024);
        let mut receiver = raw_receiver(reactor_end);

        let bogus_len = (MAX_CONTROL_PAYLOAD as u32 + 1).to_be_bytes();
        let mut frame = vec![KIND_BROADCAST];
        frame.extend_from_slice(&bogus_len);
        raw.write_all(&frame).await.unwrap();

        let result = receiver.recv().await;
        assert!(matches!(result, Err(ServerError::ControlChannel(_))));
    }

    #[tokio::test]
    async fn test_closed_channel_is_an_error() {
        let (handle, receiver) = control_channel();
        drop(receiver);

        let result = handle.terminate().await;
        assert!(matches!(result, Err(ServerError::ControlChannel(_))));
    }

    #[tokio::test]
    async fn test_oversized_send_rejected() {
        let (handle, _receiver) = control_channel();

        let huge = "x".repeat(MAX_CONTROL_PAYLOAD + 1);
        let result = handle.broadcast(huge).await;
        assert!(matches!(result, Err(ServerError::ControlChannel(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_senders_never_interleave() {
        let (handle, mut receiver) = control_channel();

        let mut tasks = Vec::new();
        for sender in 0..4u32 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25u32 {
                    handle
                        .broadcast(format!("sender {} message {}", sender, i))
                        .await
                        .unwrap();
                }
            }));
        }

        let mut received = 0;
        while received < 100 {
            let message = timeout(Duration::from_secs(5), receiver.recv())
                .await
                .expect("receiver starved")
                .unwrap();
            match message {
                ControlMessage::Broadcast(text) => {
                    // Every frame must decode to one intact payload
                    assert!(text.starts_with("sender "), "interleaved frame: {}", text);
                    received += 1;
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }

        for task in tasks {
            task.await.unwrap();
        }
    }
}
