//! Client connection handling: session identity, per-session state and the
//! shared session registry.

pub mod registry;
pub mod session;

pub use registry::{SessionInfo, SessionRegistry};
pub use session::{ClientSession, ReadOutcome};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide source of session ids. Starts at 1 so 0 can never name a
/// live session.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one client session.
///
/// Ids are monotonic for the lifetime of the process and are never reused,
/// even after the session they named is gone. They render as lowercase hex,
/// which is also the form operators type into the admin console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next id.
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild an id from its raw value, e.g. one received over the
    /// control channel.
    pub fn from_u64(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse the hex form produced by [`fmt::Display`].
    pub fn parse_hex(text: &str) -> Option<Self> {
        u64::from_str_radix(text.trim(), 16).ok().map(SessionId)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_monotonic() {
        let first = SessionId::next();
        let second = SessionId::next();
        let third = SessionId::next();
        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn test_display_and_parse_round_trip() {
        let id = SessionId::from_u64(0xdead_beef);
        assert_eq!(id.to_string(), "deadbeef");
        assert_eq!(SessionId::parse_hex("deadbeef"), Some(id));
        assert_eq!(SessionId::parse_hex(" deadbeef \n"), Some(id));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(SessionId::parse_hex("not hex"), None);
        assert_eq!(SessionId::parse_hex(""), None);
        assert_eq!(SessionId::parse_hex("1ffffffffffffffff"), None);
    }
}
