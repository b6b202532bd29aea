//! Session identity shared between both sides of a transfer.
//!
//! A session identifier is a single byte naming an in-flight transfer on
//! both peers; zero is reserved for "unassigned". The sending station picks
//! a fresh id at open time. The generator mixes unix time with an
//! incrementing counter instead of pulling in an RNG; ids only need to be
//! unlikely to collide with the handful of sessions alive at once, and the
//! registry rejects collisions anyway.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// One-byte session identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u8);

impl SessionId {
    /// Reserved "unassigned" value.
    pub const UNSET: SessionId = SessionId(0);

    /// Picks a fresh non-zero id.
    ///
    /// Mixes (unix_time_nanos ^ rotated counter) and folds the result down
    /// to one byte. Not unpredictable, just collision-averse.
    pub fn generate() -> Self {
        loop {
            let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed) as u128;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();

            let mixed = now ^ counter.rotate_left(17);
            let folded = mixed
                .to_le_bytes()
                .iter()
                .fold(0u8, |acc, b| acc ^ b);
            if folded != 0 {
                return SessionId(folded);
            }
        }
    }

    /// Wraps a raw byte (no validation; 0 means unset).
    pub const fn from_raw(raw: u8) -> Self {
        SessionId(raw)
    }

    /// Returns the raw byte value.
    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl From<u8> for SessionId {
    fn from(raw: u8) -> Self {
        SessionId(raw)
    }
}

impl From<SessionId> for u8 {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_never_returns_unset() {
        for _ in 0..1000 {
            assert!(!SessionId::generate().is_unset());
        }
    }

    #[test]
    fn raw_roundtrip() {
        let id = SessionId::from_raw(42);
        assert_eq!(id.value(), 42);
        assert_eq!(u8::from(id), 42);
        assert_eq!(SessionId::from(42u8), id);
    }

    #[test]
    fn zero_is_unset() {
        assert!(SessionId::UNSET.is_unset());
        assert!(SessionId::from_raw(0).is_unset());
        assert!(!SessionId::from_raw(1).is_unset());
    }
}
