//! ARQ session state machines.
//!
//! Each live session owns one driver task. The sending side (ISS) walks
//! open → info → burst loop → stop; the receiving side (IRS) mirrors it.
//! Drivers suspend only while waiting for a staged frame or a timeout;
//! state is mutated between suspension points only.

mod irs;
mod iss;
mod slot;
mod speed;

pub use irs::{IrsSession, IrsState};
pub use iss::{IssSession, IssState};

use thiserror::Error;

use crate::transmit::TransmitError;

/// Why a driver gave up. Every variant ends the session in `Failed`.
#[derive(Debug, Error)]
pub enum SessionFailure {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("retries exhausted during {0}")]
    RetriesExhausted(&'static str),
    #[error("payload integrity check failed")]
    IntegrityCheck,
    #[error("handshake attempted out of phase")]
    OutOfPhase,
    #[error(transparent)]
    Transmit(#[from] TransmitError),
}

/// How a driver ended without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Disconnected,
}
