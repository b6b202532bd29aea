//! ARQ transfer engine.
//!
//! The engine moves arbitrary binary payloads between two stations over a
//! narrowband half-duplex radio channel with heavy frame loss. Incoming
//! decoded frames enter through the [`dispatch::FrameHandler`], which
//! validates addressing, enriches the frame from the station store and
//! routes it to the owning session. Each live session runs one driver task
//! that walks the handshake/transfer state machine and hands outbound
//! frames to the modem through a bounded [`transmit::TransmitQueue`].

pub mod dispatch;
pub mod engine;
pub mod p2p;
pub mod registry;
pub mod session;
pub mod station;
pub mod transmit;

pub mod prelude {
    pub use super::dispatch::{FrameHandler, FrameMeta, Route};
    pub use super::engine::Engine;
    pub use super::p2p::P2pEndpoint;
    pub use super::registry::{RegistryError, SessionRegistry};
    pub use super::session::{IrsSession, IrsState, IssSession, IssState, SessionFailure};
    pub use super::station::{MemoryStationStore, StationRecord, StationStore};
    pub use super::transmit::{Transmission, TransmitError, TransmitQueue};
}
