//! Shared protocol types for the ARQ transfer engine.
//!
//! This crate gathers the reusable building blocks (frame model, session
//! identifiers, callsign addressing, CRC helpers, codec-mode tables,
//! configuration, event records) consumed by the engine crate. The most
//! commonly used types are re-exported through the `prelude` module.

pub mod callsign;
pub mod config;
pub mod crc;
pub mod events;
pub mod frames;
pub mod ids;
pub mod modes;

pub mod prelude {
    pub use super::callsign;
    pub use super::config::*;
    pub use super::crc::{crc16, crc32, crc32_hex};
    pub use super::events::*;
    pub use super::frames::*;
    pub use super::ids::*;
    pub use super::modes::*;
}
