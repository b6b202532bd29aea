//! Decoded frame model.
//!
//! The wire codec lives outside this crate; what circulates here is the
//! decoded record: a handful of optional addressing fields shared by every
//! frame type, plus a tagged body carrying the type-specific payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ids::SessionId;

/// Placeholder gridsquare for stations with unknown location.
pub const UNKNOWN_GRIDSQUARE: &str = "------";

/// Closed set of frame types handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    ArqSessionOpen,
    ArqSessionOpenAck,
    ArqSessionInfo,
    ArqSessionInfoAck,
    ArqBurstFrame,
    ArqBurstAck,
    ArqBurstNack,
    ArqStop,
    ArqStopAck,
    Ping,
    PingAck,
    P2pConnectionConnect,
    P2pConnectionConnectAck,
    P2pConnectionPayload,
    P2pConnectionPayloadAck,
    P2pConnectionDisconnect,
    P2pConnectionDisconnectAck,
}

/// Flag bits a frame may carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFlags {
    pub away_from_key: bool,
}

/// Burst acknowledgement payload, shared by ACK and NACK.
///
/// `received_bytes` is the receiver's authoritative count of contiguous
/// bytes accepted so far; the sender resumes from it on either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstFeedback {
    pub received_bytes: u32,
    pub speed_level: u8,
    pub frames_per_burst: u8,
}

/// Type-specific frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameBody {
    SessionOpen {
        version: u8,
    },
    SessionOpenAck {
        version: u8,
    },
    SessionInfo {
        total_length: u32,
        /// CRC-32 over the full payload, 8 lowercase hex chars.
        total_crc: String,
    },
    SessionInfoAck {
        total_crc: String,
        speed_level: u8,
        frames_per_burst: u8,
    },
    BurstData {
        offset: u32,
        data: Bytes,
    },
    BurstAck(BurstFeedback),
    BurstNack(BurstFeedback),
    Stop,
    StopAck,
    Ping,
    PingAck,
    P2pConnect,
    P2pConnectAck,
    P2pPayload {
        data: Bytes,
    },
    P2pPayloadAck,
    P2pDisconnect,
    P2pDisconnectAck,
}

/// A decoded frame: common optional fields plus the tagged body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Option<String>,
    pub origin_crc: Option<u16>,
    pub destination_crc: Option<u16>,
    pub session_id: Option<SessionId>,
    pub snr: Option<f32>,
    pub gridsquare: Option<String>,
    pub flags: Option<FrameFlags>,
    pub body: FrameBody,
}

impl Frame {
    pub fn new(body: FrameBody) -> Self {
        Self {
            origin: None,
            origin_crc: None,
            destination_crc: None,
            session_id: None,
            snr: None,
            gridsquare: None,
            flags: None,
            body,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_origin_crc(mut self, crc: u16) -> Self {
        self.origin_crc = Some(crc);
        self
    }

    pub fn with_destination_crc(mut self, crc: u16) -> Self {
        self.destination_crc = Some(crc);
        self
    }

    pub fn with_session(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn with_snr(mut self, snr: f32) -> Self {
        self.snr = Some(snr);
        self
    }

    pub fn with_gridsquare(mut self, gridsquare: impl Into<String>) -> Self {
        self.gridsquare = Some(gridsquare.into());
        self
    }

    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Discriminant of the body, for routing and logging.
    pub fn frame_type(&self) -> FrameType {
        match &self.body {
            FrameBody::SessionOpen { .. } => FrameType::ArqSessionOpen,
            FrameBody::SessionOpenAck { .. } => FrameType::ArqSessionOpenAck,
            FrameBody::SessionInfo { .. } => FrameType::ArqSessionInfo,
            FrameBody::SessionInfoAck { .. } => FrameType::ArqSessionInfoAck,
            FrameBody::BurstData { .. } => FrameType::ArqBurstFrame,
            FrameBody::BurstAck(_) => FrameType::ArqBurstAck,
            FrameBody::BurstNack(_) => FrameType::ArqBurstNack,
            FrameBody::Stop => FrameType::ArqStop,
            FrameBody::StopAck => FrameType::ArqStopAck,
            FrameBody::Ping => FrameType::Ping,
            FrameBody::PingAck => FrameType::PingAck,
            FrameBody::P2pConnect => FrameType::P2pConnectionConnect,
            FrameBody::P2pConnectAck => FrameType::P2pConnectionConnectAck,
            FrameBody::P2pPayload { .. } => FrameType::P2pConnectionPayload,
            FrameBody::P2pPayloadAck => FrameType::P2pConnectionPayloadAck,
            FrameBody::P2pDisconnect => FrameType::P2pConnectionDisconnect,
            FrameBody::P2pDisconnectAck => FrameType::P2pConnectionDisconnectAck,
        }
    }

    pub fn away_from_key(&self) -> Option<bool> {
        self.flags.map(|f| f.away_from_key)
    }
}
