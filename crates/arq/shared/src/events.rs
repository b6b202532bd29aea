//! Event records broadcast to embedding applications, and the bus that
//! fans them out.
//!
//! Every decoded frame the dispatcher accepts produces a `frame-handler`
//! record; each session broadcasts an `arq-transfer-*` lifecycle record
//! when it reaches a terminal state. Subscribers receive events over
//! unbounded channels; a lagging or dropped subscriber never blocks the
//! engine.

use std::{
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::frames::{Frame, FrameType};
use crate::ids::SessionId;

/// Seconds since the unix epoch, for event timestamps.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Record emitted for every frame accepted by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHandlerEvent {
    pub received: FrameType,
    pub timestamp: u64,
    pub mycallsign: String,
    pub myssid: u8,
    pub snr: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dxcallsign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gridsquare: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_kilometers: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_from_key: Option<bool>,
}

/// Lifecycle record of a transfer, emitted at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub session_id: SessionId,
    pub dxcall: String,
    pub success: bool,
    pub bytes_transferred: u32,
    /// Completed inbound transfers carry the assembled payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

/// Everything the engine publishes on the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    FrameHandler(FrameHandlerEvent),
    ArqTransferOutbound(TransferEvent),
    ArqTransferInbound(TransferEvent),
    /// Test-mode transmissions bypass the modem and surface here instead.
    FrameTransmitted { frame: Frame },
}

/// Fan-out bus for [`Event`]s.
///
/// Cloning is cheap; all clones share the subscriber list. Closed
/// subscribers are pruned on the next broadcast.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: Event) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}
