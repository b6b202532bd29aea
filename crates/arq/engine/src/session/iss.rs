//! Information Sending Station: the outbound half of a transfer.
//!
//! Created by a user command with the full payload in hand. The driver
//! opens the session, announces length and CRC, then emits bursts and
//! follows the receiver's ACK/NACK feedback until every byte is
//! acknowledged, closing with a stop exchange.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use strum::Display;
use tokio::time::{self, Duration};
use tracing::warn;

use arq_shared::callsign;
use arq_shared::crc::crc32_hex;
use arq_shared::events::{Event, TransferEvent};
use arq_shared::frames::{BurstFeedback, Frame, FrameBody};
use arq_shared::ids::SessionId;

use crate::dispatch::FrameMeta;
use crate::engine::Engine;
use crate::registry::RegistryError;
use crate::transmit::{Transmission, TransmitError};

use super::slot::{SignalFlag, Slot};
use super::speed::SpeedController;
use super::{Outcome, SessionFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IssState {
    New,
    OpenSent,
    InfoSent,
    Transferring,
    Failed,
    Ended,
    Disconnected,
}

impl IssState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IssState::Failed | IssState::Ended | IssState::Disconnected
        )
    }
}

#[derive(Debug)]
struct IssShared {
    state: IssState,
    snr: f32,
    dx_snr: f32,
    speed: SpeedController,
    frames_per_burst: u8,
    acked: usize,
}

/// Transfer parameters staged from the receiver's info ack.
struct InfoAck {
    speed_level: u8,
    frames_per_burst: u8,
}

/// Receiver verdict staged from a burst ack or nack.
enum Feedback {
    Ack(BurstFeedback),
    Nack(BurstFeedback),
}

enum Wake<T> {
    Event(T),
    Abort,
    Timeout,
}

pub struct IssSession {
    id: SessionId,
    dxcall: String,
    engine: Engine,
    payload: Bytes,
    shared: Mutex<IssShared>,
    open_ack: Slot<()>,
    info_ack: Slot<InfoAck>,
    feedback: Slot<Feedback>,
    stop_ack: Slot<()>,
    abort: SignalFlag,
}

impl IssSession {
    fn new(engine: Engine, dxcall: String, payload: Bytes, id: SessionId) -> Self {
        let frames_per_burst = engine.config.protocol.frames_per_burst;
        Self {
            id,
            dxcall,
            engine,
            payload,
            shared: Mutex::new(IssShared {
                state: IssState::New,
                snr: 0.0,
                dx_snr: 0.0,
                speed: SpeedController::new(),
                frames_per_burst,
                acked: 0,
            }),
            open_ack: Slot::new(),
            info_ack: Slot::new(),
            feedback: Slot::new(),
            stop_ack: Slot::new(),
            abort: SignalFlag::new(),
        }
    }

    /// Picks a fresh session id, registers the session and spawns its
    /// driver task.
    pub fn start(
        engine: &Engine,
        dxcall: impl Into<String>,
        payload: Bytes,
    ) -> Result<Arc<Self>, RegistryError> {
        let dxcall = dxcall.into();
        let dxcall = if dxcall.contains('-') {
            dxcall
        } else {
            callsign::with_ssid(&dxcall, 0)
        };

        let mut last_error = RegistryError::IdCollision(SessionId::UNSET);
        for _ in 0..8 {
            let id = SessionId::generate();
            let session = Arc::new(Self::new(
                engine.clone(),
                dxcall.clone(),
                payload.clone(),
                id,
            ));
            match engine.registry.register_iss(Arc::clone(&session)) {
                Ok(()) => {
                    tokio::spawn(Arc::clone(&session).run());
                    return Ok(session);
                }
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn dxcall(&self) -> &str {
        &self.dxcall
    }

    pub fn state(&self) -> IssState {
        self.shared().state
    }

    /// SNR of the peer's last frame, as measured locally.
    pub fn snr(&self) -> f32 {
        self.shared().snr
    }

    /// SNR of our signal, as reported by the peer.
    pub fn dx_snr(&self) -> f32 {
        self.shared().dx_snr
    }

    fn shared(&self) -> MutexGuard<'_, IssShared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: IssState) {
        let mut shared = self.shared();
        if shared.state.is_terminal() || shared.state == next {
            return;
        }
        tracing::debug!(session = %self.id, state = %next, "outbound session state");
        shared.state = next;
    }

    fn note_snr(&self, meta: &FrameMeta) {
        self.shared().snr = meta.snr;
    }

    pub fn on_open_ack_received(&self, frame: Frame, meta: &FrameMeta) {
        if self.state() != IssState::OpenSent {
            warn!(session = %self.id, "discarding open ack out of phase");
            return;
        }
        self.note_snr(meta);
        if let Some(snr) = frame.snr {
            self.shared().dx_snr = snr;
        }
        self.open_ack.put(());
    }

    pub fn on_info_ack_received(&self, frame: Frame, meta: &FrameMeta) {
        if self.state() != IssState::InfoSent {
            warn!(session = %self.id, "discarding info ack out of phase");
            return;
        }
        let frame_type = frame.frame_type();
        let FrameBody::SessionInfoAck {
            speed_level,
            frames_per_burst,
            ..
        } = frame.body
        else {
            warn!(session = %self.id, %frame_type, "expected an info ack frame");
            return;
        };
        self.note_snr(meta);
        self.info_ack.put(InfoAck {
            speed_level,
            frames_per_burst,
        });
    }

    /// Both ACK and NACK land here; the driver tells them apart.
    pub fn on_burst_feedback_received(&self, frame: Frame, meta: &FrameMeta) {
        if self.state() != IssState::Transferring {
            warn!(session = %self.id, "discarding burst feedback out of phase");
            return;
        }
        let frame_type = frame.frame_type();
        match frame.body {
            FrameBody::BurstAck(feedback) => {
                self.note_snr(meta);
                self.feedback.put(Feedback::Ack(feedback));
            }
            FrameBody::BurstNack(feedback) => {
                self.note_snr(meta);
                self.feedback.put(Feedback::Nack(feedback));
            }
            _ => warn!(session = %self.id, %frame_type, "expected a burst ack or nack frame"),
        }
    }

    pub fn on_stop_ack_received(&self, meta: &FrameMeta) {
        self.note_snr(meta);
        self.stop_ack.put(());
    }

    /// External cancellation; the driver winds down at its next wakeup.
    pub fn abort(&self) {
        self.set_state(IssState::Disconnected);
        self.abort.set();
    }

    async fn run(self: Arc<Self>) {
        let outcome = match self.drive().await {
            Ok(Outcome::Completed) => IssState::Ended,
            Ok(Outcome::Disconnected) => IssState::Disconnected,
            Err(failure) => {
                warn!(session = %self.id, error = %failure, "outbound session failed");
                IssState::Failed
            }
        };
        self.set_state(outcome);

        let (success, bytes_transferred) = {
            let shared = self.shared();
            (shared.state == IssState::Ended, shared.acked as u32)
        };
        self.engine
            .events
            .broadcast(Event::ArqTransferOutbound(TransferEvent {
                session_id: self.id,
                dxcall: self.dxcall.clone(),
                success,
                bytes_transferred,
                data: None,
            }));
        self.engine.registry.remove_iss(self.id);
    }

    async fn drive(&self) -> Result<Outcome, SessionFailure> {
        let protocol = self.engine.config.protocol.clone();

        // Open
        let mut opened = false;
        for _ in 0..protocol.retries_connect {
            self.send_open().await?;
            self.set_state(IssState::OpenSent);
            match self
                .wait_slot(&self.open_ack, protocol.timeout_connect)
                .await
            {
                Wake::Event(()) => {
                    opened = true;
                    break;
                }
                Wake::Timeout => continue,
                Wake::Abort => return Ok(Outcome::Disconnected),
            }
        }
        if !opened {
            return Err(SessionFailure::RetriesExhausted("session open"));
        }

        // Info
        let total_length = self.payload.len() as u32;
        let total_crc = crc32_hex(&self.payload);
        let mut negotiated = false;
        for _ in 0..protocol.retries_connect {
            self.send_info(total_length, &total_crc).await?;
            self.set_state(IssState::InfoSent);
            match self
                .wait_slot(&self.info_ack, protocol.timeout_connect)
                .await
            {
                Wake::Event(ack) => {
                    let mut shared = self.shared();
                    shared.speed.adopt(ack.speed_level);
                    shared.frames_per_burst = ack.frames_per_burst.max(1);
                    negotiated = true;
                    break;
                }
                Wake::Timeout => continue,
                Wake::Abort => return Ok(Outcome::Disconnected),
            }
        }
        if !negotiated {
            return Err(SessionFailure::RetriesExhausted("session info"));
        }

        // Transfer
        self.set_state(IssState::Transferring);
        let total = self.payload.len();
        let table = &self.engine.config.speed;
        let mut offset = 0usize;
        let mut retries = protocol.retries_transfer;
        while offset < total {
            let (level, frames_per_burst) = {
                let shared = self.shared();
                (shared.speed.level(), shared.frames_per_burst)
            };
            let mode = table.mode_at(level);
            let chunk = table.chunk_len(level);

            let mut cursor = offset;
            for _ in 0..frames_per_burst {
                if cursor >= total {
                    break;
                }
                let end = (cursor + chunk).min(total);
                let frame = Frame::new(FrameBody::BurstData {
                    offset: cursor as u32,
                    data: self.payload.slice(cursor..end),
                })
                .with_session(self.id);
                self.engine
                    .transmit
                    .enqueue(Transmission::burst(mode, frame))
                    .await?;
                cursor = end;
            }

            match self.wait_slot(&self.feedback, protocol.timeout_data).await {
                Wake::Event(Feedback::Ack(feedback)) => {
                    offset = self.adopt_feedback(&feedback, total);
                    retries = protocol.retries_transfer;
                }
                Wake::Event(Feedback::Nack(feedback)) => {
                    // the receiver's count is authoritative
                    offset = self.adopt_feedback(&feedback, total);
                    retries -= 1;
                    if retries == 0 {
                        return Err(SessionFailure::RetriesExhausted("burst transfer"));
                    }
                }
                Wake::Timeout => {
                    retries -= 1;
                    if retries == 0 {
                        return Err(SessionFailure::RetriesExhausted("burst transfer"));
                    }
                }
                Wake::Abort => return Ok(Outcome::Disconnected),
            }
        }

        // Stop
        self.send_stop().await?;
        match self
            .wait_slot(&self.stop_ack, protocol.timeout_connect)
            .await
        {
            Wake::Event(()) | Wake::Timeout => {}
            Wake::Abort => return Ok(Outcome::Disconnected),
        }
        Ok(Outcome::Completed)
    }

    /// Applies receiver feedback and returns the new transfer offset.
    fn adopt_feedback(&self, feedback: &BurstFeedback, total: usize) -> usize {
        let offset = (feedback.received_bytes as usize).min(total);
        let mut shared = self.shared();
        shared.speed.adopt(feedback.speed_level);
        shared.frames_per_burst = feedback.frames_per_burst.max(1);
        shared.acked = offset;
        offset
    }

    async fn wait_slot<T>(&self, slot: &Slot<T>, timeout: Duration) -> Wake<T> {
        tokio::select! {
            _ = self.abort.triggered() => Wake::Abort,
            event = slot.recv() => Wake::Event(event),
            _ = time::sleep(timeout) => Wake::Timeout,
        }
    }

    async fn send_open(&self) -> Result<(), TransmitError> {
        let station = &self.engine.config.station;
        let frame = Frame::new(FrameBody::SessionOpen {
            version: self.engine.config.protocol.version,
        })
        .with_session(self.id)
        .with_origin(station.call_with_ssid())
        .with_destination_crc(callsign::checksum(&self.dxcall));
        self.transmit_control(frame).await
    }

    async fn send_info(&self, total_length: u32, total_crc: &str) -> Result<(), TransmitError> {
        let snr = self.shared().snr;
        let frame = Frame::new(FrameBody::SessionInfo {
            total_length,
            total_crc: total_crc.to_string(),
        })
        .with_session(self.id)
        .with_snr(snr);
        self.transmit_control(frame).await
    }

    async fn send_stop(&self) -> Result<(), TransmitError> {
        let frame = Frame::new(FrameBody::Stop).with_session(self.id);
        self.transmit_control(frame).await
    }

    async fn transmit_control(&self, frame: Frame) -> Result<(), TransmitError> {
        self.engine.transmit.enqueue(Transmission::control(frame)).await
    }
}
