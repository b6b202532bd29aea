//! Information Receiving Station: the inbound half of a transfer.
//!
//! Created by the frame handler when a validated session-open arrives.
//! The driver acknowledges the open, waits for the transfer parameters,
//! then loops receiving bursts until the payload is complete or the retry
//! budget is gone, and finally verifies the end-to-end CRC.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use strum::Display;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use arq_shared::callsign;
use arq_shared::crc::crc32_hex;
use arq_shared::events::{Event, TransferEvent};
use arq_shared::frames::{BurstFeedback, Frame, FrameBody};
use arq_shared::ids::SessionId;
use tokio::sync::Notify;

use crate::dispatch::FrameMeta;
use crate::engine::Engine;
use crate::registry::RegistryError;
use crate::transmit::{Transmission, TransmitError};

use super::slot::{SignalFlag, Slot};
use super::speed::SpeedController;
use super::{Outcome, SessionFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IrsState {
    ConnReqReceived,
    WaitingInfo,
    WaitingData,
    Failed,
    Ended,
    Disconnected,
}

impl IrsState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IrsState::Failed | IrsState::Ended | IrsState::Disconnected
        )
    }
}

/// Payload assembly state. Bursts are accepted strictly in order; the
/// final frame may carry more bytes than remain and is truncated.
#[derive(Debug)]
struct Inbound {
    buffer: Vec<u8>,
    received: usize,
    expected_crc: String,
}

impl Inbound {
    fn new(total_length: usize, expected_crc: String) -> Self {
        Self {
            buffer: vec![0; total_length],
            received: 0,
            expected_crc,
        }
    }

    fn complete(&self) -> bool {
        self.received == self.buffer.len()
    }

    /// Copies a burst into the buffer if it starts exactly at the current
    /// write position. Returns whether the burst was accepted.
    fn apply(&mut self, offset: u32, data: &[u8]) -> bool {
        if offset as usize != self.received {
            return false;
        }
        let take = (self.buffer.len() - self.received).min(data.len());
        self.buffer[self.received..self.received + take].copy_from_slice(&data[..take]);
        self.received += take;
        true
    }

    fn crc_ok(&self) -> bool {
        crc32_hex(&self.buffer) == self.expected_crc
    }
}

#[derive(Debug)]
struct IrsShared {
    state: IrsState,
    snr: f32,
    dx_snr: f32,
    speed: SpeedController,
    frames_per_burst: u8,
    inbound: Option<Inbound>,
}

/// Transfer parameters staged from the peer's session-info frame.
struct InfoParams {
    total_length: u32,
    total_crc: String,
    dx_snr: Option<f32>,
}

/// One staged burst frame.
struct BurstChunk {
    offset: u32,
    data: Bytes,
}

enum InfoWake {
    Info(InfoParams),
    Reopen,
    Stop,
    Abort,
    Timeout,
}

enum DataWake {
    Data(BurstChunk),
    Stop,
    Abort,
    Timeout,
}

pub struct IrsSession {
    id: SessionId,
    dxcall: String,
    mycall: String,
    engine: Engine,
    shared: Mutex<IrsShared>,
    info: Slot<InfoParams>,
    data: Slot<BurstChunk>,
    reopen: Notify,
    stop: SignalFlag,
    abort: SignalFlag,
}

impl IrsSession {
    fn new(engine: Engine, dxcall: String, mycall: String, id: SessionId, snr: f32) -> Self {
        let frames_per_burst = engine.config.protocol.frames_per_burst;
        Self {
            id,
            dxcall,
            mycall,
            engine,
            shared: Mutex::new(IrsShared {
                state: IrsState::ConnReqReceived,
                snr,
                dx_snr: 0.0,
                speed: SpeedController::new(),
                frames_per_burst,
                inbound: None,
            }),
            info: Slot::new(),
            data: Slot::new(),
            reopen: Notify::new(),
            stop: SignalFlag::new(),
            abort: SignalFlag::new(),
        }
    }

    /// Registers the session and spawns its driver task.
    pub fn start(
        engine: &Engine,
        dxcall: impl Into<String>,
        mycall: impl Into<String>,
        id: SessionId,
        snr: f32,
    ) -> Result<Arc<Self>, RegistryError> {
        let session = Arc::new(Self::new(
            engine.clone(),
            dxcall.into(),
            mycall.into(),
            id,
            snr,
        ));
        engine.registry.register_irs(Arc::clone(&session))?;
        tokio::spawn(Arc::clone(&session).run());
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn dxcall(&self) -> &str {
        &self.dxcall
    }

    pub fn state(&self) -> IrsState {
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

    fn shared(&self) -> MutexGuard<'_, IrsShared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: IrsState) {
        let mut shared = self.shared();
        if shared.state.is_terminal() || shared.state == next {
            return;
        }
        debug!(session = %self.id, state = %next, "inbound session state");
        shared.state = next;
    }

    fn note_snr(&self, meta: &FrameMeta) {
        self.shared().snr = meta.snr;
    }

    /// A retransmitted session-open arrived; make the driver re-ack it.
    pub fn on_open_received(&self, meta: &FrameMeta) {
        self.note_snr(meta);
        self.reopen.notify_one();
    }

    pub fn on_info_received(&self, frame: Frame, meta: &FrameMeta) {
        if self.state() != IrsState::WaitingInfo {
            warn!(session = %self.id, "discarding received session info");
            return;
        }
        let frame_type = frame.frame_type();
        let dx_snr = frame.snr;
        let FrameBody::SessionInfo {
            total_length,
            total_crc,
        } = frame.body
        else {
            warn!(session = %self.id, %frame_type, "expected a session info frame");
            return;
        };
        self.note_snr(meta);
        self.info.put(InfoParams {
            total_length,
            total_crc,
            dx_snr,
        });
    }

    pub fn on_data_received(&self, frame: Frame, meta: &FrameMeta) {
        let state = self.state();
        if state != IrsState::WaitingData {
            warn!(session = %self.id, %state, "received data out of phase, ignoring");
            return;
        }
        let frame_type = frame.frame_type();
        let FrameBody::BurstData { offset, data } = frame.body else {
            warn!(session = %self.id, %frame_type, "expected a burst data frame");
            return;
        };
        self.note_snr(meta);
        self.data.put(BurstChunk { offset, data });
    }

    pub fn on_stop_received(&self) {
        self.stop.set();
    }

    /// External cancellation; the driver winds down at its next wakeup.
    pub fn abort(&self) {
        self.set_state(IrsState::Disconnected);
        self.abort.set();
    }

    async fn run(self: Arc<Self>) {
        let outcome = match self.drive().await {
            Ok(Outcome::Completed) => IrsState::Ended,
            Ok(Outcome::Disconnected) => IrsState::Disconnected,
            Err(failure) => {
                warn!(session = %self.id, error = %failure, "inbound session failed");
                IrsState::Failed
            }
        };
        self.set_state(outcome);

        let (success, bytes_transferred, data) = {
            let shared = self.shared();
            let success = shared.state == IrsState::Ended;
            let bytes = shared
                .inbound
                .as_ref()
                .map(|inbound| inbound.received as u32)
                .unwrap_or(0);
            let data = if success {
                shared
                    .inbound
                    .as_ref()
                    .map(|inbound| Bytes::from(inbound.buffer.clone()))
            } else {
                None
            };
            (success, bytes, data)
        };
        self.engine
            .events
            .broadcast(Event::ArqTransferInbound(TransferEvent {
                session_id: self.id,
                dxcall: self.dxcall.clone(),
                success,
                bytes_transferred,
                data,
            }));
        self.engine.registry.remove_irs(self.id);
    }

    async fn drive(&self) -> Result<Outcome, SessionFailure> {
        let protocol = self.engine.config.protocol.clone();

        // Handshake (session)
        if !matches!(
            self.state(),
            IrsState::ConnReqReceived | IrsState::WaitingInfo
        ) {
            return Err(SessionFailure::OutOfPhase);
        }
        self.send_open_ack().await?;
        self.set_state(IrsState::WaitingInfo);

        // Handshake (info)
        let deadline = Instant::now() + protocol.timeout_connect;
        let info = loop {
            match self.wait_info(deadline).await {
                InfoWake::Info(info) => break info,
                InfoWake::Reopen => self.send_open_ack().await?,
                InfoWake::Stop => {
                    self.send_stop_ack().await?;
                    return Ok(Outcome::Disconnected);
                }
                InfoWake::Abort => return Ok(Outcome::Disconnected),
                InfoWake::Timeout => return Err(SessionFailure::Timeout("session info")),
            }
        };

        {
            let mut shared = self.shared();
            shared.dx_snr = info.dx_snr.unwrap_or_default();
            // Half duplex: both directions must sustain the chosen mode.
            let link_snr = shared.snr.min(shared.dx_snr);
            shared.speed.startup(&self.engine.config.speed, link_snr);
            shared.inbound = Some(Inbound::new(info.total_length as usize, info.total_crc));
        }
        self.send_info_ack().await?;
        self.set_state(IrsState::WaitingData);

        // Receive loop
        let total_retries = protocol.retries_transfer;
        let mut retries = total_retries;
        while retries > 0 && !self.all_received() {
            match self.wait_data(protocol.timeout_data).await {
                DataWake::Data(chunk) => {
                    self.process_burst(chunk.offset, &chunk.data);
                    self.send_burst_feedback(true).await?;
                    retries = total_retries;
                }
                DataWake::Timeout => {
                    let consumed = total_retries - retries + 1;
                    self.shared().speed.on_timeout(consumed);
                    self.send_burst_feedback(false).await?;
                }
                DataWake::Stop => {
                    self.send_stop_ack().await?;
                    return Ok(Outcome::Disconnected);
                }
                DataWake::Abort => return Ok(Outcome::Disconnected),
            }
            retries -= 1;
        }

        if self.all_received() {
            let crc_ok = self
                .shared()
                .inbound
                .as_ref()
                .map(Inbound::crc_ok)
                .unwrap_or(false);
            if crc_ok {
                Ok(Outcome::Completed)
            } else {
                warn!(session = %self.id, "final payload CRC check failed");
                Err(SessionFailure::IntegrityCheck)
            }
        } else {
            Err(SessionFailure::RetriesExhausted("burst transfer"))
        }
    }

    fn all_received(&self) -> bool {
        self.shared()
            .inbound
            .as_ref()
            .map(Inbound::complete)
            .unwrap_or(false)
    }

    fn process_burst(&self, offset: u32, data: &[u8]) {
        let mut shared = self.shared();
        let snr = shared.snr;
        let accepted = match shared.inbound.as_mut() {
            Some(inbound) => inbound.apply(offset, data),
            None => return,
        };
        if accepted {
            let margin = self.engine.config.protocol.speed_up_snr_margin;
            shared
                .speed
                .on_good_burst(&self.engine.config.speed, margin, snr);
        } else {
            let expected = shared
                .inbound
                .as_ref()
                .map(|inbound| inbound.received)
                .unwrap_or(0);
            info!(session = %self.id, offset, expected, "discarding burst with wrong offset");
        }
    }

    async fn wait_info(&self, deadline: Instant) -> InfoWake {
        tokio::select! {
            _ = self.abort.triggered() => InfoWake::Abort,
            _ = self.stop.triggered() => InfoWake::Stop,
            _ = self.reopen.notified() => InfoWake::Reopen,
            info = self.info.recv() => InfoWake::Info(info),
            _ = time::sleep_until(deadline) => InfoWake::Timeout,
        }
    }

    async fn wait_data(&self, timeout: Duration) -> DataWake {
        tokio::select! {
            _ = self.abort.triggered() => DataWake::Abort,
            _ = self.stop.triggered() => DataWake::Stop,
            chunk = self.data.recv() => DataWake::Data(chunk),
            _ = time::sleep(timeout) => DataWake::Timeout,
        }
    }

    async fn send_open_ack(&self) -> Result<(), TransmitError> {
        let (snr, version) = (self.shared().snr, self.engine.config.protocol.version);
        let frame = Frame::new(FrameBody::SessionOpenAck { version })
            .with_session(self.id)
            .with_origin(self.mycall.clone())
            .with_destination_crc(callsign::checksum(&self.dxcall))
            .with_snr(snr);
        self.transmit_control(frame).await
    }

    async fn send_info_ack(&self) -> Result<(), TransmitError> {
        let (total_crc, speed_level, frames_per_burst, snr) = {
            let shared = self.shared();
            (
                shared
                    .inbound
                    .as_ref()
                    .map(|inbound| inbound.expected_crc.clone())
                    .unwrap_or_default(),
                shared.speed.level(),
                shared.frames_per_burst,
                shared.snr,
            )
        };
        let frame = Frame::new(FrameBody::SessionInfoAck {
            total_crc,
            speed_level,
            frames_per_burst,
        })
        .with_session(self.id)
        .with_snr(snr);
        self.transmit_control(frame).await
    }

    async fn send_burst_feedback(&self, ack: bool) -> Result<(), TransmitError> {
        let (received_bytes, speed_level, frames_per_burst, snr) = {
            let shared = self.shared();
            (
                shared
                    .inbound
                    .as_ref()
                    .map(|inbound| inbound.received as u32)
                    .unwrap_or(0),
                shared.speed.level(),
                shared.frames_per_burst,
                shared.snr,
            )
        };
        let feedback = BurstFeedback {
            received_bytes,
            speed_level,
            frames_per_burst,
        };
        let body = if ack {
            FrameBody::BurstAck(feedback)
        } else {
            FrameBody::BurstNack(feedback)
        };
        let frame = Frame::new(body).with_session(self.id).with_snr(snr);
        self.transmit_control(frame).await
    }

    async fn send_stop_ack(&self) -> Result<(), TransmitError> {
        let frame = Frame::new(FrameBody::StopAck).with_session(self.id);
        self.transmit_control(frame).await
    }

    async fn transmit_control(&self, frame: Frame) -> Result<(), TransmitError> {
        self.engine.transmit.enqueue(Transmission::control(frame)).await
    }
}
