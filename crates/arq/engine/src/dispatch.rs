//! Frame handler: validation, enrichment and routing of inbound frames.
//!
//! Every decoded frame from the modem lands here with its channel
//! metadata. The handler decides whether the frame addresses this station
//! or one of its live sessions, backfills missing origin/gridsquare
//! information from the registry and station store, applies the blacklist
//! and hands the frame to the right collaborator. A frame that is not for
//! us is dropped quietly; enrichment misses never stop delivery.

use std::sync::Arc;

use tracing::{debug, info, warn};

use arq_shared::callsign;
use arq_shared::events::{unix_timestamp, Event, FrameHandlerEvent};
use arq_shared::frames::{Frame, FrameBody, FrameType, UNKNOWN_GRIDSQUARE};

use crate::engine::Engine;
use crate::p2p::P2pEndpoint;
use crate::session::{IrsSession, IssSession};
use crate::transmit::Transmission;

/// Channel measurements attached to a decoded frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMeta {
    pub snr: f32,
    pub frequency_offset: f32,
}

impl FrameMeta {
    pub fn new(snr: f32, frequency_offset: f32) -> Self {
        Self {
            snr,
            frequency_offset,
        }
    }
}

/// Which check a frame type must pass before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `destination_crc` must hash to one of our callsign/SSID combos.
    LocalCallsign,
    /// `session_id` must name a live inbound session.
    IrsSession,
    /// `session_id` must name a live outbound session.
    IssSession,
    /// `session_id` must name a registered P2P endpoint.
    P2pSession,
}

/// Validation table keyed by frame type.
pub fn route(frame_type: FrameType) -> Route {
    use FrameType::*;
    match frame_type {
        ArqSessionOpen | ArqSessionOpenAck | Ping | PingAck | P2pConnectionConnect => {
            Route::LocalCallsign
        }
        ArqSessionInfo | ArqBurstFrame | ArqStop => Route::IrsSession,
        ArqSessionInfoAck | ArqBurstAck | ArqBurstNack | ArqStopAck => Route::IssSession,
        P2pConnectionConnectAck
        | P2pConnectionPayload
        | P2pConnectionPayloadAck
        | P2pConnectionDisconnect
        | P2pConnectionDisconnectAck => Route::P2pSession,
    }
}

enum Accepted {
    Local { mycallsign: String },
    Irs(Arc<IrsSession>),
    Iss(Arc<IssSession>),
    P2p(Arc<P2pEndpoint>),
}

pub struct FrameHandler {
    engine: Engine,
}

impl FrameHandler {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Entry point of the modem receive path.
    pub async fn handle(&self, mut frame: Frame, meta: FrameMeta) {
        let Some(accepted) = self.accept(&frame) else {
            info!(frame_type = %frame.frame_type(), "frame received but not for us");
            return;
        };

        self.enrich(&mut frame);

        if self.engine.config.station.enable_callsign_blacklist
            && self.origin_blacklisted(&frame)
        {
            info!(
                origin = frame.origin.as_deref().unwrap_or(""),
                "origin callsign blocked"
            );
            return;
        }

        debug!(
            frame_type = %frame.frame_type(),
            snr = meta.snr,
            frequency_offset = meta.frequency_offset,
            "handling frame"
        );
        self.emit_frame_event(&frame, &meta);
        self.deliver(accepted, frame, meta).await;
    }

    fn accept(&self, frame: &Frame) -> Option<Accepted> {
        match route(frame.frame_type()) {
            Route::LocalCallsign => {
                let station = &self.engine.config.station;
                let wanted = frame.destination_crc?;
                let mycallsign =
                    callsign::match_checksum(&station.mycall, &station.ssid_list, wanted)?;
                Some(Accepted::Local { mycallsign })
            }
            Route::IrsSession => frame
                .session_id
                .and_then(|id| self.engine.registry.irs(id))
                .map(Accepted::Irs),
            Route::IssSession => frame
                .session_id
                .and_then(|id| self.engine.registry.iss(id))
                .map(Accepted::Iss),
            Route::P2pSession => frame
                .session_id
                .and_then(|id| self.engine.registry.p2p(id))
                .map(Accepted::P2p),
        }
    }

    fn enrich(&self, frame: &mut Frame) {
        if frame.origin.is_none() {
            if let Some(id) = frame.session_id {
                frame.origin = self.engine.registry.dxcall_for(id);
            }
        }
        if frame.origin.is_none() {
            if let Some(origin_crc) = frame.origin_crc {
                frame.origin = self.engine.stations.get_callsign_by_checksum(origin_crc);
                if frame.origin.is_none() {
                    info!(origin_crc, "no callsign known for origin checksum");
                }
            }
        }

        if let Some(origin) = frame.origin.clone() {
            if let Some(gridsquare) = frame.gridsquare.as_deref() {
                self.engine
                    .stations
                    .update_station_location(&origin, gridsquare);
            } else {
                let stored = self
                    .engine
                    .stations
                    .get_station(&origin)
                    .and_then(|record| record.gridsquare().map(str::to_string))
                    .unwrap_or_else(|| UNKNOWN_GRIDSQUARE.to_string());
                frame.gridsquare = Some(stored);
            }
        }
    }

    fn origin_blacklisted(&self, frame: &Frame) -> bool {
        let Some(origin) = frame.origin.as_deref() else {
            return false;
        };
        let origin = callsign::base(origin);
        self.engine
            .config
            .station
            .callsign_blacklist
            .iter()
            .any(|entry| entry == origin)
    }

    fn emit_frame_event(&self, frame: &Frame, meta: &FrameMeta) {
        let station = &self.engine.config.station;
        self.engine.events.broadcast(Event::FrameHandler(FrameHandlerEvent {
            received: frame.frame_type(),
            timestamp: unix_timestamp(),
            mycallsign: station.mycall.clone(),
            myssid: station.myssid,
            snr: meta.snr,
            dxcallsign: frame.origin.clone(),
            gridsquare: frame.gridsquare.clone(),
            distance_kilometers: None,
            distance_miles: None,
            away_from_key: frame.away_from_key(),
        }));
    }

    async fn deliver(&self, accepted: Accepted, frame: Frame, meta: FrameMeta) {
        match accepted {
            Accepted::Local { mycallsign } => self.deliver_local(mycallsign, frame, meta).await,
            Accepted::Irs(session) => match frame.frame_type() {
                FrameType::ArqSessionInfo => session.on_info_received(frame, &meta),
                FrameType::ArqBurstFrame => session.on_data_received(frame, &meta),
                FrameType::ArqStop => session.on_stop_received(),
                _ => {}
            },
            Accepted::Iss(session) => match frame.frame_type() {
                FrameType::ArqSessionInfoAck => session.on_info_ack_received(frame, &meta),
                FrameType::ArqBurstAck | FrameType::ArqBurstNack => {
                    session.on_burst_feedback_received(frame, &meta)
                }
                FrameType::ArqStopAck => session.on_stop_ack_received(&meta),
                _ => {}
            },
            Accepted::P2p(endpoint) => endpoint.deliver(frame),
        }
    }

    async fn deliver_local(&self, mycallsign: String, frame: Frame, meta: FrameMeta) {
        match frame.frame_type() {
            FrameType::ArqSessionOpen => {
                let Some(id) = frame.session_id else {
                    warn!("session open without session id");
                    return;
                };
                if let Some(existing) = self.engine.registry.irs(id) {
                    // our open-ack was lost; the session re-acks
                    existing.on_open_received(&meta);
                    return;
                }
                let Some(origin) = frame.origin.clone() else {
                    warn!(session = %id, "session open without origin callsign");
                    return;
                };
                match IrsSession::start(&self.engine, origin, mycallsign, id, meta.snr) {
                    Ok(_) => debug!(session = %id, "inbound session created"),
                    Err(err) => warn!(session = %id, error = %err, "inbound session not registered"),
                }
            }
            FrameType::ArqSessionOpenAck => {
                match frame
                    .session_id
                    .and_then(|id| self.engine.registry.iss(id))
                {
                    Some(session) => session.on_open_ack_received(frame, &meta),
                    None => info!("open ack for unknown outbound session"),
                }
            }
            FrameType::Ping => self.send_ping_ack(mycallsign, frame, meta).await,
            FrameType::PingAck => {}
            FrameType::P2pConnectionConnect => {
                // connection setup is owned by the P2P layer, not the ARQ core
                debug!("p2p connect surfaced on the event stream only");
            }
            _ => {}
        }
    }

    async fn send_ping_ack(&self, mycallsign: String, frame: Frame, meta: FrameMeta) {
        let Some(origin) = frame.origin else {
            info!("ping without resolvable origin, not answering");
            return;
        };
        let reply = Frame::new(FrameBody::PingAck)
            .with_origin(mycallsign)
            .with_destination_crc(callsign::checksum(&origin))
            .with_snr(meta.snr);
        if let Err(err) = self.engine.transmit.enqueue(Transmission::control(reply)).await {
            warn!(error = %err, "ping ack not queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_shared::config::{EngineConfig, StationConfig};
    use arq_shared::events::EventBus;
    use arq_shared::ids::SessionId;
    use arq_shared::modes::CodecMode;
    use crate::station::MemoryStationStore;
    use crate::transmit::{Transmission, TransmitQueue};
    use tokio::sync::mpsc::Receiver;

    fn engine_with(station: StationConfig) -> (Engine, Receiver<Transmission>) {
        let config = EngineConfig {
            station,
            ..EngineConfig::default()
        };
        let events = EventBus::new();
        let (transmit, modem_rx) = TransmitQueue::bounded(16);
        let engine = Engine::new(
            Arc::new(config),
            Arc::new(MemoryStationStore::new()),
            events,
            transmit,
        );
        (engine, modem_rx)
    }

    fn local_station() -> StationConfig {
        StationConfig {
            mycall: "DJ2LS".into(),
            myssid: 3,
            ssid_list: vec![0, 3],
            ..StationConfig::default()
        }
    }

    fn open_frame(id: u8) -> Frame {
        Frame::new(FrameBody::SessionOpen { version: 1 })
            .with_session(SessionId::from_raw(id))
            .with_origin("AA0AA-0")
            .with_destination_crc(callsign::checksum("DJ2LS-3"))
    }

    #[test]
    fn routing_table_is_exhaustive() {
        use FrameType::*;
        assert_eq!(route(ArqSessionOpen), Route::LocalCallsign);
        assert_eq!(route(ArqSessionOpenAck), Route::LocalCallsign);
        assert_eq!(route(Ping), Route::LocalCallsign);
        assert_eq!(route(PingAck), Route::LocalCallsign);
        assert_eq!(route(P2pConnectionConnect), Route::LocalCallsign);
        assert_eq!(route(ArqSessionInfo), Route::IrsSession);
        assert_eq!(route(ArqBurstFrame), Route::IrsSession);
        assert_eq!(route(ArqStop), Route::IrsSession);
        assert_eq!(route(ArqSessionInfoAck), Route::IssSession);
        assert_eq!(route(ArqBurstAck), Route::IssSession);
        assert_eq!(route(ArqBurstNack), Route::IssSession);
        assert_eq!(route(ArqStopAck), Route::IssSession);
        assert_eq!(route(P2pConnectionConnectAck), Route::P2pSession);
        assert_eq!(route(P2pConnectionPayload), Route::P2pSession);
        assert_eq!(route(P2pConnectionPayloadAck), Route::P2pSession);
        assert_eq!(route(P2pConnectionDisconnect), Route::P2pSession);
        assert_eq!(route(P2pConnectionDisconnectAck), Route::P2pSession);
    }

    #[tokio::test]
    async fn session_open_for_us_creates_an_inbound_session() {
        let (engine, mut modem_rx) = engine_with(local_station());
        let handler = engine.frame_handler();

        handler.handle(open_frame(7), FrameMeta::new(5.0, 0.0)).await;

        let session = engine.registry.irs(SessionId::from_raw(7)).unwrap();
        assert_eq!(session.dxcall(), "AA0AA-0");

        // the spawned driver answers with an open ack in signalling mode
        let transmission = modem_rx.recv().await.unwrap();
        assert_eq!(transmission.mode, CodecMode::Signalling);
        assert_eq!(
            transmission.frame.frame_type(),
            FrameType::ArqSessionOpenAck
        );
        assert_eq!(
            transmission.frame.destination_crc,
            Some(callsign::checksum("AA0AA-0"))
        );
    }

    #[tokio::test]
    async fn session_open_for_someone_else_is_dropped() {
        let (engine, _modem_rx) = engine_with(local_station());
        let handler = engine.frame_handler();

        let frame = Frame::new(FrameBody::SessionOpen { version: 1 })
            .with_session(SessionId::from_raw(7))
            .with_origin("AA0AA-0")
            .with_destination_crc(callsign::checksum("ZZ9YY-0"));
        handler.handle(frame, FrameMeta::default()).await;

        assert!(engine.registry.irs(SessionId::from_raw(7)).is_none());
    }

    #[tokio::test]
    async fn in_session_frame_for_unknown_session_is_dropped() {
        let (engine, _modem_rx) = engine_with(local_station());
        let handler = engine.frame_handler();
        let mut events = engine.events.subscribe();

        let frame = Frame::new(FrameBody::SessionInfo {
            total_length: 10,
            total_crc: "00000000".into(),
        })
        .with_session(SessionId::from_raw(99));
        handler.handle(frame, FrameMeta::default()).await;

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn ping_is_answered_with_ping_ack() {
        let (engine, mut modem_rx) = engine_with(local_station());
        let handler = engine.frame_handler();
        let mut events = engine.events.subscribe();

        let frame = Frame::new(FrameBody::Ping)
            .with_origin("AA0AA-0")
            .with_destination_crc(callsign::checksum("DJ2LS-0"));
        handler.handle(frame, FrameMeta::new(3.5, 0.0)).await;

        let transmission = modem_rx.recv().await.unwrap();
        assert_eq!(transmission.frame.frame_type(), FrameType::PingAck);
        assert_eq!(
            transmission.frame.destination_crc,
            Some(callsign::checksum("AA0AA-0"))
        );
        assert_eq!(transmission.frame.origin.as_deref(), Some("DJ2LS-0"));

        assert!(matches!(
            events.try_recv().unwrap(),
            Event::FrameHandler(ev) if ev.received == FrameType::Ping && ev.dxcallsign.as_deref() == Some("AA0AA-0")
        ));
    }

    #[tokio::test]
    async fn blacklisted_origin_is_blocked_regardless_of_ssid() {
        let mut station = local_station();
        station.enable_callsign_blacklist = true;
        station.callsign_blacklist = vec!["AA0AA".into()];
        let (engine, mut modem_rx) = engine_with(station);
        let handler = engine.frame_handler();
        let mut events = engine.events.subscribe();

        let frame = Frame::new(FrameBody::Ping)
            .with_origin("AA0AA-7")
            .with_destination_crc(callsign::checksum("DJ2LS-0"));
        handler.handle(frame, FrameMeta::default()).await;

        assert!(events.try_recv().is_err());
        assert!(modem_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn p2p_frames_are_enriched_and_forwarded() {
        let (engine, _modem_rx) = engine_with(local_station());
        let handler = engine.frame_handler();

        let (endpoint, mut inbound) = P2pEndpoint::new(SessionId::from_raw(9), "DL1ABC-2");
        engine.registry.register_p2p(endpoint).unwrap();

        let frame = Frame::new(FrameBody::P2pPayload {
            data: bytes::Bytes::from_static(b"hi"),
        })
        .with_session(SessionId::from_raw(9));
        handler.handle(frame, FrameMeta::default()).await;

        let delivered = inbound.try_recv().unwrap();
        assert_eq!(delivered.origin.as_deref(), Some("DL1ABC-2"));
        assert_eq!(delivered.gridsquare.as_deref(), Some(UNKNOWN_GRIDSQUARE));
    }

    #[tokio::test]
    async fn gridsquare_is_filled_from_the_station_store() {
        let (engine, _modem_rx) = engine_with(local_station());
        engine
            .stations
            .update_station_location("AA0AA-0", "FN31pr");
        let handler = engine.frame_handler();
        let mut events = engine.events.subscribe();

        let frame = Frame::new(FrameBody::Ping)
            .with_origin("AA0AA-0")
            .with_destination_crc(callsign::checksum("DJ2LS-0"));
        handler.handle(frame, FrameMeta::default()).await;

        assert!(matches!(
            events.try_recv().unwrap(),
            Event::FrameHandler(ev) if ev.gridsquare.as_deref() == Some("FN31pr")
        ));
    }

    #[tokio::test]
    async fn heard_gridsquare_is_persisted_for_the_origin() {
        let (engine, _modem_rx) = engine_with(local_station());
        let handler = engine.frame_handler();

        let frame = Frame::new(FrameBody::Ping)
            .with_origin("AA0AA-0")
            .with_gridsquare("JN48cs")
            .with_destination_crc(callsign::checksum("DJ2LS-0"));
        handler.handle(frame, FrameMeta::default()).await;

        let record = engine.stations.get_station("AA0AA-0").unwrap();
        assert_eq!(record.gridsquare(), Some("JN48cs"));
    }
}
