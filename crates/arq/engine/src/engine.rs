//! Bundled dependencies handed to every component.
//!
//! Configuration, registry, station store, event bus and transmit queue
//! travel together as one cheap-to-clone handle; nothing in the engine
//! reaches for process-wide state.

use std::sync::Arc;

use bytes::Bytes;

use arq_shared::config::EngineConfig;
use arq_shared::events::EventBus;

use crate::dispatch::FrameHandler;
use crate::registry::{RegistryError, SessionRegistry};
use crate::session::IssSession;
use crate::station::StationStore;
use crate::transmit::TransmitQueue;

#[derive(Clone)]
pub struct Engine {
    pub config: Arc<EngineConfig>,
    pub registry: Arc<SessionRegistry>,
    pub stations: Arc<dyn StationStore>,
    pub events: EventBus,
    pub transmit: TransmitQueue,
}

impl Engine {
    pub fn new(
        config: Arc<EngineConfig>,
        stations: Arc<dyn StationStore>,
        events: EventBus,
        transmit: TransmitQueue,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            stations,
            events,
            transmit,
        }
    }

    /// Dispatcher for the modem's receive path.
    pub fn frame_handler(&self) -> FrameHandler {
        FrameHandler::new(self.clone())
    }

    /// User command: start sending `payload` to `dxcall`.
    pub fn start_outbound(
        &self,
        dxcall: impl Into<String>,
        payload: Bytes,
    ) -> Result<Arc<IssSession>, RegistryError> {
        IssSession::start(self, dxcall, payload)
    }
}
