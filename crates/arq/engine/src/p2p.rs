//! Routing endpoints for point-to-point connection sessions.
//!
//! The P2P state machine lives outside this engine; what the dispatcher
//! needs is a registered endpoint per live connection so the P2P frame
//! variants can be validated against the registry and forwarded. An
//! endpoint is just the peer callsign plus an inbound frame channel.

use arq_shared::frames::Frame;
use arq_shared::ids::SessionId;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

pub struct P2pEndpoint {
    id: SessionId,
    dxcall: String,
    inbound: UnboundedSender<Frame>,
}

impl P2pEndpoint {
    /// Creates an endpoint and the receiver the connection task drains.
    pub fn new(id: SessionId, dxcall: impl Into<String>) -> (Arc<Self>, UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                id,
                dxcall: dxcall.into(),
                inbound: tx,
            }),
            rx,
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn dxcall(&self) -> &str {
        &self.dxcall
    }

    /// Forwards a validated frame to the connection task.
    pub fn deliver(&self, frame: Frame) {
        if self.inbound.send(frame).is_err() {
            debug!(session = %self.id, "p2p endpoint gone, frame dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_shared::frames::FrameBody;

    #[test]
    fn delivers_frames_in_order() {
        let (endpoint, mut rx) = P2pEndpoint::new(SessionId::from_raw(4), "DJ2LS-0");
        endpoint.deliver(Frame::new(FrameBody::P2pConnect));
        endpoint.deliver(Frame::new(FrameBody::P2pDisconnect));

        assert_eq!(rx.try_recv().unwrap().body, FrameBody::P2pConnect);
        assert_eq!(rx.try_recv().unwrap().body, FrameBody::P2pDisconnect);
    }

    #[test]
    fn delivery_after_receiver_drop_is_silent() {
        let (endpoint, rx) = P2pEndpoint::new(SessionId::from_raw(4), "DJ2LS-0");
        drop(rx);
        endpoint.deliver(Frame::new(FrameBody::P2pConnect));
    }
}
