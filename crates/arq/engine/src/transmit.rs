//! Handoff of outbound frames to the modem.
//!
//! Sessions never talk to the modem directly; every outbound frame is
//! enqueued here and picked up by the modem's transmit task. The queue is
//! bounded, so a saturated modem back-pressures the session drivers, which
//! doubles as a crude rate limit. A test mode short-circuits the modem and
//! publishes the frame on the event bus instead.

use arq_shared::events::{Event, EventBus};
use arq_shared::frames::Frame;
use arq_shared::modes::CodecMode;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default depth of the modem handoff queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// One scheduled transmission: the decoded frame plus modem parameters.
#[derive(Debug, Clone)]
pub struct Transmission {
    pub mode: CodecMode,
    pub repeats: u8,
    pub repeat_delay_ms: u32,
    pub frame: Frame,
}

impl Transmission {
    /// Control frames always go out in the signalling mode.
    pub fn control(frame: Frame) -> Self {
        Self {
            mode: CodecMode::Signalling,
            repeats: 1,
            repeat_delay_ms: 0,
            frame,
        }
    }

    /// Burst frames go out in the data mode of the current speed level.
    pub fn burst(mode: CodecMode, frame: Frame) -> Self {
        Self {
            mode,
            repeats: 1,
            repeat_delay_ms: 0,
            frame,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("modem transmit queue closed")]
    QueueClosed,
}

#[derive(Debug, Clone)]
enum TransmitTarget {
    Modem(mpsc::Sender<Transmission>),
    Events(EventBus),
}

/// Clonable sender half of the modem handoff.
#[derive(Debug, Clone)]
pub struct TransmitQueue {
    target: TransmitTarget,
}

impl TransmitQueue {
    /// Creates the queue together with the receiver the modem task drains.
    pub fn bounded(depth: usize) -> (Self, mpsc::Receiver<Transmission>) {
        let (tx, rx) = mpsc::channel(depth);
        (
            Self {
                target: TransmitTarget::Modem(tx),
            },
            rx,
        )
    }

    /// Test mode: transmissions surface as [`Event::FrameTransmitted`].
    pub fn test_mode(events: EventBus) -> Self {
        Self {
            target: TransmitTarget::Events(events),
        }
    }

    /// Hands a transmission to the modem. Waits for queue space, never for
    /// modem completion.
    pub async fn enqueue(&self, transmission: Transmission) -> Result<(), TransmitError> {
        match &self.target {
            TransmitTarget::Modem(tx) => tx
                .send(transmission)
                .await
                .map_err(|_| TransmitError::QueueClosed),
            TransmitTarget::Events(bus) => {
                bus.broadcast(Event::FrameTransmitted {
                    frame: transmission.frame,
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arq_shared::frames::FrameBody;

    #[tokio::test]
    async fn bounded_queue_passes_transmissions_through() {
        let (queue, mut rx) = TransmitQueue::bounded(4);
        queue
            .enqueue(Transmission::control(Frame::new(FrameBody::Ping)))
            .await
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.mode, CodecMode::Signalling);
        assert_eq!(got.repeats, 1);
        assert_eq!(got.frame.frame_type().to_string(), "PING");
    }

    #[tokio::test]
    async fn closed_queue_reports_error() {
        let (queue, rx) = TransmitQueue::bounded(1);
        drop(rx);
        let err = queue
            .enqueue(Transmission::control(Frame::new(FrameBody::Ping)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransmitError::QueueClosed));
    }

    #[tokio::test]
    async fn test_mode_emits_on_event_bus() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let queue = TransmitQueue::test_mode(bus);

        queue
            .enqueue(Transmission::burst(
                CodecMode::Datac1,
                Frame::new(FrameBody::Stop),
            ))
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            Event::FrameTransmitted { frame } if frame.body == FrameBody::Stop
        ));
    }
}
