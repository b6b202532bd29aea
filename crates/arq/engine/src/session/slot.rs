//! Latch primitives between the dispatcher and a session driver.
//!
//! The dispatcher stages the payload of a received frame and signals; the
//! driver observes it only after the signal fires. Staging is single-slot
//! with last-writer-wins: if the dispatcher overwrites an unconsumed entry
//! the peer will retransmit after the matching NACK, so nothing is lost
//! for good. Each slot carries the concrete payload its wait consumes, so
//! drivers never see a frame kind they did not ask for.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use tokio::sync::Notify;

/// Single staged value plus its wakeup.
pub(crate) struct Slot<T> {
    cell: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Stages a value, replacing any unconsumed one, and wakes the driver.
    pub fn put(&self, value: T) {
        if let Ok(mut cell) = self.cell.lock() {
            *cell = Some(value);
        }
        self.notify.notify_one();
    }

    pub fn take(&self) -> Option<T> {
        self.cell.lock().ok().and_then(|mut cell| cell.take())
    }

    /// Resolves once a staged value is available.
    ///
    /// Cancellation-safe: a value staged while the caller was cancelled
    /// stays in the slot for the next call.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(value) = self.take() {
                return value;
            }
            self.notify.notified().await;
        }
    }
}

/// Level-triggered one-way flag (abort, stop).
#[derive(Debug, Default)]
pub(crate) struct SignalFlag {
    flag: AtomicBool,
    notify: Notify,
}

impl SignalFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the flag has been set; immediately if it already is.
    pub async fn triggered(&self) {
        loop {
            if self.is_set() {
                return;
            }
            self.notify.notified().await;
        }
    }
}
