//! Speed-level adaptation.
//!
//! The receiving side owns the speed decision and publishes its view in
//! every ACK/NACK; the sender adopts it verbatim. Rules: pick a starting
//! level from the SNR at INFO time, step down after the second consecutive
//! retry, step up again after two consecutive good bursts with enough SNR
//! headroom for the next mode.

use arq_shared::modes::SpeedTable;

#[derive(Debug)]
pub(crate) struct SpeedController {
    level: u8,
    good_bursts: u8,
}

impl SpeedController {
    pub fn new() -> Self {
        Self {
            level: 0,
            good_bursts: 0,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Initial pick when the transfer parameters become known.
    pub fn startup(&mut self, table: &SpeedTable, snr: f32) {
        self.level = table.startup_level(snr);
        self.good_bursts = 0;
    }

    /// A wait for data expired. `consumed_retries` counts the timeouts in
    /// the current run, this one included.
    pub fn on_timeout(&mut self, consumed_retries: u8) {
        self.good_bursts = 0;
        if consumed_retries >= 2 {
            self.level = self.level.saturating_sub(1);
        }
    }

    /// A burst was accepted in order.
    pub fn on_good_burst(&mut self, table: &SpeedTable, margin: f32, snr: f32) {
        self.good_bursts = self.good_bursts.saturating_add(1);
        if self.level >= table.max_level() {
            return;
        }
        if self.good_bursts >= 2 && snr >= table.min_snr_at(self.level + 1) + margin {
            self.level += 1;
            self.good_bursts = 0;
        }
    }

    /// Sender side: adopt the level the receiver published.
    pub fn adopt(&mut self, level: u8) {
        self.level = level;
    }
}
