//! Codec modes and the speed-level table.
//!
//! Control frames always travel in the robust signalling mode. Payload
//! bursts use one of the data modes, selected through a `speed_level`
//! index into an ordered table: higher levels carry more bytes per frame
//! but need a better channel.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// FreeDV modem modes the engine schedules transmissions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CodecMode {
    Signalling,
    Datac4,
    Datac3,
    Datac1,
}

impl CodecMode {
    /// Usable payload bytes per modem frame in this mode.
    pub const fn payload_bytes(self) -> usize {
        match self {
            CodecMode::Signalling => 14,
            CodecMode::Datac4 => 87,
            CodecMode::Datac3 => 126,
            CodecMode::Datac1 => 510,
        }
    }
}

/// One entry of the speed table: a data mode and the SNR it needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedLevel {
    pub mode: CodecMode,
    pub min_snr: f32,
}

#[derive(Debug, Error)]
#[error("speed table needs at least one level")]
pub struct EmptySpeedTable;

/// Ordered list of data modes, most robust first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTable {
    levels: Vec<SpeedLevel>,
}

impl SpeedTable {
    pub fn new(levels: Vec<SpeedLevel>) -> Result<Self, EmptySpeedTable> {
        if levels.is_empty() {
            return Err(EmptySpeedTable);
        }
        Ok(Self { levels })
    }

    pub fn max_level(&self) -> u8 {
        (self.levels.len() - 1) as u8
    }

    fn entry(&self, level: u8) -> &SpeedLevel {
        let idx = usize::from(level).min(self.levels.len() - 1);
        &self.levels[idx]
    }

    /// Data mode at `level` (out-of-range levels clamp to the fastest).
    pub fn mode_at(&self, level: u8) -> CodecMode {
        self.entry(level).mode
    }

    /// Payload chunk size carried per burst frame at `level`.
    pub fn chunk_len(&self, level: u8) -> usize {
        self.entry(level).mode.payload_bytes()
    }

    pub fn min_snr_at(&self, level: u8) -> f32 {
        self.entry(level).min_snr
    }

    /// Highest level whose SNR requirement is met, for the initial pick.
    pub fn startup_level(&self, snr: f32) -> u8 {
        self.levels
            .iter()
            .rposition(|entry| entry.min_snr <= snr)
            .unwrap_or(0) as u8
    }
}

impl Default for SpeedTable {
    /// The classic trio: datac4 for marginal channels up to datac1 for
    /// strong ones.
    fn default() -> Self {
        Self {
            levels: vec![
                SpeedLevel {
                    mode: CodecMode::Datac4,
                    min_snr: -10.0,
                },
                SpeedLevel {
                    mode: CodecMode::Datac3,
                    min_snr: 0.0,
                },
                SpeedLevel {
                    mode: CodecMode::Datac1,
                    min_snr: 3.0,
                },
            ],
        }
    }
}
