//! Engine configuration.
//!
//! Plain data, passed in explicitly by the embedding application. There are
//! no process-wide singletons and no file parsing surface here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frames::UNKNOWN_GRIDSQUARE;
use crate::modes::SpeedTable;

/// Identity of the local station and its addressing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub mycall: String,
    pub myssid: u8,
    /// SSIDs this station answers for.
    pub ssid_list: Vec<u8>,
    pub mygrid: String,
    pub enable_callsign_blacklist: bool,
    pub callsign_blacklist: Vec<String>,
}

impl StationConfig {
    /// The station's canonical `"CALL-SSID"` form.
    pub fn call_with_ssid(&self) -> String {
        crate::callsign::with_ssid(&self.mycall, self.myssid)
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            mycall: "AA0AA".into(),
            myssid: 0,
            ssid_list: vec![0],
            mygrid: UNKNOWN_GRIDSQUARE.into(),
            enable_callsign_blacklist: false,
            callsign_blacklist: Vec::new(),
        }
    }
}

/// Timing and retry discipline of the session state machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub version: u8,
    pub retries_connect: u8,
    pub retries_transfer: u8,
    pub timeout_connect: Duration,
    pub timeout_data: Duration,
    pub frames_per_burst: u8,
    /// Extra SNR headroom required before stepping up a speed level.
    pub speed_up_snr_margin: f32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: 1,
            retries_connect: 3,
            retries_transfer: 3,
            timeout_connect: Duration::from_secs(6),
            timeout_data: Duration::from_secs(6),
            frames_per_burst: 3,
            speed_up_snr_margin: 1.0,
        }
    }
}

/// Top-level configuration handed to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub station: StationConfig,
    pub protocol: ProtocolConfig,
    pub speed: SpeedTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = ProtocolConfig::default();
        assert_eq!(config.retries_connect, 3);
        assert_eq!(config.retries_transfer, 3);
        assert_eq!(config.timeout_connect, Duration::from_secs(6));
        assert_eq!(config.timeout_data, Duration::from_secs(6));
        assert_eq!(config.frames_per_burst, 3);
        assert_eq!(config.version, 1);
    }

    #[test]
    fn station_call_with_ssid() {
        let station = StationConfig {
            mycall: "DJ2LS".into(),
            myssid: 3,
            ..StationConfig::default()
        };
        assert_eq!(station.call_with_ssid(), "DJ2LS-3");
    }
}
