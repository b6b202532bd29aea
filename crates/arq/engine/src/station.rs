//! Station database interface.
//!
//! The engine only needs three operations from the surrounding
//! application's station database: resolving a callsign from its
//! addressing checksum, reading a station's stored location and persisting
//! a heard gridsquare. All of them are best-effort; a miss never stops
//! frame processing.

use std::collections::HashMap;
use std::sync::Mutex;

use arq_shared::callsign;

/// Location portion of a station record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationLocation {
    pub gridsquare: Option<String>,
}

/// What the engine reads back for a known station.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationRecord {
    pub location: Option<StationLocation>,
}

impl StationRecord {
    /// Convenience accessor for the nested gridsquare.
    pub fn gridsquare(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(|location| location.gridsquare.as_deref())
    }
}

/// Read/write seam to the station database.
pub trait StationStore: Send + Sync {
    fn get_callsign_by_checksum(&self, checksum: u16) -> Option<String>;
    fn get_station(&self, callsign: &str) -> Option<StationRecord>;
    fn update_station_location(&self, callsign: &str, gridsquare: &str);
}

/// In-memory store, used in tests and as a default for embedders without a
/// database.
#[derive(Debug, Default)]
pub struct MemoryStationStore {
    stations: Mutex<HashMap<String, StationRecord>>,
}

impl MemoryStationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, callsign: &str, gridsquare: Option<&str>) {
        if let Ok(mut stations) = self.stations.lock() {
            stations.insert(
                callsign.to_string(),
                StationRecord {
                    location: Some(StationLocation {
                        gridsquare: gridsquare.map(str::to_string),
                    }),
                },
            );
        }
    }
}

impl StationStore for MemoryStationStore {
    fn get_callsign_by_checksum(&self, checksum: u16) -> Option<String> {
        let stations = self.stations.lock().ok()?;
        stations
            .keys()
            .find(|call| callsign::checksum(call) == checksum)
            .cloned()
    }

    fn get_station(&self, callsign: &str) -> Option<StationRecord> {
        let stations = self.stations.lock().ok()?;
        stations.get(callsign).cloned()
    }

    fn update_station_location(&self, callsign: &str, gridsquare: &str) {
        self.insert(callsign, Some(gridsquare));
    }
}
