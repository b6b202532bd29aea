//! Callsign and SSID handling.
//!
//! Stations are addressed by the 16-bit checksum of the UTF-8 bytes of
//! `"CALLSIGN-SSID"`. A station usually answers for several SSIDs, so
//! matching an incoming checksum means trying every configured SSID until
//! one hashes to the wanted value.

use crate::crc::crc16;

/// Joins a base callsign and an SSID into the canonical `"CALL-SSID"` form.
pub fn with_ssid(call: &str, ssid: u8) -> String {
    format!("{}-{}", base(call), ssid)
}

/// Strips any `-ssid` suffix, returning the bare callsign.
pub fn base(call: &str) -> &str {
    match call.split_once('-') {
        Some((base, _)) => base,
        None => call,
    }
}

/// Addressing checksum of a `"CALL-SSID"` string.
pub fn checksum(call_with_ssid: &str) -> u16 {
    crc16(call_with_ssid.as_bytes())
}

/// Finds the local `"CALL-SSID"` combination matching a received checksum.
///
/// Tries `mycall` with every SSID in `ssid_list`; on a hit the concrete
/// callsign that hashed to `wanted` is returned so it can be bound to the
/// session being opened.
pub fn match_checksum(mycall: &str, ssid_list: &[u8], wanted: u16) -> Option<String> {
    ssid_list
        .iter()
        .map(|ssid| with_ssid(mycall, *ssid))
        .find(|candidate| checksum(candidate) == wanted)
}
