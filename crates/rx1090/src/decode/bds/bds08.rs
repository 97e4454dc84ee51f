use deku::bitvec::{BitSlice, Msb0};
use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * ## Aircraft Identification and Category (BDS 0,8)
 *
 * Broadcasts the callsign and the wake vortex category.
 *
 * | TC  | CA  | C1  | C2  | C3  | C4  | C5  | C6  | C7  | C8  |
 * | --- | --- | --- | --- | --- | --- | --- | --- | --- | --- |
 * | 5   | 3   | 6   | 6   | 6   | 6   | 6   | 6   | 6   | 6   |
 */
#[derive(Debug, PartialEq, DekuRead, Serialize, Clone)]
#[deku(ctx = "tc: u8")]
pub struct AircraftIdentification {
    /// Aircraft category within the typecode group
    #[deku(bits = "3")]
    #[serde(skip)]
    pub ca: u8,

    /// Typecode and category together define the wake vortex category
    #[deku(skip, default = "WakeVortex::from_tc_ca(tc, *ca)")]
    pub wake_vortex: WakeVortex,

    /// Callsign, eight 6-bit characters, space padded
    #[deku(reader = "callsign_read(deku::rest)")]
    pub callsign: String,
}

/**
 * The CA value combined with the TC value defines the ADS-B wake vortex
 * category, a different classification from the ICAO wake turbulence
 * category used in operations.
 */
#[derive(Debug, PartialEq, Serialize, Copy, Clone)]
pub enum WakeVortex {
    Reserved,

    // typecode 2, ground
    #[serde(rename = "n/a")]
    NoInformation,
    #[serde(rename = "Surface emergency vehicle")]
    EmergencyVehicle,
    #[serde(rename = "Surface service vehicle")]
    ServiceVehicle,
    Obstruction,

    // typecode 3
    Glider,
    #[serde(rename = "Lighter than air")]
    Lighter,
    Parachutist,
    Ultralight,
    #[serde(rename = "UAM")]
    Unmanned,
    Space,

    // typecode 4
    #[serde(rename = "<7000kg")]
    Light,
    #[serde(rename = "<34,000kg")]
    Medium1,
    #[serde(rename = "<136,000kg")]
    Medium2,
    #[serde(rename = "High vortex")]
    HighVortex,
    Heavy,
    #[serde(rename = "High performance")]
    HighPerformance,
    Rotorcraft,
}

impl WakeVortex {
    pub fn from_tc_ca(tc: u8, ca: u8) -> WakeVortex {
        use WakeVortex::*;
        match (tc, ca) {
            (1, _) => Reserved,
            (_, 0) => NoInformation,
            (2, 1) => EmergencyVehicle,
            (2, 3) => ServiceVehicle,
            (2, _) => Obstruction,
            (3, 1) => Glider,
            (3, 2) => Lighter,
            (3, 3) => Parachutist,
            (3, 4) => Ultralight,
            (3, 6) => Unmanned,
            (3, 7) => Space,
            (4, 1) => Light,
            (4, 2) => Medium1,
            (4, 3) => Medium2,
            (4, 4) => HighVortex,
            (4, 5) => Heavy,
            (4, 6) => HighPerformance,
            (4, 7) => Rotorcraft,
            _ => Reserved,
        }
    }
}

impl fmt::Display for WakeVortex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match &self {
            Self::Reserved => "Reserved",
            Self::NoInformation => "No category information",
            Self::EmergencyVehicle => "Surface Emergency Vehicle",
            Self::ServiceVehicle => "Surface Service Vehicle",
            Self::Obstruction => "Ground Obstruction",
            Self::Glider => "Glider, sailplane",
            Self::Lighter => "Lighter than air",
            Self::Parachutist => "Parachutist, Skydiver",
            Self::Ultralight => "Ultralight, hang-glider, paraglider",
            Self::Unmanned => "Unmanned Air Vehicle",
            Self::Space => "Space or transatmospheric vehicle",
            Self::Light => "Light (less than 7000 kg)",
            Self::Medium1 => "Medium 1 (between 7000 kg and 34000 kg)",
            Self::Medium2 => "Medium 2 (between 34000 kg and 136000 kg)",
            Self::HighVortex => "High vortex aircraft",
            Self::Heavy => "Heavy (larger than 136000 kg)",
            Self::HighPerformance => "High performance and high speed",
            Self::Rotorcraft => "Rotorcraft",
        };
        write!(f, "{string}")
    }
}

const CHAR_LOOKUP: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

/// Read eight 6-bit characters, keeping the space padding so the wire
/// form survives a round trip through the tracker.
pub fn callsign_read(
    rest: &BitSlice<u8, Msb0>,
) -> Result<(&BitSlice<u8, Msb0>, String), DekuError> {
    let mut inside_rest = rest;

    let mut callsign = String::with_capacity(8);
    for _ in 0..8 {
        let (for_rest, c) = <u8>::read(inside_rest, deku::ctx::BitSize(6))?;
        callsign.push(CHAR_LOOKUP[c as usize] as char);
        inside_rest = for_rest;
    }

    Ok((inside_rest, callsign))
}

impl fmt::Display for AircraftIdentification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Aircraft identification and category (BDS 0,8)")?;
        writeln!(f, "  Callsign:      {}", self.callsign.trim_end())?;
        writeln!(f, "  Category:      {}", &self.wake_vortex)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::adsb::MEKind;
    use crate::decode::{Message, DF};
    use hexlit::hex;

    #[test]
    fn test_callsign() {
        let bytes = hex!("8D4840D6202CC371C32CE0576098");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            if let MEKind::AircraftIdentification(id) = adsb.message.kind {
                assert_eq!(id.callsign, "KLM1023 ");
                return;
            }
        }
        unreachable!();
    }

    #[test]
    fn test_category() {
        let bytes = hex!("8d406b902015a678d4d220aa4bda");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            if let MEKind::AircraftIdentification(id) = adsb.message.kind {
                assert_eq!(id.ca, 0);
                assert_eq!(id.wake_vortex, WakeVortex::NoInformation);
                assert_eq!(id.callsign.trim_end(), "EZY85MH");
                return;
            }
        }
        unreachable!();
    }
}
