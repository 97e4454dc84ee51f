use crate::decode::IdentityCode;
use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * ## Aircraft Status (BDS 6,1 / TYPE=28)
 *
 * Emergency/priority status and the current Mode A code.
 *
 * | TYPE | SUBTYPE | EMERGENCY | SQUAWK | RESERVED |
 * |------|---------|-----------|--------|----------|
 * | 5    | 3       | 3         | 13     | 32       |
 */
#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct AircraftStatus {
    #[serde(skip)]
    pub subtype: AircraftStatusType,

    /// Emergency state, meaningful for subtype 1
    pub emergency_state: EmergencyState,

    /// Mode A code (squawk), Gillham interleaved
    #[deku(pad_bits_after = "32")]
    pub squawk: IdentityCode,
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "3")]
#[serde(rename_all = "snake_case")]
pub enum AircraftStatusType {
    NoInformation = 0,
    #[serde(rename = "emergency_priority")]
    EmergencyPriorityStatus = 1,
    #[serde(rename = "acas_ra")]
    AcasRaBroadcast = 2,
    #[deku(id_pat = "_")]
    Reserved,
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "3")]
#[serde(rename_all = "snake_case")]
pub enum EmergencyState {
    None = 0,
    /// Mode A code 7700
    General = 1,
    Medical = 2,
    MinimumFuel = 3,
    /// Mode A code 7600
    NoCommunication = 4,
    /// Mode A code 7500
    UnlawfulInterference = 5,
    DownedAircraft = 6,
    Reserved = 7,
}

impl fmt::Display for EmergencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "No emergency",
            Self::General => "General emergency (7700)",
            Self::Medical => "Lifeguard/Medical emergency",
            Self::MinimumFuel => "Minimum fuel",
            Self::NoCommunication => "No communication (7600)",
            Self::UnlawfulInterference => "Unlawful interference (7500)",
            Self::DownedAircraft => "Downed aircraft",
            Self::Reserved => "Reserved",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for AircraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Aircraft status (BDS 6,1)")?;
        writeln!(f, "  Squawk:        {}", &self.squawk)?;
        writeln!(f, "  Emergency:     {}", &self.emergency_state)?;
        Ok(())
    }
}
