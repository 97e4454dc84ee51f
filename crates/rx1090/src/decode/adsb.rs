use super::bds::{bds05, bds06, bds08, bds09, bds61, bds62, bds65};
use super::cpr::CPRFormat;
use super::{Capability, ICAO};
use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * An ADS-B frame is 112 bits long and consists of five main parts:
 *
 * +----------+----------+-------------+------------------------+-----------+
 * |  DF (5)  |  CA (3)  |  ICAO (24)  |         ME (56)        |  PI (24)  |
 * +----------+----------+-------------+------------------------+-----------+
 */
#[derive(Debug, PartialEq, DekuRead, Clone, Serialize)]
pub struct ADSB {
    /// Transponder capability
    #[serde(skip)]
    pub capability: Capability,

    /// ICAO aircraft address
    pub icao24: ICAO,

    /// The message field, dispatched on its 5-bit typecode
    #[serde(flatten)]
    pub message: ME,

    /// Parity/Interrogator ID
    #[serde(skip)]
    pub parity: ICAO,
}

impl fmt::Display for ADSB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " DF17. Extended Squitter")?;
        writeln!(f, "  Address:       {}", &self.icao24)?;
        writeln!(f, "  Air/Ground:    {}", &self.capability)?;
        write!(f, "{}", &self.message)
    }
}

/*
* |  typecode  |  Content                             |
* | ---------- | ------------------------------------ |
* | 0          |  position with no latitude/longitude |
* | 1..=4      |  identification and category         |
* | 5..=8      |  surface position                    |
* | 9..=18     |  airborne position (barometric)      |
* | 19         |  airborne velocity                   |
* | 20..=22    |  airborne position (GNSS)            |
* | 28         |  aircraft status                     |
* | 29         |  target state and status             |
* | 31         |  operational status                  |
*/

/// The 56-bit extended squitter message field
#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
pub struct ME {
    /// The typecode value
    #[deku(bits = "5")]
    #[serde(skip)]
    pub tc: u8,

    #[serde(flatten)]
    #[deku(ctx = "*tc")]
    pub kind: MEKind,
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
#[deku(ctx = "tc: u8", id = "tc")]
#[serde(tag = "BDS")]
pub enum MEKind {
    #[deku(id = "0")]
    #[serde(skip)]
    NoPosition(#[deku(bits = "51", endian = "big")] u64),

    #[deku(id_pat = "1..=4")]
    #[serde(rename = "0,8")]
    AircraftIdentification(#[deku(ctx = "tc")] bds08::AircraftIdentification),

    #[deku(id_pat = "5..=8")]
    #[serde(rename = "0,6")]
    SurfacePosition(#[deku(ctx = "tc")] bds06::SurfacePosition),

    #[deku(id_pat = "9..=18 | 20..=22")]
    #[serde(rename = "0,5")]
    AirbornePosition(#[deku(ctx = "tc")] bds05::AirbornePosition),

    #[deku(id = "19")]
    #[serde(rename = "0,9")]
    AirborneVelocity(bds09::AirborneVelocity),

    #[deku(id_pat = "23..=27")]
    #[serde(skip)]
    Reserved0(#[deku(bits = "51", endian = "big")] u64),

    #[deku(id = "28")]
    #[serde(rename = "6,1")]
    AircraftStatus(bds61::AircraftStatus),

    #[deku(id = "29")]
    #[serde(rename = "6,2")]
    TargetStateAndStatus(bds62::TargetStateAndStatus),

    #[deku(id = "30")]
    #[serde(skip)]
    AircraftOperationalCoordination(#[deku(bits = "51", endian = "big")] u64),

    #[deku(id = "31")]
    #[serde(rename = "6,5")]
    OperationStatus(bds65::OperationStatus),
}

impl fmt::Display for ME {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MEKind::NoPosition(_)
            | MEKind::Reserved0(_)
            | MEKind::AircraftOperationalCoordination(_) => Ok(()),
            MEKind::AirbornePosition(me) => write!(f, "{me}"),
            MEKind::SurfacePosition(me) => write!(f, "{me}"),
            MEKind::AircraftIdentification(me) => write!(f, "{me}"),
            MEKind::AirborneVelocity(me) => write!(f, "{me}"),
            MEKind::AircraftStatus(me) => write!(f, "{me}"),
            MEKind::TargetStateAndStatus(me) => write!(f, "{me}"),
            MEKind::OperationStatus(me) => write!(f, "{me}"),
        }
    }
}

/// The control field of DF18, deciding the addressing scheme and the
/// payload layout of non-transponder extended squitters.
#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
pub struct ControlField {
    #[deku(bits = "3")]
    #[serde(skip)]
    pub cf: u8,

    #[serde(flatten)]
    #[deku(ctx = "*cf")]
    pub kind: ControlFieldKind,
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
#[deku(ctx = "cf: u8", id = "cf")]
#[serde(untagged)]
pub enum ControlFieldKind {
    /// ADS-B message from a non-transponder device
    #[deku(id = "0")]
    AdsbNonTransponder {
        #[serde(rename = "icao24")]
        aa: ICAO,
        #[serde(flatten)]
        me: ME,
    },

    /// ADS-B message in the anonymous/alternate address space
    #[deku(id = "1")]
    AdsbAnonymous {
        #[serde(rename = "icao24")]
        aa: ICAO,
        #[serde(flatten)]
        me: ME,
    },

    /// Fine-format TIS-B message
    #[deku(id = "2")]
    TisbFine {
        #[serde(rename = "icao24")]
        aa: ICAO,
        #[serde(flatten)]
        me: ME,
    },

    /// Coarse-format TIS-B airborne position
    #[deku(id = "3")]
    TisbCoarse {
        #[serde(rename = "icao24")]
        aa: ICAO,
        #[serde(flatten)]
        position: CoarseTisbPosition,
    },

    /// TIS-B management message, not surveillance data
    #[deku(id = "4")]
    #[serde(skip)]
    TisbManage {
        aa: ICAO,
        #[deku(bits = "56", endian = "big")]
        md: u64,
    },

    /// TIS-B relay of an ADS-B message (anonymous addresses)
    #[deku(id = "5")]
    TisbRelay {
        #[serde(rename = "icao24")]
        aa: ICAO,
        #[serde(flatten)]
        me: ME,
    },

    /// ADS-B rebroadcast (ADS-R), same layout as DF17
    #[deku(id = "6")]
    AdsbRebroadcast {
        #[serde(rename = "icao24")]
        aa: ICAO,
        #[serde(flatten)]
        me: ME,
    },

    #[deku(id = "7")]
    #[serde(skip)]
    Reserved {
        aa: ICAO,
        #[deku(bits = "56", endian = "big")]
        md: u64,
    },
}

impl fmt::Display for ControlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ControlFieldKind::*;
        let scheme = match &self.kind {
            AdsbNonTransponder { .. } | AdsbAnonymous { .. } => "ADS-B",
            TisbFine { .. } | TisbCoarse { .. } | TisbRelay { .. } => "TIS-B",
            AdsbRebroadcast { .. } => "ADS-R",
            TisbManage { .. } | Reserved { .. } => "management",
        };
        writeln!(f, " DF18. Extended Squitter ({scheme})")?;
        match &self.kind {
            AdsbNonTransponder { aa, me }
            | AdsbAnonymous { aa, me }
            | TisbFine { aa, me }
            | TisbRelay { aa, me }
            | AdsbRebroadcast { aa, me } => {
                writeln!(f, "  Address:       {aa}")?;
                write!(f, "{me}")
            }
            TisbCoarse { aa, position } => {
                writeln!(f, "  Address:       {aa}")?;
                write!(f, "{position}")
            }
            TisbManage { .. } | Reserved { .. } => Ok(()),
        }
    }
}

/// Coarse TIS-B airborne position: a 12+12 bit CPR pair with a reduced
/// altitude and ground track, broadcast for track files without fine
/// surveillance.
#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct CoarseTisbPosition {
    /// ICAO/Mode A flag for the address field
    #[deku(bits = "1")]
    #[serde(skip)]
    pub imf: bool,

    #[deku(bits = "2")]
    #[serde(skip)]
    pub surveillance_status: u8,

    /// Service volume identifier of the originating ground station
    #[deku(bits = "4")]
    #[serde(skip)]
    pub svid: u8,

    #[deku(reader = "bds05::decode_ac12(deku::rest)")]
    #[serde(rename = "altitude")]
    pub alt: Option<i32>,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub track_status: bool,

    #[deku(
        bits = "7",
        map = "|v: u8| -> Result<_, DekuError> {
            if *track_status { Ok(Some(v as f64 * 360. / 128.)) } else { Ok(None) }
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,

    pub parity: CPRFormat,

    #[deku(bits = "12", endian = "big")]
    pub lat_cpr: u32,

    #[deku(bits = "12", endian = "big", pad_bits_after = "4")]
    pub lon_cpr: u32,

    #[deku(skip, default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[deku(skip, default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl fmt::Display for CoarseTisbPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Coarse TIS-B airborne position")?;
        if let Some(alt) = self.alt {
            writeln!(f, "  Altitude:      {alt} ft")?;
        }
        writeln!(f, "  CPR parity:    {}", self.parity)?;
        writeln!(f, "  CPR latitude:  ({})", self.lat_cpr)?;
        writeln!(f, "  CPR longitude: ({})", self.lon_cpr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Message, DF};
    use hexlit::hex;

    #[test]
    fn test_icao24() {
        let bytes = hex!("8D406B902015A678D4D220AA4BDA");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(msg) = msg.df {
            assert_eq!(format!("{}", msg.icao24), "406b90");
            return;
        }
        unreachable!();
    }

    #[test]
    fn test_typecode_dispatch() {
        let bytes = hex!("8D4840D6202CC371C32CE0576098");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            assert_eq!(adsb.message.tc, 4);
            assert!(matches!(
                adsb.message.kind,
                MEKind::AircraftIdentification(_)
            ));
            return;
        }
        unreachable!();
    }
}
