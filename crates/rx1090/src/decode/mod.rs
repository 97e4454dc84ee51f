pub mod adsb;
pub mod bds;
pub mod commb;
pub mod cpr;
pub mod crc;
pub mod time;

use adsb::ADSB;
use commb::DataSelector;
use crc::checksum;
use deku::bitvec::{BitSlice, Msb0};
use deku::prelude::*;
use serde::ser::{Serialize, Serializer};
use std::fmt;

/**
 * DF stands for Downlink Format.
 *
 * A number between 0 and 24 encoding the type of the message, and whether
 * it is short (56 bits) or long (112 bits).
 *
 * |  DF      |  Name                          |
 * | -------- | ------------------------------ |
 * | 0        | [`DF::ShortAirAir`]            |
 * | 4        | [`DF::SurveillanceAltitude`]   |
 * | 5        | [`DF::SurveillanceIdentity`]   |
 * | 11       | [`DF::AllCall`]                |
 * | 16       | [`DF::LongAirAir`]             |
 * | 17       | [`DF::ExtendedSquitter`]       |
 * | 18       | [`DF::NonTransponder`]         |
 * | 19       | [`DF::Military`]               |
 * | 20       | [`DF::CommBAltitude`]          |
 * | 21       | [`DF::CommBIdentity`]          |
 * | 24..=31  | [`DF::CommD`]                  |
 */

/// The entry point to Mode S and ADS-B decoding
///
/// Use as `Message::from_bytes()` on a CRC-clean (possibly repaired) frame.
#[derive(Debug, PartialEq, serde::Serialize, DekuRead, Clone)]
pub struct Message {
    /// 24-bit CRC residual over all bits; zero for clean DF17/18,
    /// the target address for address-overlaid formats
    #[deku(reader = "Self::read_crc(deku::input_bits)")]
    #[serde(skip)]
    pub crc: u32,

    /// The Downlink Format, encoded in the first 5 bits
    #[deku(bits = "5")]
    #[serde(skip)]
    pub format: u8,

    #[serde(flatten)]
    #[deku(ctx = "*format, *crc")]
    pub df: DF,
}

impl Message {
    /// Compute the residual over the whole frame without consuming bits.
    fn read_crc(
        input: &BitSlice<u8, Msb0>,
    ) -> Result<(&BitSlice<u8, Msb0>, u32), DekuError> {
        let (_, bytes, _) = input.domain().region().ok_or_else(|| {
            DekuError::Parse("empty input".to_string())
        })?;
        if bytes.len() < crc::MODES_SHORT_MSG_BITS / 8 {
            return Err(DekuError::Incomplete(deku::error::NeedSize::new(
                crc::MODES_SHORT_MSG_BITS,
            )));
        }
        let df = bytes[0] >> 3;
        let bits = crc::frame_bits(df);
        if bytes.len() * 8 < bits {
            return Err(DekuError::Incomplete(deku::error::NeedSize::new(
                bits,
            )));
        }
        let crc = checksum(bytes, bits);
        // DF17 is CRC-pure: any residual left at this point is corruption
        // the demodulator chose not to repair.
        match (df, crc) {
            (17, c) if c > 0 => Err(DekuError::Assertion(format!(
                "invalid CRC in ADS-B message: {c:06x}"
            ))),
            _ => Ok((input, crc)),
        }
    }

    /// The address this message is about, with its addressing scheme.
    pub fn address(&self) -> Option<(ICAO, AddressType)> {
        use AddressType::*;
        match &self.df {
            DF::ShortAirAir { ap, .. }
            | DF::SurveillanceAltitude { ap, .. }
            | DF::SurveillanceIdentity { ap, .. }
            | DF::LongAirAir { ap, .. }
            | DF::CommBAltitude { ap, .. }
            | DF::CommBIdentity { ap, .. } => Some((ICAO(ap.0), Unknown)),
            DF::AllCall { icao, .. } => Some((*icao, Unknown)),
            DF::ExtendedSquitter(adsb) => Some((adsb.icao24, AdsbIcao)),
            DF::NonTransponder { cf, .. } => {
                use adsb::ControlFieldKind::*;
                match &cf.kind {
                    AdsbNonTransponder { aa, .. } => Some((*aa, AdsbIcaoNt)),
                    AdsbAnonymous { aa, .. } => Some((*aa, AdsbOther)),
                    TisbFine { aa, .. } => Some((*aa, TisbIcao)),
                    TisbCoarse { aa, .. } => Some((*aa, TisbTrackfile)),
                    TisbManage { .. } => None,
                    TisbRelay { aa, .. } => Some((*aa, TisbOther)),
                    AdsbRebroadcast { aa, .. } => Some((*aa, AdsrIcao)),
                    Reserved { .. } => None,
                }
            }
            DF::Military { .. } => None,
            DF::CommD { parity, .. } => Some((*parity, Unknown)),
        }
    }

    /// The surveillance source feeding this message, before any
    /// CRC-checking downgrade applied by the pipeline.
    pub fn base_source(&self) -> DataSource {
        match &self.df {
            DF::ExtendedSquitter(_) => DataSource::Adsb,
            DF::NonTransponder { cf, .. } => {
                use adsb::ControlFieldKind::*;
                match &cf.kind {
                    AdsbNonTransponder { .. } | AdsbAnonymous { .. } => {
                        DataSource::Adsb
                    }
                    _ => DataSource::TisB,
                }
            }
            _ => DataSource::ModeSChecked,
        }
    }
}

#[derive(Debug, PartialEq, serde::Serialize, DekuRead, Clone)]
#[deku(ctx = "df: u8, crc: u32", id = "df")]
#[serde(tag = "DF")]
pub enum DF {
    /// DF=0: Short Air-Air Surveillance (ACAS)
    #[deku(id = "0")]
    #[serde(rename = "DF0")]
    ShortAirAir {
        /// Vertical status (0 airborne, 1 on ground)
        #[deku(bits = "1")]
        #[serde(skip)]
        vs: u8,
        /// Cross-link capability
        #[deku(bits = "1")]
        #[serde(skip)]
        cc: u8,
        #[deku(bits = "1")]
        #[serde(skip)]
        unused: u8,
        /// Sensitivity level, ACAS
        #[deku(bits = "3")]
        #[serde(skip)]
        sl: u8,
        #[deku(bits = "2")]
        #[serde(skip)]
        unused1: u8,
        /// Reply information
        #[deku(bits = "4")]
        #[serde(skip)]
        ri: u8,
        #[deku(bits = "2")]
        #[serde(skip)]
        unused2: u8,
        /// Altitude code on 13 bits
        #[serde(rename = "altitude")]
        ac: AltitudeCode13,
        /// Address recovered from the overlaid parity
        #[serde(rename = "icao24")]
        #[deku(ctx = "crc")]
        ap: AddressParity,
    },

    /// DF=4: Surveillance Altitude Reply
    #[deku(id = "4")]
    #[serde(rename = "DF4")]
    SurveillanceAltitude {
        fs: FlightStatus,
        #[serde(skip)]
        dr: DownlinkRequest,
        #[serde(skip)]
        um: UtilityMessage,
        #[serde(rename = "altitude")]
        ac: AltitudeCode13,
        #[serde(rename = "icao24")]
        #[deku(ctx = "crc")]
        ap: AddressParity,
    },

    /// DF=5: Surveillance Identity Reply
    #[deku(id = "5")]
    #[serde(rename = "DF5")]
    SurveillanceIdentity {
        fs: FlightStatus,
        #[serde(skip)]
        dr: DownlinkRequest,
        #[serde(skip)]
        um: UtilityMessage,
        /// Identity code (squawk)
        #[serde(rename = "squawk")]
        id: IdentityCode,
        #[serde(rename = "icao24")]
        #[deku(ctx = "crc")]
        ap: AddressParity,
    },

    /// DF=11: All-call reply
    #[deku(id = "11")]
    #[serde(rename = "DF11")]
    AllCall {
        capability: Capability,
        /// Address announced
        #[serde(rename = "icao24")]
        icao: ICAO,
        /// Interrogator identifier overlaid on the parity field
        #[serde(skip)]
        #[deku(ctx = "crc")]
        iid: InterrogatorId,
    },

    /// DF=16: Long Air-Air Surveillance (ACAS)
    #[deku(id = "16")]
    #[serde(rename = "DF16")]
    LongAirAir {
        #[deku(bits = "1")]
        /// Vertical status (0 airborne, 1 on ground)
        vs: u8,
        #[deku(bits = "2")]
        #[serde(skip)]
        reserved1: u8,
        /// Sensitivity level (0 inoperative)
        #[deku(bits = "3")]
        sl: u8,
        #[deku(bits = "2")]
        #[serde(skip)]
        reserved2: u8,
        /// Reply information
        #[deku(bits = "4")]
        ri: u8,
        #[deku(bits = "2")]
        #[serde(skip)]
        reserved3: u8,
        #[serde(rename = "altitude")]
        ac: AltitudeCode13,
        /// ACAS resolution advisory message
        #[deku(count = "7")]
        #[serde(skip)]
        mv: Vec<u8>,
        #[serde(rename = "icao24")]
        #[deku(ctx = "crc")]
        ap: AddressParity,
    },

    /// DF=17: Extended Squitter (ADS-B)
    #[deku(id = "17")]
    #[serde(rename = "ADSB")]
    ExtendedSquitter(ADSB),

    /// DF=18: Extended Squitter from non-transponder equipment
    /// (TIS-B, ADS-R and non-transponder ADS-B)
    #[deku(id = "18")]
    #[serde(rename = "DF18")]
    NonTransponder {
        #[serde(flatten)]
        cf: adsb::ControlField,
        /// Parity/interrogator identifier
        #[serde(skip)]
        pi: ICAO,
    },

    /// DF=19: Extended Squitter Military Application
    #[deku(id = "19")]
    #[serde(skip)]
    Military {
        #[deku(bits = "3")]
        af: u8,
    },

    /// DF=20: Comm-B Altitude Reply
    #[deku(id = "20")]
    #[serde(rename = "DF20")]
    CommBAltitude {
        #[serde(skip)]
        fs: FlightStatus,
        #[serde(skip)]
        dr: DownlinkRequest,
        #[serde(skip)]
        um: UtilityMessage,
        #[serde(rename = "altitude")]
        ac: AltitudeCode13,
        /// Comm-B message field with opportunistic register identification
        #[serde(flatten)]
        bds: DataSelector,
        #[serde(rename = "icao24")]
        #[deku(ctx = "crc")]
        ap: AddressParity,
    },

    /// DF=21: Comm-B Identity Reply
    #[deku(id = "21")]
    #[serde(rename = "DF21")]
    CommBIdentity {
        #[serde(skip)]
        fs: FlightStatus,
        #[serde(skip)]
        dr: DownlinkRequest,
        #[serde(skip)]
        um: UtilityMessage,
        #[serde(rename = "squawk")]
        id: IdentityCode,
        #[serde(flatten)]
        bds: DataSelector,
        #[serde(rename = "icao24")]
        #[deku(ctx = "crc")]
        ap: AddressParity,
    },

    /// DF=24..=31: Comm-D Extended Length Message
    ///
    /// Only two bits of the format field are significant; the next three
    /// bits read here are the low bits of the D-segment number.
    #[deku(id_pat = "24..=31")]
    #[serde(skip)]
    CommD {
        #[deku(bits = "3")]
        nd: u8,
        /// Message, Comm-D, 80 bits
        #[deku(count = "10")]
        md: Vec<u8>,
        parity: ICAO,
    },
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let crc = self.crc;
        match &self.df {
            DF::ShortAirAir { ac, .. } => {
                writeln!(f, " DF0. Short Air-Air Surveillance")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
                if let Some(altitude) = ac.0 {
                    writeln!(f, "  Altitude:      {altitude} ft barometric")?;
                }
            }
            DF::SurveillanceAltitude { fs, ac, .. } => {
                writeln!(f, " DF4. Surveillance, Altitude Reply")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
                writeln!(f, "  Air/Ground:    {fs}")?;
                if let Some(altitude) = ac.0 {
                    writeln!(f, "  Altitude:      {altitude} ft barometric")?;
                }
            }
            DF::SurveillanceIdentity { fs, id, .. } => {
                writeln!(f, " DF5. Surveillance, Identity Reply")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
                writeln!(f, "  Air/Ground:    {fs}")?;
                writeln!(f, "  Squawk:        {id}")?;
            }
            DF::AllCall {
                capability, icao, ..
            } => {
                writeln!(f, " DF11. All Call Reply")?;
                writeln!(f, "  ICAO Address:  {icao}")?;
                writeln!(f, "  Air/Ground:    {capability}")?;
            }
            DF::LongAirAir { ac, .. } => {
                writeln!(f, " DF16. Long Air-Air ACAS")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
                if let Some(altitude) = ac.0 {
                    writeln!(f, "  Baro altitude: {altitude} ft")?;
                }
            }
            DF::ExtendedSquitter(msg) => write!(f, "{msg}")?,
            DF::NonTransponder { cf, .. } => write!(f, "{cf}")?,
            DF::Military { .. } => {}
            DF::CommBAltitude { ac, bds, .. } => {
                writeln!(f, " DF20. Comm-B, Altitude Reply")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
                if let Some(altitude) = ac.0 {
                    writeln!(f, "  Altitude:      {altitude} ft")?;
                }
                write!(f, "{bds}")?;
            }
            DF::CommBIdentity { id, bds, .. } => {
                writeln!(f, " DF21. Comm-B, Identity Reply")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
                writeln!(f, "  Squawk:        {id}")?;
                write!(f, "{bds}")?;
            }
            DF::CommD { .. } => {
                writeln!(f, " DF24. Comm-D Extended Length Message")?;
                writeln!(f, "  ICAO Address:  {crc:06x}")?;
            }
        }
        Ok(())
    }
}

/// ICAO 24-bit transponder address
#[derive(PartialEq, Eq, PartialOrd, DekuRead, Hash, Copy, Clone, Ord)]
pub struct ICAO(#[deku(bits = 24, endian = "big")] pub u32);

impl ICAO {
    /// Bit 24 set marks an address outside the ICAO-allocated space
    /// (anonymous ADS-B or TIS-B track files).
    pub fn is_non_icao(&self) -> bool {
        self.0 & 0x800000 != 0 || self.0 == 0
    }
}

impl fmt::Debug for ICAO {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}", self.0)
    }
}

impl fmt::Display for ICAO {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}", self.0)
    }
}

impl Serialize for ICAO {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:06x}", &self.0))
    }
}

impl core::str::FromStr for ICAO {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num = u32::from_str_radix(s, 16)?;
        Ok(Self(num))
    }
}

/// The 24-bit address recovered from an address-overlaid parity field.
///
/// The bits were already consumed when the checksum was computed, so the
/// reader maps the residual passed down as context instead of re-reading.
#[derive(PartialEq, Eq, DekuRead, Hash, Copy, Clone)]
#[deku(ctx = "crc: u32")]
pub struct AddressParity(
    #[deku(bits = 24, map = "|_v: u32| -> Result<_, DekuError> { Ok(crc) }")]
    pub u32,
);

impl fmt::Debug for AddressParity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}", self.0)
    }
}

impl fmt::Display for AddressParity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06x}", self.0)
    }
}

impl Serialize for AddressParity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:06x}", &self.0))
    }
}

/// Interrogator identifier, the low 7 bits of a DF11 residual.
#[derive(PartialEq, Eq, DekuRead, Copy, Clone, Debug)]
#[deku(ctx = "crc: u32")]
pub struct InterrogatorId(
    #[deku(
        bits = 24,
        map = "|_v: u32| -> Result<_, DekuError> { Ok((crc & 0x7F) as u8) }"
    )]
    pub u8,
);

/// 13 bit identity code (squawk), rendered as 4 octal digits
#[derive(PartialEq, Eq, DekuRead, Copy, Clone)]
pub struct IdentityCode(#[deku(reader = "Self::read(deku::rest)")] pub u16);

impl IdentityCode {
    fn read(
        rest: &BitSlice<u8, Msb0>,
    ) -> Result<(&BitSlice<u8, Msb0>, u16), DekuError> {
        let (rest, num) =
            u16::read(rest, (deku::ctx::Endian::Big, deku::ctx::BitSize(13)))?;
        Ok((rest, squawk_from_id13(num)))
    }
}

impl fmt::Debug for IdentityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl fmt::Display for IdentityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl Serialize for IdentityCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:04x}", &self.0))
    }
}

/// 13 bit encoded altitude in feet, `None` when invalid or unavailable
#[derive(Debug, PartialEq, Eq, serde::Serialize, DekuRead, Copy, Clone)]
pub struct AltitudeCode13(
    #[deku(reader = "Self::read(deku::rest)")] pub Option<i32>,
);

impl AltitudeCode13 {
    fn read(
        rest: &BitSlice<u8, Msb0>,
    ) -> Result<(&BitSlice<u8, Msb0>, Option<i32>), DekuError> {
        let (rest, ac13) =
            u16::read(rest, (deku::ctx::Endian::Big, deku::ctx::BitSize(13)))?;
        Ok((rest, decode_ac13(ac13)))
    }
}

/// Decode the 13-bit altitude code of DF0/4/16/20.
///
/// M=1 reports metres; Q=1 reports 25 ft increments offset by -1000 ft;
/// otherwise the field is a Gillham code in 100 ft steps.
pub fn decode_ac13(ac13: u16) -> Option<i32> {
    if ac13 == 0 {
        return None;
    }
    let m_bit = ac13 & 0x0040;
    let q_bit = ac13 & 0x0010;

    if m_bit != 0 {
        let meters = ((ac13 & 0x1F80) >> 2) | (ac13 & 0x003F);
        Some((meters as f64 * 3.28084) as i32)
    } else if q_bit != 0 {
        // 11 bit integer after removal of the M and Q bits
        let n = ((ac13 & 0x1F80) >> 2)
            | ((ac13 & 0x0020) >> 1)
            | (ac13 & 0x000F);
        Some(i32::from(n) * 25 - 1000)
    } else {
        gillham_altitude(squawk_from_id13(ac13)).map(|n| n * 100).ok()
    }
}

/// Transponder level and additional information (DF11 CA field)
#[derive(Debug, PartialEq, serde::Serialize, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "3")]
pub enum Capability {
    /// Level 1 transponder (surveillance only)
    #[deku(id = "0")]
    #[serde(rename = "level1")]
    Level1,
    #[deku(id = "1")]
    Reserved1,
    #[deku(id = "2")]
    Reserved2,
    #[deku(id = "3")]
    Reserved3,
    /// Level 2 or above transponder, on ground
    #[deku(id = "4")]
    #[serde(rename = "ground")]
    Ground,
    /// Level 2 or above transponder, airborne
    #[deku(id = "5")]
    #[serde(rename = "airborne")]
    Airborne,
    /// Level 2 or above transponder, either airborne or on ground
    #[deku(id = "6")]
    #[serde(rename = "ground/airborne")]
    GroundAirborne,
    /// DR != 0 or FS in 2..=5, airborne or on ground
    #[deku(id = "7")]
    Uncertain,
}

impl Capability {
    /// Air/ground state when the capability reports one
    pub fn on_ground(&self) -> Option<bool> {
        match self {
            Capability::Ground => Some(true),
            Capability::Airborne => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Level1 => "Level 1",
                Self::Ground => "ground",
                Self::Airborne => "airborne",
                Self::GroundAirborne => "ground/airborne",
                Self::Uncertain => "uncertain",
                _ => "reserved",
            }
        )
    }
}

/// Airborne/ground, alert and SPI status (DF4/5/20/21)
#[derive(Debug, PartialEq, serde::Serialize, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "3")]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    NoAlertNoSpiAirborne = 0b000,
    NoAlertNoSpiOnGround = 0b001,
    AlertNoSpiAirborne = 0b010,
    AlertNoSpiOnGround = 0b011,
    AlertSpi = 0b100,
    NoAlertSpi = 0b101,
    Reserved = 0b110,
    NotAssigned = 0b111,
}

impl FlightStatus {
    pub fn alert(&self) -> Option<bool> {
        match self {
            Self::NoAlertNoSpiAirborne
            | Self::NoAlertNoSpiOnGround
            | Self::NoAlertSpi => Some(false),
            Self::AlertNoSpiAirborne
            | Self::AlertNoSpiOnGround
            | Self::AlertSpi => Some(true),
            _ => None,
        }
    }

    pub fn spi(&self) -> Option<bool> {
        match self {
            Self::AlertSpi | Self::NoAlertSpi => Some(true),
            Self::NoAlertNoSpiAirborne
            | Self::NoAlertNoSpiOnGround
            | Self::AlertNoSpiAirborne
            | Self::AlertNoSpiOnGround => Some(false),
            _ => None,
        }
    }

    pub fn on_ground(&self) -> Option<bool> {
        match self {
            Self::NoAlertNoSpiAirborne | Self::AlertNoSpiAirborne => {
                Some(false)
            }
            Self::NoAlertNoSpiOnGround | Self::AlertNoSpiOnGround => {
                Some(true)
            }
            _ => None,
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self.on_ground() {
                Some(true) => "ground",
                Some(false) => "airborne",
                None => "airborne/ground",
            }
        )
    }
}

/// The downlink request (DF4/5/20/21)
#[derive(Debug, PartialEq, Eq, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "5")]
pub enum DownlinkRequest {
    None = 0b00000,
    RequestSendCommB = 0b00001,
    CommBBroadcastMsg1 = 0b00100,
    CommBBroadcastMsg2 = 0b00101,
    #[deku(id_pat = "_")]
    Unknown,
}

/// The utility message (DF4/5/20/21)
#[derive(Debug, PartialEq, Eq, DekuRead, Copy, Clone)]
pub struct UtilityMessage {
    #[deku(bits = "4")]
    pub iis: u8,
    pub ids: UtilityMessageType,
}

#[derive(Debug, PartialEq, Eq, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "2")]
pub enum UtilityMessageType {
    NoInformation = 0b00,
    CommB = 0b01,
    CommC = 0b10,
    CommD = 0b11,
}

/// Ordered surveillance sources, lowest to highest priority.
///
/// A tracked field is only overwritten by a message whose source is at
/// least as good as the one that wrote the current value.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, Copy, Clone,
)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Invalid,
    /// Mode A/C replies
    ModeAc,
    /// Multilateration results fed from upstream
    Mlat,
    /// Mode S frames accepted without a full CRC check
    ModeS,
    /// CRC-checked Mode S frames
    ModeSChecked,
    /// TIS-B and rebroadcast traffic (DF18)
    TisB,
    /// ADS-B extended squitters
    Adsb,
}

/// Addressing schemes, in decreasing order of confidence.
#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, Copy, Clone,
)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    AdsbIcao,
    AdsbIcaoNt,
    AdsrIcao,
    TisbIcao,
    AdsbOther,
    AdsrOther,
    TisbTrackfile,
    TisbOther,
    ModeA,
    Unknown,
}

/// Demodulation and reception context attached to every message.
#[derive(Debug, PartialEq, serde::Serialize, Clone, Default)]
pub struct SensorMetadata {
    /// Unix timestamp of reception, in seconds
    pub system_timestamp: f64,
    /// 12 MHz sample clock tick of the preamble start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_12mhz: Option<u64>,
    /// Signal level in dBFS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f32>,
    /// Candidate score assigned by the demodulator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    /// Number of bits repaired through CRC syndromes
    pub corrected_bits: u8,
}

/// A frame with its reception context and (when parseable) its decode.
#[derive(Debug, PartialEq, serde::Serialize, Clone)]
pub struct TimedMessage {
    /// Unix timestamp, in seconds
    pub timestamp: f64,
    /// The frame as received, before any CRC repair
    #[serde(serialize_with = "frame_as_hex")]
    pub frame: Vec<u8>,
    #[serde(flatten)]
    pub message: Option<Message>,
    pub source: DataSource,
    pub metadata: SensorMetadata,
}

fn frame_as_hex<S>(frame: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(frame))
}

/// Reorder the 13 interleaved Gillham bits of an identity or altitude
/// field into four octal digits (C first, then A, B, D groups).
#[rustfmt::skip]
pub fn squawk_from_id13(id13: u16) -> u16 {
    let mut code: u16 = 0;

    if id13 & 0x1000 != 0 { code |= 0x0010; } // C1
    if id13 & 0x0800 != 0 { code |= 0x1000; } // A1
    if id13 & 0x0400 != 0 { code |= 0x0020; } // C2
    if id13 & 0x0200 != 0 { code |= 0x2000; } // A2
    if id13 & 0x0100 != 0 { code |= 0x0040; } // C4
    if id13 & 0x0080 != 0 { code |= 0x4000; } // A4
    // bit 6 is X (spare) or M
    if id13 & 0x0020 != 0 { code |= 0x0100; } // B1
    if id13 & 0x0010 != 0 { code |= 0x0001; } // D1 or Q
    if id13 & 0x0008 != 0 { code |= 0x0200; } // B2
    if id13 & 0x0004 != 0 { code |= 0x0002; } // D2
    if id13 & 0x0002 != 0 { code |= 0x0400; } // B4
    if id13 & 0x0001 != 0 { code |= 0x0004; } // D4

    code
}

/// Convert a Gillham (reflected Gray) code to an altitude in hundreds of
/// feet. The input uses the four-octal-digit layout of
/// [`squawk_from_id13`].
#[rustfmt::skip]
pub fn gillham_altitude(gray: u16) -> Result<i32, &'static str> {
    let mut five_hundreds: u32 = 0;
    let mut one_hundreds: u32 = 0;

    // D1 set is illegal and C1..C4 cannot all be zero
    if (gray & 0x8889) != 0 || (gray & 0x00F0) == 0 {
        return Err("invalid Gillham code");
    }

    if gray & 0x0010 != 0 { one_hundreds ^= 0x007; } // C1
    if gray & 0x0020 != 0 { one_hundreds ^= 0x003; } // C2
    if gray & 0x0040 != 0 { one_hundreds ^= 0x001; } // C4

    // remove 7s (make 7 -> 5, 5 -> 7)
    if (one_hundreds & 5) == 5 { one_hundreds ^= 2; }
    if one_hundreds > 5 {
        return Err("invalid Gillham code");
    }

    if gray & 0x0002 != 0 { five_hundreds ^= 0x0FF; } // D2
    if gray & 0x0004 != 0 { five_hundreds ^= 0x07F; } // D4
    if gray & 0x1000 != 0 { five_hundreds ^= 0x03F; } // A1
    if gray & 0x2000 != 0 { five_hundreds ^= 0x01F; } // A2
    if gray & 0x4000 != 0 { five_hundreds ^= 0x00F; } // A4
    if gray & 0x0100 != 0 { five_hundreds ^= 0x007; } // B1
    if gray & 0x0200 != 0 { five_hundreds ^= 0x003; } // B2
    if gray & 0x0400 != 0 { five_hundreds ^= 0x001; } // B4

    // odd 500 ft bands count the 100 ft increments downwards
    if five_hundreds & 1 != 0 && one_hundreds <= 6 {
        one_hundreds = 6 - one_hundreds;
    }

    let n = (five_hundreds * 5) + one_hundreds;
    if n >= 13 {
        Ok(n as i32 - 13)
    } else {
        Err("invalid Gillham code")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use hexlit::hex;

    #[test]
    fn test_ac13_altitude() {
        let bytes = hex!("a0001910cc300030aa0000eae004");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        match msg.df {
            DF::CommBAltitude { ac, .. } => {
                assert_eq!(ac.0, Some(39000));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_identity_code() {
        let bytes = hex!("2A00516D492B80");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        match msg.df {
            DF::SurveillanceIdentity { id, .. } => {
                assert_eq!(format!("{id}"), "0356");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_invalid_crc_rejected() {
        let bytes = hex!("8d4ca251204994b1c36e60a5343d");
        let msg = Message::from_bytes((&bytes, 0));
        match msg {
            Err(DekuError::Assertion(_)) => (),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_df17_address() {
        let bytes = hex!("8D4840D6202CC371C32CE0576098");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        assert_eq!(msg.format, 17);
        assert_eq!(msg.crc, 0);
        let (addr, addr_type) = msg.address().unwrap();
        assert_eq!(addr, ICAO(0x4840D6));
        assert_eq!(addr_type, AddressType::AdsbIcao);
        assert_eq!(msg.base_source(), DataSource::Adsb);
    }

    #[test]
    fn test_overlaid_address() {
        let bytes = hex!("a0001910cc300030aa0000eae004");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        let (addr, addr_type) = msg.address().unwrap();
        assert_eq!(addr.0, msg.crc);
        assert_eq!(addr_type, AddressType::Unknown);
    }

    #[test]
    fn test_gillham_round_trip_bands() {
        // 25 ft encoding: Q bit set, N = (value + 1000) / 25
        assert_eq!(decode_ac13(0b0000000010000), Some(-1000));
        // Q=1, bits above and below the Q position both contribute
        assert_eq!(decode_ac13(0b0000000110101), Some(-475));
        // all-zero altitude field means no information
        assert_eq!(decode_ac13(0), None);
    }

    #[test]
    fn test_gillham_rejects_d1() {
        assert!(gillham_altitude(0x0001 | 0x0010).is_err());
    }

    #[test]
    fn test_source_ordering() {
        assert!(DataSource::Adsb > DataSource::TisB);
        assert!(DataSource::TisB > DataSource::ModeSChecked);
        assert!(DataSource::ModeSChecked > DataSource::ModeS);
        assert!(DataSource::ModeS > DataSource::Mlat);
        assert!(DataSource::Mlat > DataSource::ModeAc);
        assert!(DataSource::ModeAc > DataSource::Invalid);
    }
}
