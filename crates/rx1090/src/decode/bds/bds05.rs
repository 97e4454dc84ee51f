use crate::decode::cpr::CPRFormat;
use crate::decode::{gillham_altitude, squawk_from_id13};
use deku::bitvec::{BitSlice, Msb0};
use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * ## Airborne Position (BDS 0,5)
 *
 * with barometric altitude (TC=9..=18) or geometric height (TC=20..=22)
 *
 * | TC | SS | SAF | ALT | T | F | LAT-CPR | LON-CPR |
 * | -- | -- | --- | --- | - | - | ------- | ------- |
 * | 5  | 2  |  1  | 12  | 1 | 1 |   17    |   17    |
 */
#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
#[deku(ctx = "tc: u8")]
pub struct AirbornePosition {
    /// Navigation Uncertainty Category (position), directly based on
    /// the typecode
    #[deku(
        skip,
        default = "match tc { n if n < 19 => 18 - tc, 20 | 21 => 29 - tc, _ => 0 }"
    )]
    #[serde(rename = "NUCp")]
    pub nuc_p: u8,

    #[serde(skip)]
    pub ss: SurveillanceStatus,

    /// Single Antenna Flag (ADS-B v0/v1) or NIC supplement-b (v2)
    #[deku(bits = "1")]
    #[serde(skip)]
    pub saf_or_nicb: u8,

    /// Altitude in feet, encoded on 12 bits; `None` when unavailable
    #[deku(reader = "decode_ac12(deku::rest)")]
    #[serde(rename = "altitude")]
    pub alt: Option<i32>,

    /// Whether the altitude is barometric or geometric, from the typecode
    #[deku(
        skip,
        default = "if tc < 19 { AltitudeSource::Barometric } else { AltitudeSource::Gnss }"
    )]
    pub source: AltitudeSource,

    // UTC sync flag
    #[deku(bits = "1")]
    #[serde(skip)]
    pub t: bool,

    pub parity: CPRFormat,

    #[deku(bits = "17", endian = "big")]
    pub lat_cpr: u32,

    #[deku(bits = "17", endian = "big")]
    pub lon_cpr: u32,

    /// Decoded latitude, filled by the tracker once CPR resolves
    #[deku(skip, default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[deku(skip, default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Decode the 12-bit altitude field of airborne position messages.
///
/// Q=1 gives 25 ft increments offset by -1000 ft; otherwise the field
/// carries a Gillham code in 100 ft steps.
pub fn decode_ac12(
    rest: &BitSlice<u8, Msb0>,
) -> Result<(&BitSlice<u8, Msb0>, Option<i32>), DekuError> {
    let (rest, num) =
        u16::read(rest, (deku::ctx::Endian::Big, deku::ctx::BitSize(12)))?;

    if num == 0 {
        return Ok((rest, None));
    }
    let q = num & 0x10;

    if q > 0 {
        let n = ((num & 0x0FE0) >> 1) | (num & 0x000F);
        Ok((rest, Some(i32::from(n) * 25 - 1000)))
    } else {
        // expand to the 13-bit layout with the M bit cleared
        let n13 = ((num & 0x0FC0) << 1) | (num & 0x003F);
        let alt = gillham_altitude(squawk_from_id13(n13)).map(|n| n * 100);
        Ok((rest, alt.ok()))
    }
}

impl fmt::Display for AirbornePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Airborne position (BDS 0,5)")?;
        let altitude = self
            .alt
            .map_or_else(|| "None".to_string(), |alt| format!("{alt} ft"));
        writeln!(f, "  Altitude:      {} {}", altitude, self.source)?;
        writeln!(f, "  CPR parity:    {}", self.parity)?;
        writeln!(f, "  CPR latitude:  ({})", self.lat_cpr)?;
        writeln!(f, "  CPR longitude: ({})", self.lon_cpr)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "2")]
pub enum SurveillanceStatus {
    NoCondition = 0,
    PermanentAlert = 1,
    TemporaryAlert = 2,
    SPICondition = 3,
}

#[derive(Debug, PartialEq, Eq, Serialize, Copy, Clone)]
pub enum AltitudeSource {
    #[serde(rename = "barometric")]
    Barometric,
    #[serde(rename = "GNSS")]
    Gnss,
}

impl fmt::Display for AltitudeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Barometric => "barometric",
                Self::Gnss => "GNSS",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::adsb::MEKind;
    use crate::decode::{Message, DF};
    use hexlit::hex;

    fn airborne(bytes: &[u8]) -> AirbornePosition {
        let msg = Message::from_bytes((bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            if let MEKind::AirbornePosition(me) = adsb.message.kind {
                return me;
            }
        }
        unreachable!()
    }

    #[test]
    fn test_altitude() {
        let me = airborne(&hex!("8D40621D58C382D690C8AC2863A7"));
        assert_eq!(me.alt, Some(38000));
        assert_eq!(me.source, AltitudeSource::Barometric);
        assert_eq!(me.parity, CPRFormat::Even);
        assert_eq!(me.lat_cpr, 93000);
        assert_eq!(me.lon_cpr, 51372);
    }

    #[test]
    fn test_odd_frame() {
        let me = airborne(&hex!("8D40621D58C386435CC412692AD6"));
        assert_eq!(me.parity, CPRFormat::Odd);
        assert_eq!(me.lat_cpr, 74158);
        assert_eq!(me.lon_cpr, 50194);
    }
}
