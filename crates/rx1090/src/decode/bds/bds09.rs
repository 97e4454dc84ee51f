use deku::bitvec::{BitSlice, Msb0};
use deku::prelude::*;
use serde::ser::SerializeStruct;
use serde::Serialize;
use std::fmt;

/**
 * ## Airborne Velocity (BDS 0,9)
 *
 * Transmitted with typecode 19; the subtype in bits 6-8 selects the
 * layout. Subtypes 1 and 2 report ground speed as east-west and
 * north-south components; subtypes 3 and 4 report airspeed and heading,
 * used when no position source is available. The even subtypes carry a
 * four-fold coarser speed resolution for supersonic aircraft.
 */
#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
pub struct AirborneVelocity {
    #[deku(bits = "3")]
    #[serde(skip)]
    pub subtype: u8,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub intent_change: bool,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub ifr_capability: bool,

    /// Navigation Accuracy Category, velocity (NUCv in ADS-B v0)
    #[deku(bits = "3")]
    #[serde(rename = "NACv")]
    pub nac_v: u8,

    /// Ground speed or airspeed depending on the subtype
    #[deku(ctx = "*subtype")]
    #[serde(flatten)]
    pub velocity: AirborneVelocitySubType,

    /// The source for the vertical rate measurement
    pub vrate_src: VerticalRateSource,

    #[serde(skip)]
    pub vrate_sign: Sign,

    /// Vertical rate in ft/min, `None` if unavailable
    #[deku(
        endian = "big",
        bits = "9",
        map = "|v: u16| -> Result<_, DekuError> {
            if v == 0 { Ok(None) }
            else {
                Ok(Some(vrate_sign.value() * (v as i16 - 1) * 64))
            }
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_rate: Option<i16>,

    #[deku(bits = "2")]
    #[serde(skip)]
    pub reserved: u8,

    #[serde(skip)]
    pub gnss_sign: Sign,

    /// Signed difference between GNSS height and barometric altitude, ft
    #[deku(reader = "read_geo_minus_baro(deku::rest, *gnss_sign)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_minus_baro: Option<i16>,
}

fn read_geo_minus_baro(
    rest: &BitSlice<u8, Msb0>,
    gnss_sign: Sign,
) -> Result<(&BitSlice<u8, Msb0>, Option<i16>), DekuError> {
    let (rest, value) =
        u8::read(rest, (deku::ctx::Endian::Big, deku::ctx::BitSize(7)))?;
    let value = if value > 1 {
        Some(gnss_sign.value() * 25 * (value as i16 - 1))
    } else {
        None
    };
    Ok((rest, value))
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
#[deku(ctx = "subtype: u8", id = "subtype")]
#[serde(untagged)]
pub enum AirborneVelocitySubType {
    #[deku(id = "0")]
    #[serde(skip)]
    Reserved0(#[deku(bits = "22", endian = "big")] u32),

    #[deku(id_pat = "1..=2")]
    GroundSpeed(#[deku(ctx = "subtype")] GroundSpeedDecoding),

    #[deku(id_pat = "3..=4")]
    Airspeed(#[deku(ctx = "subtype")] AirspeedDecoding),

    #[deku(id_pat = "5..=7")]
    #[serde(skip)]
    Reserved1(#[deku(bits = "22", endian = "big")] u32),
}

#[derive(Debug, PartialEq, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "1")]
pub enum Sign {
    Positive = 0,
    Negative = 1,
}

impl Sign {
    #[must_use]
    pub fn value(&self) -> i16 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
        }
    }
}

/// Ground speed as east-west and north-south components; supersonic
/// subtypes scale the component resolution by four.
#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
#[deku(ctx = "subtype: u8")]
pub struct GroundSpeedDecoding {
    #[serde(skip)]
    pub ew_sign: Sign,
    #[deku(
        endian = "big",
        bits = "10",
        map = "|val: u16| -> Result<_, DekuError> {
            let scale = if subtype == 2 { 4 } else { 1 };
            Ok(f64::from((val as i16 - 1) * ew_sign.value() * scale))
        }"
    )]
    #[serde(skip)]
    pub ew_vel: f64,
    #[serde(skip)]
    pub ns_sign: Sign,
    #[deku(
        endian = "big",
        bits = "10",
        map = "|val: u16| -> Result<_, DekuError> {
            let scale = if subtype == 2 { 4 } else { 1 };
            Ok(f64::from((val as i16 - 1) * ns_sign.value() * scale))
        }"
    )]
    #[serde(skip)]
    pub ns_vel: f64,

    #[deku(
        skip,
        default = "libm::hypot(f64::abs(*ew_vel), f64::abs(*ns_vel))"
    )]
    pub groundspeed: f64,

    #[deku(
        skip,
        default = "
        let h = libm::atan2(*ew_vel, *ns_vel) *
            (360.0 / (2.0 * std::f64::consts::PI));
        if h < 0.0 { h + 360. } else { h }
        "
    )]
    pub track: f64,
}

/// Airspeed and magnetic heading; supersonic subtypes scale the speed
/// resolution by four.
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(ctx = "subtype: u8")]
pub struct AirspeedDecoding {
    #[deku(bits = "1")]
    pub status_heading: bool,

    #[deku(
        endian = "big",
        bits = "10",
        map = "|val: u16| -> Result<_, DekuError> {
            Ok(if *status_heading { Some(val as f64 * 360. / 1024.) } else { None })
        }"
    )]
    pub heading: Option<f64>,

    pub airspeed_type: AirspeedType,

    #[deku(
        endian = "big",
        bits = "10",
        map = "|value: u16| -> Result<_, DekuError> {
            if value == 0 { return Ok(None) }
            let scale = if subtype == 4 { 4 } else { 1 };
            Ok(Some(scale * (value - 1)))
        }"
    )]
    pub airspeed: Option<u16>,
}

impl Serialize for AirspeedDecoding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let mut state = serializer.serialize_struct("Message", 2)?;
        if let Some(heading) = &self.heading {
            state.serialize_field("heading", heading)?;
        }
        if let Some(airspeed) = &self.airspeed {
            match &self.airspeed_type {
                AirspeedType::IAS => state.serialize_field("IAS", &airspeed)?,
                AirspeedType::TAS => state.serialize_field("TAS", &airspeed)?,
            }
        }
        state.end()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, DekuRead)]
#[deku(type = "u8", bits = "1")]
pub enum AirspeedType {
    IAS = 0,
    TAS = 1,
}

impl fmt::Display for AirspeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::IAS => "IAS",
                Self::TAS => "TAS",
            }
        )
    }
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
#[deku(type = "u8", bits = "1")]
pub enum VerticalRateSource {
    #[serde(rename = "barometric")]
    BarometricPressureAltitude = 0,

    #[serde(rename = "GNSS")]
    GeometricAltitude = 1,
}

impl fmt::Display for VerticalRateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::BarometricPressureAltitude => "barometric",
                Self::GeometricAltitude => "GNSS",
            }
        )
    }
}

impl fmt::Display for AirborneVelocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Airborne velocity over ground (BDS 0,9)")?;
        match &self.velocity {
            AirborneVelocitySubType::GroundSpeed(v) => {
                writeln!(f, "  Track angle:   {}°", libm::round(v.track))?;
                writeln!(
                    f,
                    "  Groundspeed:   {} kt",
                    libm::round(v.groundspeed)
                )?;
            }
            AirborneVelocitySubType::Airspeed(v) => {
                if let Some(value) = v.airspeed {
                    writeln!(f, "  {}:           {} kt", v.airspeed_type, value)?;
                }
                if let Some(value) = v.heading {
                    writeln!(f, "  Heading:       {}°", libm::round(value))?;
                }
            }
            AirborneVelocitySubType::Reserved0(_)
            | AirborneVelocitySubType::Reserved1(_) => {}
        }
        if let Some(vr) = &self.vertical_rate {
            writeln!(f, "  Vertical rate: {} ft/min {}", vr, &self.vrate_src)?;
        }
        if let Some(value) = &self.geo_minus_baro {
            writeln!(f, "  GNSS delta:    {} ft", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::adsb::MEKind;
    use crate::decode::{Message, DF};
    use approx::assert_relative_eq;
    use hexlit::hex;

    fn velocity(bytes: &[u8]) -> AirborneVelocity {
        let msg = Message::from_bytes((bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            if let MEKind::AirborneVelocity(me) = adsb.message.kind {
                return me;
            }
        }
        unreachable!()
    }

    #[test]
    fn test_groundspeed_velocity() {
        let velocity = velocity(&hex!("8D485020994409940838175B284F"));
        if let AirborneVelocitySubType::GroundSpeed(gsd) = velocity.velocity {
            assert_relative_eq!(gsd.groundspeed, 159., max_relative = 1e-2);
            assert_relative_eq!(gsd.track, 182.88, max_relative = 1e-2);
        } else {
            unreachable!();
        }
        assert_eq!(velocity.vertical_rate, Some(-832));
        assert_eq!(velocity.geo_minus_baro, Some(550));
    }

    #[test]
    fn test_airspeed_velocity() {
        let velocity = velocity(&hex!("8DA05F219B06B6AF189400CBC33F"));
        if let AirborneVelocitySubType::Airspeed(asd) = velocity.velocity {
            assert_eq!(asd.airspeed, Some(375));
            assert_relative_eq!(
                asd.heading.unwrap(),
                244.,
                max_relative = 1e-2
            );
        } else {
            unreachable!();
        }
        assert_eq!(velocity.vertical_rate, Some(-2304));
    }
}
