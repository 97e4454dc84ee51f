use crate::decode::cpr::CPRFormat;
use deku::bitvec::{BitSlice, Msb0};
use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * ## Surface Position (BDS 0,6)
 *
 * Surface position messages trade the altitude field for ground speed
 * and track angle.
 *
 * | TC  | MOV | S   | TRK | T   | F   | LAT-CPR | LON-CPR |
 * | --- | --- | --- | --- | --- | --- | ------- | ------- |
 * | 5   | 7   | 1   | 7   | 1   | 1   | 17      | 17      |
 */
#[derive(Debug, PartialEq, DekuRead, Serialize, Copy, Clone)]
#[deku(ctx = "tc: u8")]
pub struct SurfacePosition {
    /// Navigation Uncertainty Category (position), based on the typecode
    #[deku(skip, default = "14 - tc")]
    #[serde(rename = "NUCp")]
    pub nuc_p: u8,

    /// Ground speed in kt, 7-bit non-linear encoding; `None` when the
    /// movement field carries no information
    #[deku(reader = "read_movement(deku::rest)")]
    pub groundspeed: Option<f64>,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub track_status: bool,

    /// Ground track, clockwise from true north, LSB 360/128°
    #[deku(
        bits = "7",
        map = "|value: u8| -> Result<_, DekuError> {
            if *track_status {
                Ok(Some(value as f64 * 360. / 128.))
            } else {
                Ok(None)
            }
        }"
    )]
    pub track: Option<f64>,

    // UTC sync flag
    #[deku(bits = "1")]
    #[serde(skip)]
    pub t: bool,

    pub parity: CPRFormat,

    #[deku(bits = "17", endian = "big")]
    pub lat_cpr: u32,

    #[deku(bits = "17", endian = "big")]
    pub lon_cpr: u32,

    #[deku(skip, default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[deku(skip, default = "None")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Decode the 7-bit movement field into a ground speed in kt.
///
/// The encoding is non-linear, with finer quantization at taxi speeds:
/// codes 1..=8 cover [0, 1) kt, 124 saturates at 175 kt and codes above
/// are reserved.
fn read_movement(
    rest: &BitSlice<u8, Msb0>,
) -> Result<(&BitSlice<u8, Msb0>, Option<f64>), DekuError> {
    let (rest, mov) =
        u8::read(rest, (deku::ctx::Endian::Big, deku::ctx::BitSize(7)))?;
    let value = match mov {
        0 => None,
        1 => Some(0.),
        2..=8 => Some(0.125 + (mov - 2) as f64 * 0.125),
        9..=12 => Some(1. + (mov - 9) as f64 * 0.25),
        13..=38 => Some(2. + (mov - 13) as f64 * 0.5),
        39..=93 => Some(15. + (mov - 39) as f64 * 1.),
        94..=108 => Some(70. + (mov - 94) as f64 * 2.),
        109..=123 => Some(100. + (mov - 109) as f64 * 5.),
        124 => Some(175.),
        _ => None, // reserved
    };
    Ok((rest, value))
}

impl fmt::Display for SurfacePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Surface position (BDS 0,6)")?;
        let groundspeed = self
            .groundspeed
            .map_or_else(|| "None".to_string(), |gs| format!("{gs} kts"));
        let track = self
            .track
            .map_or_else(|| "None".to_string(), |trk| format!("{trk}°"));
        writeln!(f, "  Groundspeed:   {groundspeed}")?;
        writeln!(f, "  Track angle:   {track}")?;
        writeln!(f, "  CPR parity:    {}", self.parity)?;
        writeln!(f, "  CPR latitude:  ({})", self.lat_cpr)?;
        writeln!(f, "  CPR longitude: ({})", self.lon_cpr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::adsb::MEKind;
    use crate::decode::{Message, DF};
    use hexlit::hex;

    fn surface(bytes: &[u8]) -> SurfacePosition {
        let msg = Message::from_bytes((bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            if let MEKind::SurfacePosition(me) = adsb.message.kind {
                return me;
            }
        }
        unreachable!()
    }

    #[test]
    fn test_surface_position() {
        let me = surface(&hex!("8c4841753a9a153237aef0f275be"));
        assert_eq!(me.track, Some(92.8125));
        assert_eq!(me.groundspeed, Some(17.));
        assert_eq!(me.parity, CPRFormat::Odd);
    }

    #[test]
    fn test_movement_mid_range() {
        // movement code 25: 2.0 + (25 - 13) * 0.5 = 8.0 kt
        let me = surface(&hex!("8c3461cf399d6059814ea81483a9"));
        assert_eq!(me.groundspeed, Some(8.0));
    }
}
