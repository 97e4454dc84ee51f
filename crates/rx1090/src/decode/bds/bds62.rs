use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * ## Target State and Status (BDS 6,2 / TYPE=29)
 *
 * Selected altitude, barometric setting, selected heading and the
 * autopilot mode flags, for trajectory prediction.
 *
 * | TYPE | SUB | SIL+ | SRC | ALT | QNH | HDG | NACP | NICB | SIL | MODES | RES |
 * |------|-----|------|-----|-----|-----|-----|------|------|-----|-------|-----|
 * | 5    | 2   | 1    | 1   | 11  | 9   | 1+9 | 4    | 1    | 2   | 8     | 2   |
 */
#[derive(Copy, Clone, Debug, Serialize, PartialEq, DekuRead)]
pub struct TargetStateAndStatus {
    #[deku(bits = "2")]
    #[serde(skip)]
    pub subtype: u8,

    /// SIL probability basis: false per hour, true per sample
    #[deku(bits = "1")]
    #[serde(skip)]
    pub sil_supplement: bool,

    /// Selected altitude source: false MCP/FCU, true FMS
    #[deku(bits = "1")]
    #[serde(skip)]
    pub altitude_source_fms: bool,

    /// MCP/FCU or FMS selected altitude, LSB 32 ft, rounded to the
    /// nearest 100 ft; `None` when no data
    #[deku(
        endian = "big",
        bits = "11",
        map = "|v: u16| -> Result<_, DekuError> {
            if v == 0 { Ok(None) }
            else { Ok(Some(((v - 1) * 32 + 16) / 100 * 100)) }
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_altitude: Option<u16>,

    /// Barometric pressure setting minus 800 mbar, LSB 0.8 mbar
    #[deku(
        endian = "big",
        bits = "9",
        map = "|v: u16| -> Result<_, DekuError> {
            if v == 0 { Ok(None) }
            else { Ok(Some(800. + f64::from(v - 1) * 0.8)) }
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barometric_setting: Option<f64>,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub heading_status: bool,

    /// Selected heading, LSB 180/256°, wrapped to [0, 360)
    #[deku(
        endian = "big",
        bits = "9",
        map = "|v: u16| -> Result<_, DekuError> {
            if *heading_status {
                Ok(Some(f64::from(v) * 180. / 256.))
            } else { Ok(None) }
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_heading: Option<f64>,

    /// Navigation Accuracy Category, position
    #[deku(bits = "4")]
    #[serde(rename = "NACp")]
    pub nac_p: u8,

    /// Barometric altitude cross-checked against another source
    #[deku(bits = "1")]
    pub nic_baro: bool,

    /// Source Integrity Level
    #[deku(bits = "2")]
    #[serde(rename = "SIL")]
    pub sil: u8,

    /// Validity of the mode flags below
    #[deku(bits = "1")]
    #[serde(skip)]
    pub mode_status: bool,

    #[deku(
        bits = "1",
        map = "|v: bool| -> Result<_, DekuError> {
            Ok(if *mode_status { Some(v) } else { None })
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autopilot: Option<bool>,

    #[deku(
        bits = "1",
        map = "|v: bool| -> Result<_, DekuError> {
            Ok(if *mode_status { Some(v) } else { None })
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnav_mode: Option<bool>,

    #[deku(
        bits = "1",
        map = "|v: bool| -> Result<_, DekuError> {
            Ok(if *mode_status { Some(v) } else { None })
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_hold: Option<bool>,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub imf: bool,

    #[deku(
        bits = "1",
        map = "|v: bool| -> Result<_, DekuError> {
            Ok(if *mode_status { Some(v) } else { None })
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approach_mode: Option<bool>,

    /// TCAS operational, valid regardless of the mode status bit
    #[deku(bits = "1")]
    pub tcas_operational: bool,

    #[deku(
        bits = "1",
        pad_bits_after = "2",
        map = "|v: bool| -> Result<_, DekuError> {
            Ok(if *mode_status { Some(v) } else { None })
        }"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lnav_mode: Option<bool>,
}

impl fmt::Display for TargetStateAndStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Target state and status (BDS 6,2)")?;
        if let Some(alt) = self.selected_altitude {
            let source = if self.altitude_source_fms { "FMS" } else { "MCP" };
            writeln!(f, "  Selected alt:  {alt} ft ({source})")?;
        }
        if let Some(qnh) = self.barometric_setting {
            writeln!(f, "  QNH:           {qnh} mbar")?;
        }
        if let Some(heading) = self.selected_heading {
            writeln!(f, "  Heading:       {heading}°")?;
        }
        writeln!(f, "  NACp:          {}", self.nac_p)?;
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

    #[test]
    fn test_target_state_and_status() {
        let bytes = hex!("8DA05629EA21485CBF3F8CADAEEB");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        if let DF::ExtendedSquitter(adsb) = msg.df {
            if let MEKind::TargetStateAndStatus(me) = adsb.message.kind {
                assert_eq!(me.subtype, 1);
                assert_eq!(me.selected_altitude, Some(17000));
                assert_relative_eq!(
                    me.barometric_setting.unwrap(),
                    1012.8,
                    max_relative = 1e-6
                );
                assert_eq!(me.selected_heading, Some(66.796875));
                assert_eq!(me.nac_p, 9);
                assert_eq!(me.sil, 3);
                assert!(me.nic_baro);
                assert_eq!(me.autopilot, Some(true));
                assert_eq!(me.vnav_mode, Some(true));
                assert_eq!(me.alt_hold, Some(false));
                assert!(me.tcas_operational);
                assert_eq!(me.lnav_mode, Some(true));
                return;
            }
        }
        unreachable!();
    }
}
