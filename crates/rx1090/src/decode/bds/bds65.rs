use deku::prelude::*;
use serde::Serialize;
use std::fmt;

/**
 * ## Aircraft Operational Status (BDS 6,5 / TYPE=31)
 *
 * Capability classes, operational modes and the ADS-B version of the
 * transmitting installation, with the accuracy and integrity metadata
 * (NIC supplement, NACp, SIL) the tracker attaches to position data.
 *
 * | TYPE | SUBTYPE | CC/LW | OM  | VER | NICs | NACP | GVA | SIL | NICb/TRK | HRD | SILs | RES |
 * |------|---------|-------|-----|-----|------|------|-----|-----|----------|-----|------|-----|
 * | 5    | 3       | 16    | 16  | 3   | 1    | 4    | 2   | 2   | 1        | 1   | 1    | 1   |
 */
#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct OperationStatus {
    #[deku(bits = "3")]
    #[serde(skip)]
    pub subtype: u8,

    #[serde(flatten)]
    #[deku(ctx = "*subtype")]
    pub kind: OperationStatusKind,
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
#[deku(ctx = "subtype: u8", id = "subtype")]
#[serde(untagged)]
pub enum OperationStatusKind {
    #[deku(id = "0")]
    Airborne(OperationStatusAirborne),

    #[deku(id = "1")]
    Surface(OperationStatusSurface),

    #[deku(id_pat = "_")]
    #[serde(skip)]
    Reserved(#[deku(bits = "48", endian = "big")] u64),
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct OperationStatusAirborne {
    #[serde(skip)]
    pub capability_class: CapabilityClassAirborne,

    #[serde(skip)]
    pub operational_mode: OperationalMode,

    /// ADS-B version: 0 DO-260, 1 DO-260A, 2 DO-260B
    #[deku(bits = "3")]
    pub version: u8,

    #[deku(bits = "1")]
    #[serde(rename = "NICs")]
    pub nic_supplement_a: u8,

    /// Navigation Accuracy Category, position
    #[deku(bits = "4")]
    #[serde(rename = "NACp")]
    pub nac_p: u8,

    /// Geometric Vertical Accuracy
    #[deku(bits = "2")]
    #[serde(rename = "GVA")]
    pub gva: u8,

    /// Source Integrity Level
    #[deku(bits = "2")]
    #[serde(rename = "SIL")]
    pub sil: u8,

    /// Barometric altitude cross-checked
    #[deku(bits = "1")]
    pub nic_baro: u8,

    /// Heading reference: 0 true north, 1 magnetic north
    #[deku(bits = "1")]
    #[serde(skip)]
    pub hrd: u8,

    #[deku(bits = "1", pad_bits_after = "1")]
    #[serde(skip)]
    pub sil_supplement: u8,
}

impl fmt::Display for OperationStatusAirborne {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   Version:            {}", self.version)?;
        writeln!(f, "   Capability classes: {}", self.capability_class)?;
        writeln!(f, "   Operational modes:  {}", self.operational_mode)?;
        writeln!(f, "   NACp:               {}", self.nac_p)?;
        writeln!(f, "   SIL:                {}", self.sil)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct CapabilityClassAirborne {
    #[deku(bits = "2")]
    #[serde(skip)]
    pub reserved0: u8,

    /// TCAS operational
    #[deku(bits = "1")]
    #[serde(rename = "ACAS")]
    pub acas: bool,

    /// Cockpit display of traffic information
    #[deku(bits = "1")]
    #[serde(rename = "CDTI")]
    pub cdti: bool,

    #[deku(bits = "2")]
    #[serde(skip)]
    pub reserved1: u8,

    /// Air-referenced velocity report capability
    #[deku(bits = "1")]
    #[serde(rename = "ARV")]
    pub arv: bool,

    /// Target state report capability
    #[deku(bits = "1")]
    #[serde(rename = "TS")]
    pub ts: bool,

    /// Trajectory change report capability
    #[deku(bits = "2", pad_bits_after = "6")]
    #[serde(rename = "TC")]
    pub tc: u8,
}

impl fmt::Display for CapabilityClassAirborne {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.acas {
            write!(f, " ACAS")?;
        }
        if self.cdti {
            write!(f, " CDTI")?;
        }
        if self.arv {
            write!(f, " ARV")?;
        }
        if self.ts {
            write!(f, " TS")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct OperationStatusSurface {
    #[serde(skip)]
    pub capability_class: CapabilityClassSurface,

    /// Aircraft length/width code
    #[deku(bits = "4")]
    #[serde(skip)]
    pub lw_codes: u8,

    #[serde(skip)]
    pub operational_mode: OperationalMode,

    /// ADS-B version: 0 DO-260, 1 DO-260A, 2 DO-260B
    #[deku(bits = "3")]
    pub version: u8,

    #[deku(bits = "1")]
    #[serde(rename = "NICs")]
    pub nic_supplement_c: u8,

    #[deku(bits = "4", pad_bits_after = "2")]
    #[serde(rename = "NACp")]
    pub nac_p: u8,

    #[deku(bits = "2")]
    #[serde(rename = "SIL")]
    pub sil: u8,

    /// Track angle (0) or heading (1) in surface position reports
    #[deku(bits = "1")]
    #[serde(skip)]
    pub trk_hdg: u8,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub hrd: u8,

    #[deku(bits = "1", pad_bits_after = "1")]
    #[serde(skip)]
    pub sil_supplement: u8,
}

impl fmt::Display for OperationStatusSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   Version:            {}", self.version)?;
        writeln!(f, "   NACp:               {}", self.nac_p)?;
        writeln!(f, "   SIL:                {}", self.sil)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct CapabilityClassSurface {
    #[deku(bits = "2")]
    #[serde(skip)]
    pub reserved0: u8,

    /// Position offset applied
    #[deku(bits = "1")]
    pub poe: bool,

    /// 1090ES receive capability
    #[deku(bits = "1")]
    #[serde(rename = "1090ES")]
    pub es1090: bool,

    #[deku(bits = "2")]
    #[serde(skip)]
    pub reserved1: u8,

    /// Class B2 ground vehicle transmitting below 70 W
    #[deku(bits = "1")]
    #[serde(rename = "GRND")]
    pub b2_low: bool,

    /// UAT receive capability
    #[deku(bits = "1")]
    pub uat_in: bool,

    /// Navigation accuracy category, velocity
    #[deku(bits = "3")]
    #[serde(rename = "NACv")]
    pub nac_v: u8,

    /// NIC supplement C
    #[deku(bits = "1")]
    #[serde(skip)]
    pub nic_supplement_c: u8,
}

/// Operational mode (OM) field, common to both subtypes
#[derive(Debug, PartialEq, Serialize, DekuRead, Copy, Clone)]
pub struct OperationalMode {
    #[deku(bits = "2")]
    #[serde(skip)]
    pub reserved0: u8,

    /// TCAS resolution advisory active
    #[deku(bits = "1")]
    pub tcas_ra_active: bool,

    /// IDENT switch active
    #[deku(bits = "1")]
    pub ident_switch: bool,

    #[deku(bits = "1")]
    #[serde(skip)]
    pub reserved_atc: u8,

    /// Single antenna flag
    #[deku(bits = "1")]
    pub single_antenna: bool,

    /// System design assurance
    #[deku(bits = "2", pad_bits_after = "8")]
    pub sda: u8,
}

impl fmt::Display for OperationalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tcas_ra_active {
            write!(f, " TCAS-RA")?;
        }
        if self.ident_switch {
            write!(f, " IDENT")?;
        }
        if self.single_antenna {
            write!(f, " SA")?;
        }
        Ok(())
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Aircraft operational status (BDS 6,5)")?;
        match &self.kind {
            OperationStatusKind::Airborne(airborne) => write!(f, "{airborne}"),
            OperationStatusKind::Surface(surface) => write!(f, "{surface}"),
            OperationStatusKind::Reserved(_) => Ok(()),
        }
    }
}

impl OperationStatus {
    /// The NACp reported by this status, both subtypes
    pub fn nac_p(&self) -> Option<u8> {
        match &self.kind {
            OperationStatusKind::Airborne(st) => Some(st.nac_p),
            OperationStatusKind::Surface(st) => Some(st.nac_p),
            OperationStatusKind::Reserved(_) => None,
        }
    }

    pub fn version(&self) -> Option<u8> {
        match &self.kind {
            OperationStatusKind::Airborne(st) => Some(st.version),
            OperationStatusKind::Surface(st) => Some(st.version),
            OperationStatusKind::Reserved(_) => None,
        }
    }
}
