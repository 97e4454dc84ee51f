use deku::bitvec::{BitSlice, Msb0};
use deku::prelude::*;
use serde::Serialize;
use std::fmt;

use super::bds::bds08::callsign_read;

/**
 * ## Comm-B message field (DF20/21)
 *
 * The 56-bit MB field carries whichever register the interrogator asked
 * for, and the downlink gives no indication of which one. Identification
 * is opportunistic: register 2,0 (aircraft identification) is recognised
 * by its BDS code in the first byte and a plausible callsign charset;
 * everything else is kept as raw bytes.
 */
#[derive(Debug, PartialEq, Serialize, DekuRead, Clone)]
pub struct DataSelector {
    /// Callsign when the MB field looks like register 2,0
    #[deku(reader = "read_bds20(deku::rest)")]
    #[serde(rename = "callsign", skip_serializing_if = "Option::is_none")]
    pub bds20: Option<String>,

    /// Raw register content
    #[deku(count = "7")]
    #[serde(skip)]
    pub mb: Vec<u8>,
}

/// Peek at the MB field without consuming it; the raw bytes are kept by
/// the field that follows.
fn read_bds20(
    rest: &BitSlice<u8, Msb0>,
) -> Result<(&BitSlice<u8, Msb0>, Option<String>), DekuError> {
    if rest.len() < 56 {
        return Err(DekuError::Incomplete(deku::error::NeedSize::new(56)));
    }
    let (_, first) = u8::read(rest, deku::ctx::BitSize(8))?;
    if first != 0x20 {
        return Ok((rest, None));
    }
    let (_, callsign) = callsign_read(&rest[8..])?;
    let plausible = callsign.chars().all(|c| {
        c.is_ascii_uppercase() || c.is_ascii_digit() || c == ' '
    }) && !callsign.trim_end().is_empty();
    Ok((rest, if plausible { Some(callsign) } else { None }))
}

impl fmt::Display for DataSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(callsign) = &self.bds20 {
            writeln!(f, "  Callsign:      {}", callsign.trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Message, DF};
    use hexlit::hex;

    #[test]
    fn test_bds20_callsign() {
        let bytes = hex!("A000083E202CC371C31DE0AA1CCF");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        match msg.df {
            DF::CommBAltitude { bds, .. } => {
                assert_eq!(bds.bds20.as_deref(), Some("KLM1017 "));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_unidentified_register() {
        let bytes = hex!("a0001910cc300030aa0000eae004");
        let msg = Message::from_bytes((&bytes, 0)).unwrap().1;
        match msg.df {
            DF::CommBAltitude { bds, .. } => {
                assert_eq!(bds.bds20, None);
                assert_eq!(bds.mb.len(), 7);
            }
            _ => unreachable!(),
        }
    }
}
