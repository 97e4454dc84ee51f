/*!
 * Raw IQ to unsigned 16-bit magnitude conversion.
 *
 * One converter per input sample format, with two optional stages: a
 * single-pole DC block on the IQ components and a soft AGC that
 * normalises the output towards a fixed RMS level. The output scale
 * keeps the noise floor well above zero and pulse peaks below full
 * scale.
 */
use std::str::FromStr;

use num_complex::Complex;
use once_cell::sync::Lazy;

/// Input sample layouts
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SampleFormat {
    /// 8-bit unsigned IQ pairs (RTL-SDR style)
    Uc8,
    /// 16-bit signed little-endian IQ pairs
    Sc16,
    /// 16-bit signed IQ in Q1.11 fixed point (bladeRF style)
    Sc16Q11,
}

impl SampleFormat {
    /// Bytes per complex sample
    pub fn sample_bytes(&self) -> usize {
        match self {
            SampleFormat::Uc8 => 2,
            SampleFormat::Sc16 | SampleFormat::Sc16Q11 => 4,
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uc8" => Ok(SampleFormat::Uc8),
            "sc16" => Ok(SampleFormat::Sc16),
            "sc16q11" => Ok(SampleFormat::Sc16Q11),
            other => Err(format!("unknown sample format: {other}")),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct ConverterConfig {
    pub format: SampleFormat,
    pub dc_block: bool,
    pub agc: bool,
}

/// Magnitude of every possible UC8 IQ pair, computed once.
static UC8_LUT: Lazy<Vec<u16>> = Lazy::new(|| {
    let mut lut = vec![0u16; 65536];
    for i in 0..=255u16 {
        for q in 0..=255u16 {
            let di = f64::from(i) - 127.5;
            let dq = f64::from(q) - 127.5;
            // 127.5 * sqrt(2) maps to full scale
            let mag = libm::hypot(di, dq) / 180.312_229;
            lut[usize::from(i) << 8 | usize::from(q)] =
                (mag * 65535.0).min(65535.0) as u16;
        }
    }
    lut
});

/// DC block filter constant: convergence over a few thousand samples
const DC_ALPHA: f32 = 1.0 / 4096.0;

/// Soft AGC target RMS, fraction of full scale
const AGC_TARGET: f32 = 0.15;

/// AGC gain smoothing per block
const AGC_ALPHA: f32 = 0.25;

pub struct Converter {
    format: SampleFormat,
    dc_block: bool,
    agc: bool,
    dc: Complex<f32>,
    gain: f32,
}

impl Converter {
    pub fn new(config: &ConverterConfig) -> Self {
        Converter {
            format: config.format,
            dc_block: config.dc_block,
            agc: config.agc,
            dc: Complex::new(0.0, 0.0),
            gain: 1.0,
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Convert a raw block into `out`, returning the sample count.
    /// Trailing bytes short of a full sample are ignored.
    pub fn convert(&mut self, raw: &[u8], out: &mut [u16]) -> usize {
        let n = match self.format {
            SampleFormat::Uc8 => self.convert_uc8(raw, out),
            SampleFormat::Sc16 => self.convert_sc16(raw, out, 32768.0),
            SampleFormat::Sc16Q11 => self.convert_sc16(raw, out, 2048.0),
        };
        if self.agc {
            self.apply_agc(&mut out[..n]);
        }
        n
    }

    fn convert_uc8(&mut self, raw: &[u8], out: &mut [u16]) -> usize {
        let n = (raw.len() / 2).min(out.len());
        for (slot, pair) in out[..n].iter_mut().zip(raw.chunks_exact(2)) {
            *slot = UC8_LUT[usize::from(pair[0]) << 8 | usize::from(pair[1])];
        }
        n
    }

    fn convert_sc16(
        &mut self,
        raw: &[u8],
        out: &mut [u16],
        scale: f32,
    ) -> usize {
        let n = (raw.len() / 4).min(out.len());
        for (slot, bytes) in out[..n].iter_mut().zip(raw.chunks_exact(4)) {
            let i = i16::from_le_bytes([bytes[0], bytes[1]]);
            let q = i16::from_le_bytes([bytes[2], bytes[3]]);
            let mut sample =
                Complex::new(f32::from(i) / scale, f32::from(q) / scale);
            if self.dc_block {
                self.dc += (sample - self.dc) * DC_ALPHA;
                sample -= self.dc;
            }
            let mag = (sample.norm() / std::f32::consts::SQRT_2).min(1.0);
            *slot = (mag * 65535.0) as u16;
        }
        n
    }

    fn apply_agc(&mut self, out: &mut [u16]) {
        if out.is_empty() {
            return;
        }
        let mut power = 0.0f64;
        for &s in out.iter() {
            let m = f64::from(s) / 65536.0;
            power += m * m;
        }
        let rms = (power / out.len() as f64).sqrt() as f32;
        if rms > 0.0 {
            let wanted = AGC_TARGET / rms;
            self.gain += (wanted - self.gain) * AGC_ALPHA;
        }
        if (self.gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for s in out.iter_mut() {
            let scaled = f32::from(*s) * self.gain;
            *s = scaled.min(65535.0) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(format: SampleFormat) -> Converter {
        Converter::new(&ConverterConfig {
            format,
            dc_block: false,
            agc: false,
        })
    }

    #[test]
    fn uc8_midpoint_is_quiet() {
        let mut c = converter(SampleFormat::Uc8);
        let mut out = [0u16; 2];
        let n = c.convert(&[127, 127, 128, 128], &mut out);
        assert_eq!(n, 2);
        assert!(out[0] < 500, "midpoint should be near zero: {}", out[0]);
    }

    #[test]
    fn uc8_extremes_are_loud() {
        let mut c = converter(SampleFormat::Uc8);
        let mut out = [0u16; 2];
        c.convert(&[255, 255, 0, 0], &mut out);
        assert!(out[0] > 60000);
        assert!(out[1] > 60000);
    }

    #[test]
    fn sc16_full_scale() {
        let mut c = converter(SampleFormat::Sc16);
        let mut out = [0u16; 1];
        let i = i16::MAX.to_le_bytes();
        let raw = [i[0], i[1], i[0], i[1]];
        c.convert(&raw, &mut out);
        assert!(out[0] > 65000);
    }

    #[test]
    fn dc_block_converges_on_offset_input() {
        let mut c = Converter::new(&ConverterConfig {
            format: SampleFormat::Sc16,
            dc_block: true,
            agc: false,
        });
        // constant DC offset, no signal
        let one = 4096i16.to_le_bytes();
        let raw: Vec<u8> = std::iter::repeat([one[0], one[1], one[0], one[1]])
            .take(65536)
            .flatten()
            .collect();
        let mut out = vec![0u16; 65536];
        c.convert(&raw, &mut out);
        let tail_mean: f64 = out[60000..]
            .iter()
            .map(|&s| f64::from(s))
            .sum::<f64>()
            / 5536.0;
        let head_mean: f64 =
            out[..1000].iter().map(|&s| f64::from(s)).sum::<f64>() / 1000.0;
        assert!(
            tail_mean < head_mean / 4.0,
            "offset should decay: {head_mean} -> {tail_mean}"
        );
    }

    #[test]
    fn short_trailing_bytes_are_ignored() {
        let mut c = converter(SampleFormat::Uc8);
        let mut out = [0u16; 4];
        let n = c.convert(&[127, 127, 200], &mut out);
        assert_eq!(n, 1);
    }
}
