use std::io;

use num_complex::Complex;
use soapysdr::Direction::Rx;
use tracing::{error, info};

use super::{SampleSource, MODES_FREQ};
use crate::sampling::convert::SampleFormat;
use crate::sampling::SAMPLE_RATE;

/// Live samples through SoapySDR, covering RTL-SDR dongles and most
/// other receivers with a Soapy module installed.
pub struct SoapySource {
    args: String,
    gain: Option<f64>,
    freq: f64,
    device: Option<soapysdr::Device>,
    stream: Option<soapysdr::RxStream<Complex<i16>>>,
}

impl SoapySource {
    /// `args` is a SoapySDR device string, e.g. `driver=rtlsdr`.
    /// `gain` in dB; hardware AGC when `None`.
    pub fn new(args: &str, gain: Option<f64>, freq: Option<f64>) -> Self {
        SoapySource {
            args: args.to_string(),
            gain,
            freq: freq.unwrap_or(MODES_FREQ),
            device: None,
            stream: None,
        }
    }
}

fn soapy_err(e: soapysdr::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

impl SampleSource for SoapySource {
    fn format(&self) -> SampleFormat {
        SampleFormat::Sc16
    }

    fn open(&mut self) -> io::Result<()> {
        let device =
            soapysdr::Device::new(self.args.as_str()).map_err(soapy_err)?;
        device
            .set_frequency(Rx, 0, self.freq, ())
            .map_err(soapy_err)?;
        device
            .set_sample_rate(Rx, 0, SAMPLE_RATE as f64)
            .map_err(soapy_err)?;
        match self.gain {
            Some(gain) => {
                device.set_gain_mode(Rx, 0, false).map_err(soapy_err)?;
                device.set_gain(Rx, 0, gain).map_err(soapy_err)?;
            }
            None => device.set_gain_mode(Rx, 0, true).map_err(soapy_err)?,
        }

        let stream =
            device.rx_stream::<Complex<i16>>(&[0]).map_err(soapy_err)?;
        info!("SoapySDR device open: {}", self.args);
        self.device = Some(device);
        self.stream = Some(stream);
        Ok(())
    }

    fn run(
        &mut self,
        sink: &mut dyn FnMut(&[u8], u64) -> bool,
    ) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "not open"))?;
        stream.activate(None).map_err(soapy_err)?;

        let mtu = stream.mtu().map_err(soapy_err)?.max(1024);
        let mut samples = vec![Complex::new(0i16, 0i16); mtu];
        let mut bytes = vec![0u8; mtu * 4];

        loop {
            let n = match stream.read(&mut [&mut samples[..]], 1_000_000) {
                Ok(n) => n,
                Err(e) => {
                    error!("SoapySDR read failed: {e}");
                    break;
                }
            };
            if n == 0 {
                continue;
            }
            for (chunk, sample) in
                bytes.chunks_exact_mut(4).zip(samples[..n].iter())
            {
                chunk[..2].copy_from_slice(&sample.re.to_le_bytes());
                chunk[2..].copy_from_slice(&sample.im.to_le_bytes());
            }
            if !sink(&bytes[..n * 4], n as u64) {
                break;
            }
        }

        stream.deactivate(None).map_err(soapy_err)?;
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.device = None;
    }
}
