#![doc = include_str!("../readme.md")]

mod output;
mod snapshot;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use rx1090::decode::cpr::Position;
use rx1090::decode::time::now_in_s;
use rx1090::decode::TimedMessage;
use rx1090::demod::{DemodConfig, DemodStats, Demodulator};
use rx1090::sampling::convert::{Converter, ConverterConfig, SampleFormat};
use rx1090::source::file::FileSource;
use rx1090::source::SampleSource;
use rx1090::track::{Tracker, TrackerConfig};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DeviceType {
    /// Raw IQ samples from a file (or - for stdin)
    Ifile,
    /// A live receiver through SoapySDR
    Soapysdr,
}

#[derive(Debug, Parser)]
#[command(
    name = "radar1090",
    version,
    about = "Demodulate, decode and track Mode S / ADS-B traffic from an SDR"
)]
struct Options {
    /// Where the samples come from
    #[arg(long, value_enum, default_value = "ifile")]
    device_type: DeviceType,

    /// Path of the raw IQ file for --device-type ifile
    #[arg(long)]
    ifile: Option<String>,

    /// Input sample format
    #[arg(long, default_value = "uc8")]
    format: String,

    /// Pace file input at the live sample rate
    #[arg(long, default_value = "false")]
    throttle: bool,

    /// SoapySDR device string, e.g. driver=rtlsdr
    #[arg(long, default_value = "driver=rtlsdr")]
    device: String,

    /// Tuner gain in dB (hardware AGC when absent)
    #[arg(long)]
    gain: Option<f64>,

    /// Tuner frequency in Hz
    #[arg(long)]
    freq: Option<f64>,

    /// Disable CRC repair (single-bit repair is the default)
    #[arg(long)]
    no_fix: bool,

    /// Allow two-bit CRC repair on low-confidence bits
    #[arg(long)]
    aggressive: bool,

    /// Accept frames that fail the CRC/address gate
    #[arg(long, default_value = "false")]
    no_crc_check: bool,

    /// Also decode Mode A/C replies
    #[arg(long, default_value = "false")]
    modeac: bool,

    /// Apply a DC block before magnitude conversion
    #[arg(long, default_value = "false")]
    dc_filter: bool,

    /// Normalise input levels with a soft AGC
    #[arg(long, default_value = "false")]
    agc: bool,

    /// Receiver latitude, decimal degrees
    #[arg(long)]
    lat: Option<f64>,

    /// Receiver longitude, decimal degrees
    #[arg(long)]
    lon: Option<f64>,

    /// Reject positions further than this from the receiver, km
    #[arg(long)]
    max_range: Option<f64>,

    /// Rotation interval of the recent-address filter, seconds
    #[arg(long, default_value = "60")]
    filter_ttl: u64,

    /// Remove aircraft unseen for this long, seconds
    #[arg(long, default_value = "60")]
    expire: u64,

    /// Directory for aircraft.json / history / receiver.json
    #[arg(long)]
    json_dir: Option<PathBuf>,

    /// Refresh interval of aircraft.json, milliseconds
    #[arg(long, default_value = "1000")]
    json_time: u64,

    /// Only report the aircraft with this hex address
    #[arg(long)]
    show_only: Option<String>,

    /// Print one JSON line per accepted message
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Append one JSON line per accepted message to this file
    #[arg(short, long)]
    output: Option<String>,
}

impl Options {
    fn nfix_crc(&self) -> u8 {
        if self.aggressive {
            2
        } else if self.no_fix {
            0
        } else {
            1
        }
    }

    fn receiver(&self) -> Option<Position> {
        match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Some(Position {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

fn build_source(
    options: &Options,
    format: SampleFormat,
) -> Result<Box<dyn SampleSource + Send>, String> {
    match options.device_type {
        DeviceType::Ifile => {
            let path = options
                .ifile
                .as_deref()
                .ok_or("--device-type ifile requires --ifile")?;
            Ok(Box::new(FileSource::new(path, format, options.throttle)))
        }
        #[cfg(feature = "soapysdr")]
        DeviceType::Soapysdr => Ok(Box::new(
            rx1090::source::soapy::SoapySource::new(
                &options.device,
                options.gain,
                options.freq,
            ),
        )),
        #[cfg(not(feature = "soapysdr"))]
        DeviceType::Soapysdr => {
            Err("this build does not include SoapySDR support".to_string())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = Options::parse();

    let format = SampleFormat::from_str(&options.format)?;
    let source = match build_source(&options, format) {
        Ok(source) => source,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let show_only = match &options.show_only {
        Some(hex_addr) => match u32::from_str_radix(hex_addr, 16) {
            Ok(addr) => Some(addr),
            Err(_) => {
                error!("--show-only expects a hex address");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let converter = Converter::new(&ConverterConfig {
        format,
        dc_block: options.dc_filter,
        agc: options.agc,
    });
    let (producer, consumer) = rx1090::sampling::ring(converter);
    let exit = producer.exit_flag();

    let reader = std::thread::spawn(move || {
        rx1090::source::run_reader(source, producer)
    });

    let demod_config = DemodConfig {
        nfix_crc: options.nfix_crc(),
        check_crc: !options.no_crc_check,
        mode_ac: options.modeac,
        icao_filter_ttl: options.filter_ttl as f64,
    };
    let (tx, mut rx) = mpsc::channel::<TimedMessage>(512);
    let demod = std::thread::spawn(move || -> DemodStats {
        let mut demod = Demodulator::new(demod_config);
        while let Some(buffer) = consumer.recv() {
            for frame in demod.process_buffer(&buffer) {
                if tx.blocking_send(frame.into_timed()).is_err() {
                    return demod.stats().clone();
                }
            }
            consumer.release(buffer);
        }
        demod.stats().clone()
    });

    let tracker = Arc::new(Mutex::new(Tracker::new(TrackerConfig {
        receiver: options.receiver(),
        max_range_km: options.max_range,
        display_ttl: options.expire as f64,
    })));

    if let Some(dir) = options.json_dir.clone() {
        tokio::spawn(snapshot::run(
            dir,
            tracker.clone(),
            options.json_time,
            options.receiver(),
        ));
    }

    let tracker_expire = tracker.clone();
    tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(5)).await;
            tracker_expire.lock().await.expire(now_in_s());
        }
    });

    let exit_on_signal = exit.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, draining");
            exit_on_signal.store(true, Ordering::Relaxed);
        }
    });

    let mut outputs = output::OutputHub::new();
    if options.verbose {
        outputs.add_stdout();
    }
    if let Some(path) = options.output.clone() {
        outputs.add_jsonl(path);
    }

    while let Some(tm) = rx.recv().await {
        if let Some(addr) = show_only {
            let matches = tm
                .message
                .as_ref()
                .and_then(|m| m.address())
                .map(|(icao, _)| icao.0 == addr)
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }

        tracker.lock().await.apply(&tm);

        if !outputs.is_empty() {
            if let Ok(line) = serde_json::to_string(&tm) {
                outputs.publish(&line);
            }
        }
    }

    // the demodulator drained the ring: collect the threads
    exit.store(true, Ordering::Relaxed);
    let stats = demod
        .join()
        .map_err(|_| "demodulator thread panicked")?;
    info!(
        "demodulator: {} buffers, {} preambles, {} accepted \
         ({} one-bit, {} two-bit repairs), {} bad CRC, {} unknown address",
        stats.buffers,
        stats.preambles,
        stats.accepted,
        stats.repaired_one_bit,
        stats.repaired_two_bits,
        stats.bad_crc,
        stats.unknown_icao,
    );
    {
        let tracker = tracker.lock().await;
        info!(
            "tracker: {} aircraft live, {} messages, \
             {} global / {} local positions, {} CPR rejects",
            tracker.len(),
            tracker.stats.messages,
            tracker.stats.cpr_global_ok,
            tracker.stats.cpr_local_ok,
            tracker.stats.cpr_rejected,
        );
    }
    outputs.shutdown();

    match reader.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("reader failed: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            error!("reader thread panicked");
            std::process::exit(1);
        }
    }
}
