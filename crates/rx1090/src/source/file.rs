use std::fs::File;
use std::io::{self, BufReader, Read};
use std::time::{Duration, Instant};

use tracing::info;

use super::SampleSource;
use crate::sampling::convert::SampleFormat;
use crate::sampling::{BUFFER_SAMPLES, SAMPLE_RATE};

/// Raw IQ from a file (or standard input with `-`), mostly for replay
/// and testing. With `throttle` set, blocks are paced at the live
/// sample rate.
pub struct FileSource {
    path: String,
    format: SampleFormat,
    throttle: bool,
    reader: Option<BufReader<Box<dyn Read + Send>>>,
}

impl FileSource {
    pub fn new(path: &str, format: SampleFormat, throttle: bool) -> Self {
        FileSource {
            path: path.to_string(),
            format,
            throttle,
            reader: None,
        }
    }
}

impl SampleSource for FileSource {
    fn format(&self) -> SampleFormat {
        self.format
    }

    fn open(&mut self) -> io::Result<()> {
        let inner: Box<dyn Read + Send> = if self.path == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(File::open(&self.path)?)
        };
        self.reader = Some(BufReader::with_capacity(1 << 20, inner));
        info!("reading {} samples from {}", self.format_name(), self.path);
        Ok(())
    }

    fn run(
        &mut self,
        sink: &mut dyn FnMut(&[u8], u64) -> bool,
    ) -> io::Result<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "not open"))?;

        let block_bytes = BUFFER_SAMPLES * self.format.sample_bytes();
        let mut block = vec![0u8; block_bytes];
        let started = Instant::now();
        let mut consumed_samples = 0u64;

        loop {
            let mut filled = 0;
            while filled < block_bytes {
                let n = reader.read(&mut block[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                return Ok(());
            }

            let samples = (filled / self.format.sample_bytes()) as u64;
            consumed_samples += samples;

            if self.throttle {
                let due = Duration::from_secs_f64(
                    consumed_samples as f64 / SAMPLE_RATE as f64,
                );
                let elapsed = started.elapsed();
                if due > elapsed {
                    std::thread::sleep(due - elapsed);
                }
            }

            if !sink(&block[..filled], samples) {
                return Ok(());
            }
            if filled < block_bytes {
                return Ok(());
            }
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

impl FileSource {
    fn format_name(&self) -> &'static str {
        match self.format {
            SampleFormat::Uc8 => "UC8",
            SampleFormat::Sc16 => "SC16",
            SampleFormat::Sc16Q11 => "SC16Q11",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_a_short_file_in_one_block() {
        let mut path = std::env::temp_dir();
        path.push(format!("rx1090-filesource-{}.bin", std::process::id()));
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&vec![127u8; 2048]).unwrap();
        }

        let mut source = FileSource::new(
            path.to_str().unwrap(),
            SampleFormat::Uc8,
            false,
        );
        source.open().unwrap();

        let mut blocks = Vec::new();
        source
            .run(&mut |raw, samples| {
                blocks.push((raw.len(), samples));
                true
            })
            .unwrap();
        source.close();
        std::fs::remove_file(&path).ok();

        assert_eq!(blocks, vec![(2048, 1024)]);
    }
}
