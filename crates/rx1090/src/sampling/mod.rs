/*!
 * Sample ingest: a lock-step producer/consumer ring of magnitude
 * buffers.
 *
 * The SDR side converts raw IQ into unsigned 16-bit magnitudes and
 * publishes fixed-size buffers; the demodulator consumes them. Buffers
 * are allocated once and recycled through a pair of bounded channels
 * (`free` and `filled`), so a full ring back-pressures the producer
 * instead of overwriting unread samples. Each buffer carries a trailing
 * copy of its predecessor so bursts crossing a boundary stay decodable.
 */
pub mod convert;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{trace, warn};

use crate::decode::time::now_in_ns;
use convert::Converter;

/// Samples per second delivered by the SDR
pub const SAMPLE_RATE: u64 = 2_400_000;

/// The sample clock counts at 12 MHz, five ticks per sample
pub const TICKS_PER_SAMPLE: u64 = 5;

/// Payload samples per buffer (~55 ms at 2.4 Msps)
pub const BUFFER_SAMPLES: usize = 131_072;

/// Carried-over samples at the head of each buffer: one preamble plus
/// one long frame at 2.4 Msps, with interpolation lookahead
pub const OVERLAP_SAMPLES: usize = 300;

/// Number of buffers in the ring
pub const RING_BUFFERS: usize = 12;

/// How long a blocked side waits before re-checking the exit flag
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// A block of unsigned magnitude samples with its reception context.
#[derive(Debug)]
pub struct MagnitudeBuffer {
    /// Overlap carried from the previous buffer, then `length` fresh
    /// samples
    pub data: Vec<u16>,
    /// Valid overlap samples at the head of `data`
    pub overlap: usize,
    /// Valid samples after the overlap
    pub length: usize,
    /// 12 MHz tick of the first post-overlap sample
    pub sample_timestamp: u64,
    /// Wall-clock estimate of the same instant, unix seconds
    pub sys_timestamp: f64,
    /// Samples lost before this buffer
    pub dropped: u64,
    /// Mean magnitude over the fresh samples, 0..1
    pub mean_level: f64,
    /// Mean squared magnitude over the fresh samples, 0..1
    pub mean_power: f64,
}

impl MagnitudeBuffer {
    fn new() -> Self {
        MagnitudeBuffer {
            data: vec![0u16; OVERLAP_SAMPLES + BUFFER_SAMPLES],
            overlap: 0,
            length: 0,
            sample_timestamp: 0,
            sys_timestamp: 0.0,
            dropped: 0,
            mean_level: 0.0,
            mean_power: 0.0,
        }
    }

    /// All valid samples, overlap included
    pub fn samples(&self) -> &[u16] {
        &self.data[..self.overlap + self.length]
    }

    fn reset(&mut self) {
        self.overlap = 0;
        self.length = 0;
        self.dropped = 0;
        self.mean_level = 0.0;
        self.mean_power = 0.0;
    }
}

/// Create the ring: all buffers are allocated here, the two halves only
/// ever exchange them.
pub fn ring(converter: Converter) -> (Producer, Consumer) {
    let (free_tx, free_rx) = bounded(RING_BUFFERS);
    let (filled_tx, filled_rx) = bounded(RING_BUFFERS);
    for _ in 0..RING_BUFFERS {
        // channel was just created with exactly this capacity
        free_tx
            .try_send(Box::new(MagnitudeBuffer::new()))
            .expect("ring channel sized for all buffers");
    }
    let exit = Arc::new(AtomicBool::new(false));

    let producer = Producer {
        free: free_rx,
        filled: filled_tx,
        exit: exit.clone(),
        converter,
        tail: Vec::with_capacity(OVERLAP_SAMPLES),
        next_sample_timestamp: 0,
        pending_dropped: 0,
        total_dropped: 0,
    };
    let consumer = Consumer {
        filled: filled_rx,
        free: free_tx,
        exit,
    };
    (producer, consumer)
}

/// The reader half: converts raw IQ blocks and publishes buffers.
pub struct Producer {
    free: Receiver<Box<MagnitudeBuffer>>,
    filled: Sender<Box<MagnitudeBuffer>>,
    exit: Arc<AtomicBool>,
    converter: Converter,
    tail: Vec<u16>,
    next_sample_timestamp: u64,
    pending_dropped: u64,
    total_dropped: u64,
}

impl Producer {
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }

    /// Convert one raw block and publish it, blocking while the ring is
    /// full. `accounted` is the number of input samples the driver
    /// declares for this block (at least the block length; more when the
    /// driver lost samples). Returns `false` once the pipeline is
    /// shutting down.
    pub fn push(&mut self, raw: &[u8], accounted: u64) -> bool {
        let mut out = loop {
            if self.exit.load(Ordering::Relaxed) {
                return false;
            }
            match self.free.recv_timeout(WAIT_SLICE) {
                Ok(buffer) => break buffer,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        };
        self.fill(&mut out, raw, accounted);
        self.filled.send(out).is_ok()
    }

    /// Non-blocking variant for drivers that must not stall their
    /// callback: a full ring drops the block and counts its samples.
    pub fn try_push(&mut self, raw: &[u8], accounted: u64) -> bool {
        let mut out = match self.free.try_recv() {
            Ok(buffer) => buffer,
            Err(_) => {
                self.pending_dropped += accounted;
                self.total_dropped += accounted;
                self.next_sample_timestamp +=
                    accounted * TICKS_PER_SAMPLE;
                warn!("magnitude ring full, dropping {accounted} samples");
                return !self.exit.load(Ordering::Relaxed);
            }
        };
        self.fill(&mut out, raw, accounted);
        self.filled.send(out).is_ok()
    }

    fn fill(
        &mut self,
        out: &mut Box<MagnitudeBuffer>,
        raw: &[u8],
        accounted: u64,
    ) {
        // wall clock sampled before any processing
        let sys_timestamp = now_in_ns() as f64 * 1e-9;

        out.reset();
        out.overlap = self.tail.len();
        out.data[..self.tail.len()].copy_from_slice(&self.tail);

        let length =
            self.converter.convert(raw, &mut out.data[out.overlap..]);
        out.length = length;
        out.sample_timestamp = self.next_sample_timestamp;
        out.sys_timestamp = sys_timestamp;
        out.dropped = self.pending_dropped;
        self.pending_dropped = 0;

        // the sample clock advances by what the driver accounted for,
        // dropped samples included
        self.next_sample_timestamp +=
            accounted.max(length as u64) * TICKS_PER_SAMPLE;

        let fresh = &out.data[out.overlap..out.overlap + length];
        let mut level = 0.0f64;
        let mut power = 0.0f64;
        for &s in fresh {
            let m = f64::from(s) / 65536.0;
            level += m;
            power += m * m;
        }
        if length > 0 {
            out.mean_level = level / length as f64;
            out.mean_power = power / length as f64;
        }

        let total = out.overlap + out.length;
        let keep = total.min(OVERLAP_SAMPLES);
        self.tail.clear();
        self.tail.extend_from_slice(&out.data[total - keep..total]);

        trace!(
            "published buffer: {} samples at tick {}",
            out.length,
            out.sample_timestamp
        );
    }
}

/// The demodulator half: receives filled buffers and recycles them.
pub struct Consumer {
    filled: Receiver<Box<MagnitudeBuffer>>,
    free: Sender<Box<MagnitudeBuffer>>,
    exit: Arc<AtomicBool>,
}

impl Consumer {
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    /// Next filled buffer; `None` once the pipeline is draining and no
    /// buffers remain.
    pub fn recv(&self) -> Option<Box<MagnitudeBuffer>> {
        loop {
            match self.filled.recv_timeout(WAIT_SLICE) {
                Ok(buffer) => return Some(buffer),
                Err(RecvTimeoutError::Timeout) => {
                    if self.exit.load(Ordering::Relaxed) {
                        // drain whatever the producer managed to publish
                        return self.filled.try_recv().ok();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Return a buffer to the producer for reuse.
    pub fn release(&self, buffer: Box<MagnitudeBuffer>) {
        // ignore send failure: the producer may already be gone on exit
        let _ = self.free.send(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::convert::{ConverterConfig, SampleFormat};
    use super::*;

    fn test_ring() -> (Producer, Consumer) {
        ring(Converter::new(&ConverterConfig {
            format: SampleFormat::Uc8,
            dc_block: false,
            agc: false,
        }))
    }

    fn uc8_block(n: usize) -> Vec<u8> {
        // alternating quiet IQ around the 127.5 midpoint
        vec![127u8; 2 * n]
    }

    #[test]
    fn timestamps_advance_by_declared_samples() {
        let (mut producer, consumer) = test_ring();
        let block = uc8_block(1000);

        assert!(producer.push(&block, 1000));
        assert!(producer.push(&block, 1500)); // driver lost 500 samples

        let first = consumer.recv().unwrap();
        assert_eq!(first.sample_timestamp, 0);
        assert_eq!(first.length, 1000);
        consumer.release(first);

        let second = consumer.recv().unwrap();
        assert_eq!(second.sample_timestamp, 1000 * TICKS_PER_SAMPLE);
        consumer.release(second);
    }

    #[test]
    fn overlap_carries_previous_tail() {
        let (mut producer, consumer) = test_ring();

        let mut block = uc8_block(1000);
        // a distinctive pulse at the very end of the first block
        let last = block.len() - 2;
        block[last] = 255;
        block[last + 1] = 255;
        assert!(producer.push(&block, 1000));
        assert!(producer.push(&uc8_block(1000), 1000));

        let first = consumer.recv().unwrap();
        assert_eq!(first.overlap, 0);
        let pulse = first.data[first.length - 1];
        assert!(pulse > 40000, "expected a strong magnitude, got {pulse}");
        consumer.release(first);

        let second = consumer.recv().unwrap();
        assert_eq!(second.overlap, OVERLAP_SAMPLES);
        assert_eq!(second.data[second.overlap - 1], pulse);
        consumer.release(second);
    }

    #[test]
    fn full_ring_drops_and_counts() {
        let (mut producer, consumer) = test_ring();
        let block = uc8_block(100);

        for _ in 0..RING_BUFFERS {
            assert!(producer.try_push(&block, 100));
        }
        // ring exhausted: the block is dropped, not overwritten
        assert!(producer.try_push(&block, 100));
        assert_eq!(producer.total_dropped(), 100);

        let head = consumer.recv().unwrap();
        assert_eq!(head.dropped, 0);
        consumer.release(head);

        // the next publish inherits the drop count
        assert!(producer.try_push(&block, 100));
        let mut seen_drop = 0;
        while let Ok(buffer) = consumer.filled.try_recv() {
            seen_drop += buffer.dropped;
            consumer.release(buffer);
        }
        assert_eq!(seen_drop, 100);
    }

    #[test]
    fn dropped_samples_still_advance_the_clock() {
        let (mut producer, consumer) = test_ring();
        let block = uc8_block(100);

        for _ in 0..RING_BUFFERS {
            assert!(producer.try_push(&block, 100));
        }
        assert!(producer.try_push(&block, 100)); // dropped

        let mut last_end = 0;
        while let Ok(buffer) = consumer.filled.try_recv() {
            assert_eq!(buffer.sample_timestamp, last_end);
            last_end = buffer.sample_timestamp
                + buffer.length as u64 * TICKS_PER_SAMPLE;
            consumer.release(buffer);
        }

        // after the drop, the published clock skips the lost block
        assert!(producer.try_push(&block, 100));
        let buffer = consumer.recv().unwrap();
        assert_eq!(
            buffer.sample_timestamp,
            last_end + 100 * TICKS_PER_SAMPLE
        );
        consumer.release(buffer);
    }
}
