/**
 * A two-generation set of recently seen ICAO addresses.
 *
 * Addresses land in the current generation whenever a frame passes the
 * full CRC check. The set rotates on a fixed interval: the current
 * generation becomes the previous one and a fresh generation starts, so
 * an address fades out between one and two intervals after it was last
 * confirmed. Membership is used as a prior when scoring address-overlaid
 * downlink formats, whose residual cannot be CRC-verified on its own.
 */
use std::collections::HashSet;

use tracing::debug;

/// Default rotation interval, in seconds.
pub const ICAO_FILTER_TTL: f64 = 60.0;

#[derive(Debug)]
pub struct IcaoFilter {
    interval: f64,
    rotated_at: f64,
    current: HashSet<u32>,
    previous: HashSet<u32>,
}

impl IcaoFilter {
    pub fn new(interval: f64) -> Self {
        IcaoFilter {
            interval,
            rotated_at: 0.0,
            current: HashSet::new(),
            previous: HashSet::new(),
        }
    }

    pub fn add(&mut self, addr: u32) {
        self.current.insert(addr & 0xFFFFFF);
    }

    pub fn contains(&self, addr: u32) -> bool {
        let addr = addr & 0xFFFFFF;
        self.current.contains(&addr) || self.previous.contains(&addr)
    }

    /// Rotate generations when the interval has elapsed. `now` is a unix
    /// timestamp in seconds; the first call anchors the schedule.
    pub fn advance(&mut self, now: f64) {
        if self.rotated_at == 0.0 {
            self.rotated_at = now;
            return;
        }
        if now - self.rotated_at >= self.interval {
            debug!(
                "rotating ICAO filter: {} current, {} previous",
                self.current.len(),
                self.previous.len()
            );
            self.previous = std::mem::take(&mut self.current);
            self.rotated_at = now;
        }
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.previous.is_empty()
    }
}

impl Default for IcaoFilter {
    fn default() -> Self {
        IcaoFilter::new(ICAO_FILTER_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_survive_one_rotation() {
        let mut filter = IcaoFilter::new(60.0);
        filter.advance(1000.0);
        filter.add(0x4840D6);
        assert!(filter.contains(0x4840D6));

        filter.advance(1061.0);
        assert!(filter.contains(0x4840D6), "still in previous generation");

        filter.advance(1122.0);
        assert!(!filter.contains(0x4840D6), "faded after two intervals");
    }

    #[test]
    fn high_bits_are_masked() {
        let mut filter = IcaoFilter::new(60.0);
        filter.add(0xFF4840D6);
        assert!(filter.contains(0x4840D6));
    }

    #[test]
    fn refreshed_addresses_do_not_fade() {
        let mut filter = IcaoFilter::new(60.0);
        filter.advance(0.0);
        filter.add(0xABCDEF);
        for step in 1..10 {
            filter.advance(step as f64 * 45.0);
            filter.add(0xABCDEF);
        }
        assert!(filter.contains(0xABCDEF));
    }
}
