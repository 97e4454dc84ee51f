/**
 * Clock helpers. The sample clock (12 MHz, monotonic, driven by the SDR)
 * orders messages within the pipeline; the wall clock below stamps them
 * for logging and downstream consumers.
 */
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_in_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("SystemTime before unix epoch")
        .as_nanos()
}

pub fn now_in_s() -> f64 {
    now_in_ns() as f64 * 1e-9
}
