/*!
 * Sample sources: whatever can deliver raw IQ blocks to the reader.
 *
 * A driver implements [`SampleSource`] and calls the sink once per
 * block with the raw bytes and the number of input samples it accounts
 * for (at least the block itself; more when the hardware lost samples,
 * so the sample clock stays honest across drops).
 */
pub mod file;

#[cfg(feature = "soapysdr")]
pub mod soapy;

use std::io;

use tracing::info;

use crate::sampling::convert::SampleFormat;
use crate::sampling::Producer;

/// Receiver frequency, Hz
pub const MODES_FREQ: f64 = 1_090_000_000.0;

pub trait SampleSource {
    fn format(&self) -> SampleFormat;

    fn open(&mut self) -> io::Result<()>;

    /// Run the acquisition loop. The sink returns `false` to stop.
    fn run(
        &mut self,
        sink: &mut dyn FnMut(&[u8], u64) -> bool,
    ) -> io::Result<()>;

    fn close(&mut self);
}

/// The reader thread body: drive a source into the magnitude ring until
/// the source ends or the pipeline shuts down.
pub fn run_reader(
    mut source: Box<dyn SampleSource + Send>,
    mut producer: Producer,
) -> io::Result<()> {
    source.open()?;
    let result =
        source.run(&mut |raw, accounted| producer.push(raw, accounted));
    source.close();
    info!(
        "reader finished, {} samples dropped",
        producer.total_dropped()
    );
    result
}
