#![doc = include_str!("../readme.md")]
pub mod decode;
pub mod demod;
pub mod icao_filter;
pub mod sampling;
pub mod source;
pub mod track;

pub mod prelude {
    /// This re-export is necessary to decode messages
    pub use deku::prelude::*;

    pub use crate::decode::adsb::{ControlFieldKind, ADSB, ME, MEKind};
    pub use crate::decode::bds::bds05::AirbornePosition;
    pub use crate::decode::bds::bds06::SurfacePosition;
    pub use crate::decode::bds::bds08::AircraftIdentification;
    pub use crate::decode::bds::bds09::AirborneVelocity;
    pub use crate::decode::bds::bds61::AircraftStatus;
    pub use crate::decode::bds::bds62::TargetStateAndStatus;
    pub use crate::decode::bds::bds65::OperationStatus;
    pub use crate::decode::cpr::Position;
    /// The root structure to decode messages
    pub use crate::decode::Message;
    pub use crate::decode::DF::*;
    pub use crate::decode::{
        AddressType, DataSource, SensorMetadata, TimedMessage, ICAO,
    };
    pub use crate::demod::{DemodConfig, DemodFrame, Demodulator};
    pub use crate::icao_filter::IcaoFilter;
    pub use crate::sampling::convert::{ConverterConfig, SampleFormat};
    pub use crate::track::{Aircraft, Tracker, TrackerConfig};
}
