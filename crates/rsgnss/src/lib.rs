#![doc = include_str!("../readme.md")]
pub mod data;
pub mod decode;
pub mod source;

pub mod prelude {
    /// This re-export is necessary to decode messages
    pub use deku::prelude::*;

    pub use crate::data::ephemeris::{EphemerisPayload, EphemerisRecord};
    pub use crate::data::observation::{
        Band, ObservationRecord, SatSystem, SatelliteId,
    };
    pub use crate::data::{AntennaPosition, AuxMeta};
    pub use crate::decode::ephemeris::{EphemerisHistory, EphemerisStore};
    pub use crate::decode::time::GpsTime;
    /// The root structures to decode streams
    pub use crate::decode::{DecodeError, DecodeOutcome, Decoded, Decoder, Format};

    /// This re-export is necessary for the following export
    pub use futures_util::stream::StreamExt;

    pub use crate::source::ntrip::{Mountpoint, NtripStream, NtripVersion};
    pub use crate::source::TransportError;
}
