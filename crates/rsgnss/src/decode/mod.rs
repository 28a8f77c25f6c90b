pub mod crc;
pub mod ephemeris;
pub mod passthrough;
pub mod rtcm3;
pub mod rtigs;
pub mod time;

use crate::data::ephemeris::EphemerisRecord;
use crate::data::observation::ObservationRecord;
use crate::data::AuxMeta;
use deku::DekuError;
use ephemeris::EphemerisStore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::GpsTime;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("checksum mismatch (computed {computed:06x}, expected {expected:06x})")]
    Crc { computed: u32, expected: u32 },

    #[error("message {message} truncated: {got} bytes, {expected} expected")]
    Truncated {
        message: u16,
        expected: usize,
        got: usize,
    },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("bit-level decoding: {0}")]
    Deku(String),

    #[error("unknown data format: {0}")]
    ProtocolMismatch(String),
}

impl From<DekuError> for DecodeError {
    fn from(e: DekuError) -> Self {
        DecodeError::Deku(e.to_string())
    }
}

/// Records produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// All satellites of one epoch from one station
    Observations(Vec<ObservationRecord>),
    /// A new ephemeris version, already stored in the decoder's history
    Ephemeris(EphemerisRecord),
}

/// What came out of one decode call
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    pub items: Vec<Decoded>,
    pub aux: AuxMeta,
    /// Messages skipped because they could not be decoded
    pub errors: Vec<DecodeError>,
    /// Number of complete messages decoded
    pub messages: usize,
}

impl DecodeOutcome {
    pub fn observations(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Decoded::Observations(obs) => Some(obs.iter()),
                Decoded::Ephemeris(_) => None,
            })
            .flatten()
    }

    pub fn ephemerides(&self) -> impl Iterator<Item = &EphemerisRecord> {
        self.items.iter().filter_map(|item| match item {
            Decoded::Ephemeris(eph) => Some(eph),
            Decoded::Observations(_) => None,
        })
    }

    /// Take the observations out, in decoding order
    pub fn take_observations(&mut self) -> Vec<ObservationRecord> {
        let mut result = Vec::new();
        for item in self.items.iter_mut() {
            if let Decoded::Observations(obs) = item {
                result.append(obs);
            }
        }
        result
    }

    /// At least one message was decoded
    pub fn is_success(&self) -> bool {
        self.messages > 0
    }

    /// Nothing complete yet, and nothing wrong either
    pub fn is_need_more_data(&self) -> bool {
        self.messages == 0 && self.errors.is_empty()
    }
}

/// A decoder for one wire format.
///
/// Decoders keep partial messages between calls: a message may be split
/// across any number of reads. A corrupted message is reported in
/// [`DecodeOutcome::errors`] and decoding resumes on the following bytes.
pub trait Decoder: Send + Sync {
    /// Decode the bytes; `now` resolves timestamps sent without a week number.
    fn decode(&mut self, bytes: &[u8], now: GpsTime) -> DecodeOutcome;

    /// Drop buffered partial messages and restart the slip counters (after
    /// a reconnection). Ephemeris histories are kept.
    fn reset(&mut self);

    fn ephemerides(&self) -> &EphemerisStore;

    fn format(&self) -> Format;
}

/// The wire formats, selected from the format tag of a mountpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Rtcm3,
    Rtigs,
    Passthrough,
}

impl Format {
    pub fn from_tag(tag: &str) -> Result<Self, DecodeError> {
        let upper = tag.to_uppercase();
        if upper.contains("RTCM_3")
            || upper.contains("RTCM3")
            || upper.contains("RTCM 3")
        {
            Ok(Format::Rtcm3)
        } else if upper.contains("RTIGS") {
            Ok(Format::Rtigs)
        } else if upper.contains("ZERO") {
            Ok(Format::Passthrough)
        } else {
            Err(DecodeError::ProtocolMismatch(tag.to_string()))
        }
    }

    /// A fresh decoder for this format
    pub fn decoder(&self, station: &str) -> Box<dyn Decoder> {
        match self {
            Format::Rtcm3 => Box::new(rtcm3::Rtcm3Decoder::new(station)),
            Format::Rtigs => Box::new(rtigs::RtigsDecoder::new(station)),
            Format::Passthrough => {
                Box::new(passthrough::PassthroughDecoder::new())
            }
        }
    }
}

impl FromStr for Format {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::from_tag(s)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Rtcm3 => "RTCM_3",
            Format::Rtigs => "RTIGS",
            Format::Passthrough => "ZERO",
        };
        write!(f, "{name}")
    }
}

/// Interpret the `bits` lower bits of `value` as a two's complement integer
pub(crate) fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Interpret the `bits` lower bits of `value` as sign and magnitude
/// (GLONASS fields)
pub(crate) fn sign_magnitude(value: u64, bits: u32) -> i64 {
    let magnitude = (value & ((1 << (bits - 1)) - 1)) as i64;
    if value >> (bits - 1) & 1 == 1 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tags() {
        assert_eq!(Format::from_tag("RTCM 3.1"), Ok(Format::Rtcm3));
        assert_eq!(Format::from_tag("RTCM_3.2"), Ok(Format::Rtcm3));
        assert_eq!(Format::from_tag("rtcm3"), Ok(Format::Rtcm3));
        assert_eq!(Format::from_tag("RTIGS"), Ok(Format::Rtigs));
        assert_eq!(Format::from_tag("ZERO"), Ok(Format::Passthrough));
        assert!(matches!(
            Format::from_tag("RTCM 2.3"),
            Err(DecodeError::ProtocolMismatch(_))
        ));
        assert_eq!(
            "RTIGS".parse::<Format>().map(|f| f.to_string()),
            Ok("RTIGS".to_string())
        );
    }

    #[test]
    fn test_signed_fields() {
        assert_eq!(sign_extend(0xfffff, 20), -1);
        assert_eq!(sign_extend(0x7ffff, 20), 0x7ffff);
        assert_eq!(sign_extend(0x80000, 20), -0x80000);
        assert_eq!(sign_magnitude(0b1_0011, 5), -3);
        assert_eq!(sign_magnitude(0b0_0011, 5), 3);
    }

    #[test]
    fn test_outcome() {
        let outcome = DecodeOutcome::default();
        assert!(outcome.is_need_more_data());
        assert!(!outcome.is_success());

        let mut outcome = DecodeOutcome {
            items: vec![
                Decoded::Observations(vec![ObservationRecord::default(); 2]),
                Decoded::Observations(vec![ObservationRecord::default()]),
            ],
            messages: 2,
            ..Default::default()
        };
        assert!(outcome.is_success());
        assert_eq!(outcome.observations().count(), 3);
        assert_eq!(outcome.take_observations().len(), 3);
        assert_eq!(outcome.observations().count(), 0);
    }
}
