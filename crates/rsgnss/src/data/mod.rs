pub mod ephemeris;
pub mod observation;

use serde::Serialize;
use std::fmt;

/// Which reference point of the antenna a position refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AntennaPoint {
    /// Antenna Reference Point
    Arp,
    /// Antenna Phase Centre
    Apc,
}

/// Antenna position in ECEF coordinates (metres)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AntennaPosition {
    pub point: AntennaPoint,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Antenna height above the marker, if transmitted
    pub height: Option<f64>,
}

impl fmt::Display for AntennaPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let point = match self.point {
            AntennaPoint::Arp => "ARP",
            AntennaPoint::Apc => "APC",
        };
        write!(
            f,
            "{point} (ITRF) X {:.4} m, Y {:.4} m, Z {:.4} m",
            self.x, self.y, self.z
        )?;
        if let Some(h) = self.height {
            write!(f, ", height {h:.4} m")?;
        }
        Ok(())
    }
}

/// Side information found while decoding.
///
/// It only covers the bytes passed to one decode call and is handed back
/// with the outcome; nothing is retained across calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuxMeta {
    pub message_types: Vec<u16>,
    pub antenna_descriptors: Vec<String>,
    pub antenna_positions: Vec<AntennaPosition>,
}

impl AuxMeta {
    pub fn is_empty(&self) -> bool {
        self.message_types.is_empty()
            && self.antenna_descriptors.is_empty()
            && self.antenna_positions.is_empty()
    }
}
