use super::observation::SatelliteId;
use crate::decode::time::GpsTime;
use serde::Serialize;
use std::fmt;

/// GPS broadcast orbit and clock parameters (LNAV), as transmitted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsOrbit {
    pub week: u16,
    pub iodc: u16,
    pub iode: u8,
    pub toc: f64,
    pub toe: f64,
    pub af0: f64,
    pub af1: f64,
    pub af2: f64,
    pub crs: f64,
    pub delta_n: f64,
    pub m0: f64,
    pub cuc: f64,
    pub e: f64,
    pub cus: f64,
    pub sqrt_a: f64,
    pub cic: f64,
    pub omega0: f64,
    pub cis: f64,
    pub i0: f64,
    pub crc: f64,
    pub omega: f64,
    pub omega_dot: f64,
    pub idot: f64,
    pub tgd: f64,
    pub ura: u8,
    pub health: u8,
}

/// GLONASS broadcast state vector (km, km/s, km/s²) and clock parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlonassOrbit {
    pub frequency_channel: i8,
    /// Index of the 15 minute interval in the day (Moscow time)
    pub tb: u8,
    /// Frame time, seconds in the day (Moscow time)
    pub tk: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub acceleration: [f64; 3],
    pub gamma: f64,
    pub tau: f64,
    pub health: u8,
}

/// Orbit and clock parameters, carried as they come
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EphemerisPayload {
    Gps(GpsOrbit),
    Glonass(GlonassOrbit),
}

/// One version of the broadcast ephemeris of one satellite
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EphemerisRecord {
    pub satellite: SatelliteId,
    /// Issue of data (IODE for GPS, tb for GLONASS)
    pub version: u16,
    /// Reference time of the ephemeris
    pub time: GpsTime,
    pub valid_from: GpsTime,
    pub valid_until: GpsTime,
    pub payload: EphemerisPayload,
}

impl EphemerisRecord {
    /// Build a record valid `half_fit` seconds around its reference time
    pub fn new(
        satellite: SatelliteId,
        version: u16,
        time: GpsTime,
        half_fit: f64,
        payload: EphemerisPayload,
    ) -> Self {
        let t = time.gps_seconds();
        Self {
            satellite,
            version,
            time,
            valid_from: GpsTime::from_gps_seconds(t - half_fit),
            valid_until: GpsTime::from_gps_seconds(t + half_fit),
            payload,
        }
    }

    pub fn is_newer_than(&self, other: &EphemerisRecord) -> bool {
        (self.time.week, self.time.seconds)
            > (other.time.week, other.time.seconds)
    }

    pub fn is_valid_at(&self, t: GpsTime) -> bool {
        let t = t.gps_seconds();
        self.valid_from.gps_seconds() <= t && t <= self.valid_until.gps_seconds()
    }
}

impl fmt::Display for EphemerisRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} IOD {:3} ref {}",
            self.satellite, self.version, self.time
        )
    }
}
