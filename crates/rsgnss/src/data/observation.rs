use crate::decode::time::GpsTime;
use serde::Serialize;
use std::fmt;
use std::fmt::Write;

/// Maximum length of a station identifier, in bytes
pub const MAX_STATION_LEN: usize = 20;

/// Satellite systems carried on the streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize)]
pub enum SatSystem {
    #[default]
    #[serde(rename = "G")]
    Gps,
    #[serde(rename = "R")]
    Glonass,
    #[serde(rename = "S")]
    Sbas,
}

impl SatSystem {
    pub fn tag(&self) -> char {
        match self {
            Self::Gps => 'G',
            Self::Glonass => 'R',
            Self::Sbas => 'S',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'G' => Some(Self::Gps),
            'R' => Some(Self::Glonass),
            'S' => Some(Self::Sbas),
            _ => None,
        }
    }
}

impl fmt::Display for SatSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize)]
pub struct SatelliteId {
    pub system: SatSystem,
    pub number: u8,
}

impl SatelliteId {
    pub fn new(system: SatSystem, number: u8) -> Self {
        Self { system, number }
    }
}

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.system, self.number)
    }
}

/// Observables on one frequency band.
///
/// A value of 0.0 means "not observed". Slip counters are negative when
/// the decoder has no way to tell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    /// Pseudorange on the civilian code (m)
    pub code_ca: f64,
    /// Pseudorange on the precise code (m)
    pub code_p: f64,
    /// Carrier phase (cycles)
    pub phase: f64,
    /// Doppler (Hz)
    pub doppler: f64,
    /// Signal strength (dBHz)
    pub snr: f64,
    pub slip: i32,
}

impl Default for Band {
    fn default() -> Self {
        Self {
            code_ca: 0.,
            code_p: 0.,
            phase: 0.,
            doppler: 0.,
            snr: 0.,
            slip: -1,
        }
    }
}

impl Band {
    pub fn is_empty(&self) -> bool {
        self.code_ca == 0. && self.code_p == 0. && self.phase == 0.
    }
}

/// One satellite observed by one station at one epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationRecord {
    pub station: String,
    pub system: SatSystem,
    pub satellite: u8,
    /// GLONASS frequency channel number, 0 for other systems
    pub slot: i8,
    pub time: GpsTime,
    pub l1: Band,
    pub l2: Band,
}

fn obs_to_str(val: f64, width: usize, precision: usize) -> String {
    if val != 0. {
        format!("{val:width$.precision$}")
    } else {
        "0.0".to_string()
    }
}

fn write_block(out: &mut String, label: &str, code: f64, band: &Band) {
    let _ = write!(
        out,
        "  {label} {} {} {} {} {:2}",
        obs_to_str(code, 14, 3),
        obs_to_str(band.phase, 14, 3),
        obs_to_str(band.doppler, 14, 3),
        obs_to_str(band.snr, 8, 3),
        band.slip
    );
}

impl ObservationRecord {
    pub fn new(system: SatSystem, satellite: u8, time: GpsTime) -> Self {
        Self {
            system,
            satellite,
            time,
            ..Default::default()
        }
    }

    /// Set the station identifier, truncated to [`MAX_STATION_LEN`] bytes
    pub fn set_station(&mut self, station: &str) {
        let mut end = station.len().min(MAX_STATION_LEN);
        while !station.is_char_boundary(end) {
            end -= 1;
        }
        self.station = station[..end].to_string();
    }

    pub fn satellite_id(&self) -> SatelliteId {
        SatelliteId::new(self.system, self.satellite)
    }

    /// e.g. G05
    pub fn prn(&self) -> String {
        self.satellite_id().to_string()
    }

    /// The per-satellite part of a line in the text dissemination format
    pub fn ascii_line(&self) -> String {
        let mut line = self.prn();
        if self.system == SatSystem::Glonass {
            let _ = write!(line, " {:2}", self.slot);
        } else {
            line.push_str("   ");
        }
        write_block(&mut line, "1C", self.l1.code_ca, &self.l1);
        if self.l1.code_p != 0. {
            write_block(&mut line, "1P", self.l1.code_p, &self.l1);
        }
        if self.l2.code_p != 0. {
            write_block(&mut line, "2P", self.l2.code_p, &self.l2);
        } else if self.l2.code_ca != 0. {
            write_block(&mut line, "2C", self.l2.code_ca, &self.l2);
        }
        line
    }

    /// Fixed binary layout (little endian) for the binary output channel:
    ///
    /// | bytes | field                                             |
    /// | ----- | ------------------------------------------------- |
    /// | 20    | station, zero padded                              |
    /// | 1     | system tag (ASCII)                                |
    /// | 1     | satellite                                         |
    /// | 1     | slot                                              |
    /// | 4     | GPS week                                          |
    /// | 8     | seconds of week                                   |
    /// | 44    | L1: code_ca, code_p, phase, doppler, snr, slip    |
    /// | 44    | L2: same layout                                   |
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::BINARY_LEN);
        let mut station = [0u8; MAX_STATION_LEN];
        let len = self.station.len().min(MAX_STATION_LEN);
        station[..len].copy_from_slice(&self.station.as_bytes()[..len]);
        bytes.extend_from_slice(&station);
        bytes.push(self.system.tag() as u8);
        bytes.push(self.satellite);
        bytes.push(self.slot as u8);
        bytes.extend_from_slice(&self.time.week.to_le_bytes());
        bytes.extend_from_slice(&self.time.seconds.to_le_bytes());
        for band in [&self.l1, &self.l2] {
            for value in [
                band.code_ca,
                band.code_p,
                band.phase,
                band.doppler,
                band.snr,
            ] {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            bytes.extend_from_slice(&band.slip.to_le_bytes());
        }
        bytes
    }

    pub const BINARY_LEN: usize = MAX_STATION_LEN + 3 + 4 + 8 + 2 * 44;
}

impl fmt::Display for ObservationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.station, self.time, self.ascii_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ObservationRecord {
        let mut obs =
            ObservationRecord::new(SatSystem::Gps, 5, GpsTime::new(2295, 18.));
        obs.set_station("WTZR0");
        obs.l1.code_ca = 20_000_000.123;
        obs.l1.phase = 105_000_000.5;
        obs.l1.snr = 45.25;
        obs.l1.slip = 0;
        obs.l2.code_p = 20_000_003.5;
        obs.l2.slip = 2;
        obs
    }

    #[test]
    fn test_station_truncation() {
        let mut obs = ObservationRecord::default();
        obs.set_station("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(obs.station, "ABCDEFGHIJKLMNOPQRST");
        // never split a multi-byte character
        obs.set_station("ééééééééééé");
        assert_eq!(obs.station.len(), 20);
        obs.set_station("ééééééééééé_");
        assert_eq!(obs.station, "éééééééééé");
    }

    #[test]
    fn test_ascii_line() {
        let line = record().ascii_line();
        assert!(line.starts_with("G05     1C   20000000.123"));
        assert!(line.contains("  2P   20000003.500"));
        assert!(!line.contains("1P"));
        assert!(line.ends_with(" 2"));

        let mut glo = record();
        glo.system = SatSystem::Glonass;
        glo.slot = -4;
        assert!(glo.ascii_line().starts_with("R05 -4  1C"));
    }

    #[test]
    fn test_binary_layout() {
        let bytes = record().to_bytes();
        assert_eq!(bytes.len(), ObservationRecord::BINARY_LEN);
        assert_eq!(&bytes[..5], b"WTZR0");
        assert_eq!(bytes[5..20], [0u8; 15]);
        assert_eq!(bytes[20], b'G');
        assert_eq!(bytes[21], 5);
        assert_eq!(u32::from_le_bytes(bytes[23..27].try_into().unwrap()), 2295);
        let slip_l2 = i32::from_le_bytes(bytes[119..123].try_into().unwrap());
        assert_eq!(slip_l2, 2);
    }

    #[test]
    fn test_json() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["station"], "WTZR0");
        assert_eq!(json["system"], "G");
        assert_eq!(json["time"]["week"], 2295);
        assert_eq!(json["l2"]["slip"], 2);
    }
}
