use crate::data::ephemeris::EphemerisRecord;
use crate::data::observation::SatelliteId;
use std::collections::{HashMap, VecDeque};

/// Number of ephemeris versions kept per satellite
pub const MAX_VERSIONS: usize = 5;

/// The last versions of the ephemeris of one satellite, newest first
#[derive(Debug, Clone, Default)]
pub struct EphemerisHistory {
    entries: VecDeque<EphemerisRecord>,
}

impl EphemerisHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the record is not stored: either its issue of
    /// data is already known, or the history is full of newer versions.
    pub fn insert(&mut self, record: EphemerisRecord) -> bool {
        if self.entries.iter().any(|e| e.version == record.version) {
            return false;
        }
        let position = self
            .entries
            .iter()
            .position(|e| !e.is_newer_than(&record))
            .unwrap_or(self.entries.len());
        if position == self.entries.len() && self.entries.len() >= MAX_VERSIONS
        {
            return false;
        }
        self.entries.insert(position, record);
        self.entries.truncate(MAX_VERSIONS);
        true
    }

    pub fn latest(&self) -> Option<&EphemerisRecord> {
        self.entries.front()
    }

    pub fn get(&self, version: u16) -> Option<&EphemerisRecord> {
        self.entries.iter().find(|e| e.version == version)
    }

    /// Issues of data, newest first
    pub fn versions(&self) -> Vec<u16> {
        self.entries.iter().map(|e| e.version).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EphemerisRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ephemeris histories of all satellites seen by one decoder
#[derive(Debug, Clone, Default)]
pub struct EphemerisStore {
    histories: HashMap<SatelliteId, EphemerisHistory>,
}

impl EphemerisStore {
    pub fn insert(&mut self, record: EphemerisRecord) -> bool {
        self.histories
            .entry(record.satellite)
            .or_default()
            .insert(record)
    }

    pub fn history(&self, satellite: &SatelliteId) -> Option<&EphemerisHistory> {
        self.histories.get(satellite)
    }

    pub fn latest(&self, satellite: &SatelliteId) -> Option<&EphemerisRecord> {
        self.history(satellite).and_then(|h| h.latest())
    }

    pub fn satellites(&self) -> impl Iterator<Item = &SatelliteId> {
        self.histories.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ephemeris::{EphemerisPayload, GpsOrbit};
    use crate::data::observation::SatSystem;
    use crate::decode::time::GpsTime;
    use rand::Rng;

    fn eph(version: u16, toe: f64) -> EphemerisRecord {
        EphemerisRecord::new(
            SatelliteId::new(SatSystem::Gps, 12),
            version,
            GpsTime::new(2295, toe),
            7200.,
            EphemerisPayload::Gps(GpsOrbit::default()),
        )
    }

    #[test]
    fn test_duplicate_version() {
        let mut history = EphemerisHistory::new();
        assert!(history.insert(eph(1, 0.)));
        assert!(history.insert(eph(3, 14_400.)));
        assert!(history.insert(eph(2, 7_200.)));
        assert!(!history.insert(eph(3, 14_400.)));
        assert_eq!(history.versions(), vec![3, 2, 1]);
        assert_eq!(history.latest().map(|e| e.version), Some(3));
        assert!(history.get(2).is_some());
    }

    #[test]
    fn test_full_history() {
        let mut history = EphemerisHistory::new();
        for i in 1..=5 {
            assert!(history.insert(eph(i, i as f64 * 7200.)));
        }
        // older than anything stored, no room left
        assert!(!history.insert(eph(100, 0.)));
        // newer, the oldest goes away
        assert!(history.insert(eph(6, 6. * 7200.)));
        assert_eq!(history.versions(), vec![6, 5, 4, 3, 2]);
        // in between, the oldest goes away
        assert!(history.insert(eph(7, 2.5 * 7200.)));
        assert_eq!(history.versions(), vec![6, 5, 4, 3, 7]);
    }

    #[test]
    fn test_random_sequences() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let mut history = EphemerisHistory::new();
            for _ in 0..rng.gen_range(1..40) {
                let version = rng.gen_range(0..12u16);
                let toe = rng.gen_range(0..48) as f64 * 3600.;
                history.insert(eph(version, toe));

                assert!(history.len() <= MAX_VERSIONS);
                let mut versions = history.versions();
                versions.sort();
                versions.dedup();
                assert_eq!(versions.len(), history.len());
                let entries: Vec<_> = history.iter().collect();
                for pair in entries.windows(2) {
                    assert!(!pair[1].is_newer_than(pair[0]));
                }
            }
        }
    }

    #[test]
    fn test_store() {
        let mut store = EphemerisStore::default();
        assert!(store.insert(eph(1, 0.)));
        assert!(!store.insert(eph(1, 0.)));
        let sat = SatelliteId::new(SatSystem::Gps, 12);
        assert_eq!(store.history(&sat).map(|h| h.len()), Some(1));
        assert!(store.latest(&SatelliteId::new(SatSystem::Gps, 13)).is_none());
    }
}
