pub mod navigation;
pub mod observables;
pub mod station;

use super::crc::crc24q;
use super::ephemeris::EphemerisStore;
use super::time::GpsTime;
use super::{sign_extend, DecodeError, DecodeOutcome, Decoded, Decoder, Format};
use crate::data::ephemeris::EphemerisRecord;
use crate::data::observation::{
    Band, ObservationRecord, SatSystem, SatelliteId,
};
use deku::prelude::*;
use navigation::{GlonassEphemeris, GpsEphemeris};
use observables::{
    GlonassObservables, GlonassSatellite, GpsObservables, GpsSatellite,
};
use station::{AntennaDescriptor, ReferenceStation};
use std::collections::HashMap;
use tracing::debug;

pub const PREAMBLE: u8 = 0xd3;

const C_LIGHT: f64 = 299_792_458.;
const LIGHT_MS: f64 = C_LIGHT * 1e-3;
const GLONASS_AMBIGUITY: f64 = 599_584.916;

const FREQ_L1: f64 = 1.57542e9;
const FREQ_L2: f64 = 1.22760e9;
const FREQ1_GLO: f64 = 1.60200e9;
const DFRQ1_GLO: f64 = 0.56250e6;
const FREQ2_GLO: f64 = 1.24600e9;
const DFRQ2_GLO: f64 = 0.43750e6;

/// Phase fields set to this value carry no measurement
const INVALID_PHASE: u32 = 0x80000;
/// Pseudorange differences set to this value carry no measurement
const INVALID_RANGE_DIFF: u16 = 0x2000;

/// 0 is the civilian code, anything else a precise code
fn set_code(band: &mut Band, indicator: u8, range: f64) {
    if indicator == 0 {
        band.code_ca = range;
    } else {
        band.code_p = range;
    }
}

/// Raw fields common to the GPS and GLONASS observables
struct RawBands {
    l1_code: u8,
    l1_phase_diff: u32,
    l1_lock: u8,
    l1_cnr: Option<u8>,
    /// code indicator, pseudorange difference, phase difference, lock time
    l2: Option<(u8, u16, u32, u8)>,
    l2_cnr: Option<u8>,
}

impl From<&GpsSatellite> for RawBands {
    fn from(sat: &GpsSatellite) -> Self {
        Self {
            l1_code: sat.l1_code,
            l1_phase_diff: sat.l1_phase_diff,
            l1_lock: sat.l1_lock,
            l1_cnr: sat.l1_cnr,
            l2: sat
                .l2_code
                .zip(sat.l2_pseudorange_diff)
                .zip(sat.l2_phase_diff)
                .zip(sat.l2_lock)
                .map(|(((c, r), p), l)| (c, r, p, l)),
            l2_cnr: sat.l2_cnr,
        }
    }
}

impl From<&GlonassSatellite> for RawBands {
    fn from(sat: &GlonassSatellite) -> Self {
        Self {
            l1_code: sat.l1_code,
            l1_phase_diff: sat.l1_phase_diff,
            l1_lock: sat.l1_lock,
            l1_cnr: sat.l1_cnr,
            l2: sat
                .l2_code
                .zip(sat.l2_pseudorange_diff)
                .zip(sat.l2_phase_diff)
                .zip(sat.l2_lock)
                .map(|(((c, r), p), l)| (c, r, p, l)),
            l2_cnr: sat.l2_cnr,
        }
    }
}

/// RTCM 3 stream decoder.
///
/// Frames are `0xD3`, 6 reserved bits, a 10-bit length, the payload and a
/// CRC-24Q over all that precedes. Observations of one epoch may be spread
/// over several messages (synchronous flag), they are released together.
pub struct Rtcm3Decoder {
    station: String,
    buffer: Vec<u8>,
    pending: Vec<ObservationRecord>,
    pending_time: Option<GpsTime>,
    /// Last lock time indicator per satellite and band
    lock_times: HashMap<(SatelliteId, u8), u8>,
    slips: HashMap<(SatelliteId, u8), i32>,
    ephemerides: EphemerisStore,
}

impl Rtcm3Decoder {
    pub fn new(station: &str) -> Self {
        Self {
            station: station.to_string(),
            buffer: Vec::new(),
            pending: Vec::new(),
            pending_time: None,
            lock_times: HashMap::new(),
            slips: HashMap::new(),
            ephemerides: EphemerisStore::default(),
        }
    }

    /// The slip counter only moves forward when the lock time indicator
    /// goes backwards.
    fn slip_count(&mut self, sat: SatelliteId, band: u8, lock: u8) -> i32 {
        let key = (sat, band);
        let counter = self.slips.entry(key).or_insert(0);
        if let Some(previous) = self.lock_times.insert(key, lock) {
            if lock < previous {
                *counter += 1;
            }
        }
        *counter
    }

    fn flush_pending(&mut self, outcome: &mut DecodeOutcome) {
        self.pending_time = None;
        if !self.pending.is_empty() {
            let epoch = std::mem::take(&mut self.pending);
            outcome.items.push(Decoded::Observations(epoch));
        }
    }

    fn push_epoch(
        &mut self,
        time: GpsTime,
        records: Vec<ObservationRecord>,
        synchronous: bool,
        outcome: &mut DecodeOutcome,
    ) {
        if self.pending_time.is_some_and(|t| t != time) {
            self.flush_pending(outcome);
        }
        self.pending_time = Some(time);
        self.pending.extend(records);
        if !synchronous {
            self.flush_pending(outcome);
        }
    }

    /// Pseudoranges, phases and signal strengths from the raw fields, the
    /// same for GPS and GLONASS once the L1 pseudorange is known.
    fn fill_bands(
        &mut self,
        obs: &mut ObservationRecord,
        id: SatelliteId,
        pr1: f64,
        raw: &RawBands,
        (lambda1, lambda2): (f64, f64),
    ) {
        set_code(&mut obs.l1, raw.l1_code, pr1);
        if raw.l1_phase_diff != INVALID_PHASE {
            let diff = sign_extend(raw.l1_phase_diff as u64, 20) as f64;
            obs.l1.phase = (pr1 + diff * 0.0005) / lambda1;
        }
        obs.l1.snr = raw.l1_cnr.unwrap_or(0) as f64 * 0.25;
        obs.l1.slip = self.slip_count(id, 1, raw.l1_lock);

        if let Some((code, range_diff, phase_diff, lock)) = raw.l2 {
            if range_diff != INVALID_RANGE_DIFF {
                let diff = sign_extend(range_diff as u64, 14) as f64;
                set_code(&mut obs.l2, code, pr1 + diff * 0.02);
            }
            if phase_diff != INVALID_PHASE {
                let diff = sign_extend(phase_diff as u64, 20) as f64;
                obs.l2.phase = (pr1 + diff * 0.0005) / lambda2;
            }
            obs.l2.snr = raw.l2_cnr.unwrap_or(0) as f64 * 0.25;
            obs.l2.slip = self.slip_count(id, 2, lock);
        }
    }

    fn gps_observables(
        &mut self,
        msg: GpsObservables,
        now: GpsTime,
        outcome: &mut DecodeOutcome,
    ) {
        let time = GpsTime::resolve_tow(now, msg.tow_ms as f64 * 1e-3);
        let lambda1 = C_LIGHT / FREQ_L1;
        let lambda2 = C_LIGHT / FREQ_L2;
        let mut records = Vec::with_capacity(msg.satellites.len());

        for sat in &msg.satellites {
            // PRN 0 encodes satellite 32, above 32 are SBAS (PRN 120 to 138)
            let (system, number) = match sat.prn {
                0 => (SatSystem::Gps, 32),
                1..=32 => (SatSystem::Gps, sat.prn),
                n => (SatSystem::Sbas, n + 80),
            };
            let id = SatelliteId::new(system, number);
            let mut obs = ObservationRecord::new(system, number, time);
            obs.set_station(&self.station);

            let pr1 = sat.l1_pseudorange as f64 * 0.02
                + sat.l1_ambiguity.unwrap_or(0) as f64 * LIGHT_MS;
            let raw = RawBands::from(sat);
            self.fill_bands(&mut obs, id, pr1, &raw, (lambda1, lambda2));
            records.push(obs);
        }
        self.push_epoch(time, records, msg.synchronous, outcome);
    }

    fn glonass_observables(
        &mut self,
        msg: GlonassObservables,
        now: GpsTime,
        outcome: &mut DecodeOutcome,
    ) {
        let time = GpsTime::resolve_glonass_tod(now, msg.tod_ms as f64 * 1e-3);
        let mut records = Vec::with_capacity(msg.satellites.len());

        for sat in &msg.satellites {
            let id = SatelliteId::new(SatSystem::Glonass, sat.slot);
            let k = sat.channel as f64;
            let lambda1 = C_LIGHT / (FREQ1_GLO + k * DFRQ1_GLO);
            let lambda2 = C_LIGHT / (FREQ2_GLO + k * DFRQ2_GLO);
            let mut obs = ObservationRecord::new(SatSystem::Glonass, sat.slot, time);
            obs.set_station(&self.station);
            obs.slot = sat.channel;

            let pr1 = sat.l1_pseudorange as f64 * 0.02
                + sat.l1_ambiguity.unwrap_or(0) as f64 * GLONASS_AMBIGUITY;
            let raw = RawBands::from(sat);
            self.fill_bands(&mut obs, id, pr1, &raw, (lambda1, lambda2));
            records.push(obs);
        }
        self.push_epoch(time, records, msg.synchronous, outcome);
    }

    fn store_ephemeris(
        &mut self,
        record: EphemerisRecord,
        outcome: &mut DecodeOutcome,
    ) {
        if self.ephemerides.insert(record.clone()) {
            outcome.items.push(Decoded::Ephemeris(record));
        }
    }

    fn decode_message(
        &mut self,
        payload: &[u8],
        now: GpsTime,
        outcome: &mut DecodeOutcome,
    ) -> Result<(), DecodeError> {
        if payload.len() < 2 {
            return Err(DecodeError::Truncated {
                message: 0,
                expected: 2,
                got: payload.len(),
            });
        }
        let message = ((payload[0] as u16) << 4) | (payload[1] as u16 >> 4);
        outcome.aux.message_types.push(message);

        match message {
            1001..=1004 => {
                let (_, msg) = GpsObservables::from_bytes((payload, 0))?;
                self.gps_observables(msg, now, outcome);
            }
            1009..=1012 => {
                let (_, msg) = GlonassObservables::from_bytes((payload, 0))?;
                self.glonass_observables(msg, now, outcome);
            }
            1019 => {
                let (_, msg) = GpsEphemeris::from_bytes((payload, 0))?;
                if msg.prn == 0 || msg.prn > 32 {
                    return Err(DecodeError::Malformed(format!(
                        "GPS ephemeris for PRN {}",
                        msg.prn
                    )));
                }
                self.store_ephemeris(msg.to_record(now), outcome);
            }
            1020 => {
                let (_, msg) = GlonassEphemeris::from_bytes((payload, 0))?;
                self.store_ephemeris(msg.to_record(now), outcome);
            }
            1005 | 1006 => {
                let (_, msg) = ReferenceStation::from_bytes((payload, 0))?;
                outcome.aux.antenna_positions.push(msg.position());
            }
            1007 | 1008 => {
                let (_, msg) = AntennaDescriptor::from_bytes((payload, 0))?;
                outcome.aux.antenna_descriptors.push(msg.descriptor());
            }
            _ => debug!("{}: message {} skipped", self.station, message),
        }
        Ok(())
    }
}

impl Decoder for Rtcm3Decoder {
    fn decode(&mut self, bytes: &[u8], now: GpsTime) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        self.buffer.extend_from_slice(bytes);

        loop {
            match self.buffer.iter().position(|&b| b == PREAMBLE) {
                Some(start) => {
                    self.buffer.drain(..start);
                }
                None => {
                    self.buffer.clear();
                    break;
                }
            }
            if self.buffer.len() < 3 {
                break;
            }
            // reserved bits must be zero, otherwise this is no preamble
            if self.buffer[1] & 0xfc != 0 {
                self.buffer.drain(..1);
                continue;
            }
            let len = ((self.buffer[1] as usize & 0x03) << 8)
                | self.buffer[2] as usize;
            if self.buffer.len() < len + 6 {
                break; // wait for the rest of the frame
            }
            let computed = crc24q(&self.buffer[..len + 3]);
            let expected = ((self.buffer[len + 3] as u32) << 16)
                | ((self.buffer[len + 4] as u32) << 8)
                | self.buffer[len + 5] as u32;
            if computed != expected {
                debug!(
                    "{}: bad checksum on {}",
                    self.station,
                    hex::encode(&self.buffer[..len.min(16) + 3])
                );
                outcome.errors.push(DecodeError::Crc { computed, expected });
                self.buffer.drain(..1);
                continue;
            }
            let frame: Vec<u8> = self.buffer.drain(..len + 6).collect();
            match self.decode_message(&frame[3..len + 3], now, &mut outcome) {
                Ok(()) => outcome.messages += 1,
                Err(e) => outcome.errors.push(e),
            }
        }
        outcome
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.pending_time = None;
        self.lock_times.clear();
        self.slips.clear();
    }

    fn ephemerides(&self) -> &EphemerisStore {
        &self.ephemerides
    }

    fn format(&self) -> Format {
        Format::Rtcm3
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::ephemeris::EphemerisPayload;
    use approx::assert_relative_eq;
    use hexlit::hex;

    /// Bit-level writer to build test messages
    #[derive(Default)]
    pub(crate) struct BitWriter {
        bytes: Vec<u8>,
        bits: usize,
    }

    impl BitWriter {
        pub(crate) fn put(&mut self, value: u64, width: usize) -> &mut Self {
            for i in (0..width).rev() {
                if self.bits % 8 == 0 {
                    self.bytes.push(0);
                }
                let bit = ((value >> i) & 1) as u8;
                let last = self.bytes.len() - 1;
                self.bytes[last] |= bit << (7 - self.bits % 8);
                self.bits += 1;
            }
            self
        }

        pub(crate) fn signed(&mut self, value: i64, width: usize) -> &mut Self {
            self.put(value as u64 & ((1u64 << width) - 1), width)
        }

        pub(crate) fn finish(&self) -> Vec<u8> {
            self.bytes.clone()
        }
    }

    pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            PREAMBLE,
            (payload.len() >> 8) as u8 & 0x03,
            payload.len() as u8,
        ];
        frame.extend_from_slice(payload);
        let crc = crc24q(&frame);
        frame.extend_from_slice(&[(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]);
        frame
    }

    /// A 1004 message with one satellite
    fn msg1004(tow_ms: u64, synchronous: bool, prn: u64, lock: u64) -> Vec<u8> {
        let mut w = BitWriter::default();
        w.put(1004, 12).put(2003, 12).put(tow_ms, 30);
        w.put(synchronous as u64, 1).put(1, 5).put(0, 1).put(0, 3);
        w.put(prn, 6).put(0, 1).put(1_000_000, 24); // 20000.00 m
        w.signed(2000, 20).put(lock, 7).put(70, 8).put(180, 8);
        w.put(3, 2).signed(-50, 14).signed(4000, 20).put(lock, 7).put(160, 8);
        w.finish()
    }

    /// A 1019 message for G12
    fn msg1019(iode: u64, toe: u64) -> Vec<u8> {
        let mut w = BitWriter::default();
        w.put(1019, 12).put(12, 6).put(2295 % 1024, 10).put(0, 4).put(1, 2);
        w.signed(-5, 14).put(iode, 8).put(toe, 16).signed(0, 8);
        w.signed(-3, 16).signed(1000, 22).put(iode, 10).signed(-40, 16);
        w.signed(12_000, 16).signed(-1_000_000, 32).signed(-100, 16);
        w.put(40_000_000, 32).signed(500, 16).put(2_702_000_000, 32);
        w.put(toe, 16).signed(10, 16).signed(-900_000_000, 32);
        w.signed(-10, 16).put(660_000_000, 32).signed(7000, 16);
        w.signed(300_000_000, 32).signed(-20_000, 24).signed(-8, 8);
        w.put(0, 6).put(0, 1).put(0, 1);
        frame(&w.finish())
    }

    fn now() -> GpsTime {
        GpsTime::new(2295, 100_000.)
    }

    #[test]
    fn test_frame() {
        let bytes = hex!(
            "d300183ec7d317d7840010141e848000fa0f11ad3ff3803e81e5002e19da"
        );
        assert_eq!(frame(&msg1004(100_000_000, false, 5, 60)), bytes.to_vec());

        let mut decoder = Rtcm3Decoder::new("TEST0");
        let outcome = decoder.decode(&bytes, now());
        assert_eq!(outcome.messages, 1);
        let prn = outcome.observations().next().map(|o| o.prn());
        assert_eq!(prn, Some("G05".to_string()));
    }

    #[test]
    fn test_garbage() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        // no preamble at all
        assert!(decoder.decode(&hex!("0042ff17"), now()).is_need_more_data());
        // reserved bits set: not a preamble
        assert!(decoder.decode(&hex!("d3ff0000"), now()).is_need_more_data());
        // a valid frame too short to carry a message number
        let outcome = decoder.decode(&frame(&[0x3e]), now());
        assert!(matches!(outcome.errors[..], [DecodeError::Truncated { .. }]));
    }

    #[test]
    fn test_gps_observables() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let bytes = frame(&msg1004(100_000_000, false, 5, 60));
        let outcome = decoder.decode(&bytes, now());
        assert!(outcome.errors.is_empty());
        assert!(outcome.is_success());
        assert_eq!(outcome.aux.message_types, vec![1004]);

        let obs: Vec<_> = outcome.observations().collect();
        assert_eq!(obs.len(), 1);
        let obs = obs[0];
        assert_eq!(obs.station, "TEST0");
        assert_eq!(obs.prn(), "G05");
        assert_eq!(obs.time, GpsTime::new(2295, 100_000.));
        let pr1 = 20_000. + 70. * LIGHT_MS;
        assert_relative_eq!(obs.l1.code_ca, pr1, epsilon = 1e-6);
        assert_relative_eq!(
            obs.l1.phase,
            (pr1 + 1.) * FREQ_L1 / C_LIGHT,
            epsilon = 1e-6
        );
        assert_relative_eq!(obs.l1.snr, 45.);
        assert_relative_eq!(obs.l2.code_p, pr1 - 1., epsilon = 1e-6);
        assert_eq!(obs.l2.code_ca, 0.);
        assert_relative_eq!(obs.l2.snr, 40.);
        assert_eq!(obs.l1.slip, 0);
    }

    #[test]
    fn test_split_reads() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let mut bytes = vec![0x00, 0x42]; // garbage before the frame
        bytes.extend(frame(&msg1004(100_000_000, false, 5, 60)));

        let (first, second) = bytes.split_at(10);
        let outcome = decoder.decode(first, now());
        assert!(outcome.is_need_more_data());
        let outcome = decoder.decode(second, now());
        assert_eq!(outcome.observations().count(), 1);
    }

    #[test]
    fn test_corrupted_frame() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let mut corrupted = frame(&msg1004(100_000_000, false, 5, 60));
        corrupted[10] ^= 0x01;
        let mut bytes = corrupted;
        bytes.extend(frame(&msg1004(101_000_000, false, 6, 60)));

        let outcome = decoder.decode(&bytes, now());
        assert!(outcome
            .errors
            .iter()
            .any(|e| matches!(e, DecodeError::Crc { .. })));
        let obs: Vec<_> = outcome.observations().collect();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].satellite, 6);
    }

    #[test]
    fn test_synchronous_epoch() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let outcome =
            decoder.decode(&frame(&msg1004(100_000_000, true, 5, 60)), now());
        assert!(outcome.is_success());
        assert_eq!(outcome.observations().count(), 0);

        let outcome =
            decoder.decode(&frame(&msg1004(100_000_000, false, 7, 60)), now());
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.observations().count(), 2);
    }

    #[test]
    fn test_slip_counter() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let mut slips = vec![];
        for (i, lock) in [60, 70, 10, 20, 5].iter().enumerate() {
            let tow = 100_000_000 + i as u64 * 1000;
            let bytes = frame(&msg1004(tow, false, 5, *lock));
            let outcome = decoder.decode(&bytes, now());
            slips.extend(outcome.observations().map(|o| o.l1.slip));
        }
        assert_eq!(slips, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn test_week_rollover() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        // receiver still in the previous week
        let now = GpsTime::new(2296, 2.);
        let bytes = frame(&msg1004(604_799_000, false, 5, 60));
        let outcome = decoder.decode(&bytes, now);
        let obs: Vec<_> = outcome.observations().collect();
        assert_eq!(obs[0].time, GpsTime::new(2295, 604_799.));
    }

    #[test]
    fn test_glonass_observables() {
        let mut w = BitWriter::default();
        // 1010: L1 only with ambiguity and CNR, 03:00:00 Moscow time
        w.put(1010, 12).put(2003, 12).put(3 * 3_600_000, 27);
        w.put(0, 1).put(1, 5).put(0, 1).put(0, 3);
        w.put(9, 6).put(0, 1).put(3, 5); // channel -4
        w.put(500_000, 25).signed(-200, 20).put(30, 7).put(35, 7).put(176, 8);
        let bytes = frame(&w.finish());

        let mut decoder = Rtcm3Decoder::new("TEST0");
        let outcome = decoder.decode(&bytes, GpsTime::new(2295, 86_420.));
        let obs: Vec<_> = outcome.observations().collect();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].prn(), "R09");
        assert_eq!(obs[0].slot, -4);
        assert_eq!(obs[0].time, GpsTime::new(2295, 86_418.));
        let pr1 = 10_000. + 35. * GLONASS_AMBIGUITY;
        assert_relative_eq!(obs[0].l1.code_ca, pr1, epsilon = 1e-6);
        assert_relative_eq!(obs[0].l1.snr, 44.);
        assert!(obs[0].l2.is_empty());
    }

    #[test]
    fn test_gps_ephemeris() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let mut bytes = msg1019(1, 100);
        bytes.extend(msg1019(3, 300));
        bytes.extend(msg1019(2, 200));
        bytes.extend(msg1019(3, 300));
        let outcome = decoder.decode(&bytes, now());
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.ephemerides().count(), 3);

        let sat = SatelliteId::new(SatSystem::Gps, 12);
        let history = decoder.ephemerides().history(&sat).unwrap();
        assert_eq!(history.versions(), vec![3, 2, 1]);
        let latest = history.latest().unwrap();
        assert_eq!(latest.time, GpsTime::new(2295, 300. * 16.));
        match &latest.payload {
            EphemerisPayload::Gps(orbit) => {
                assert_eq!(orbit.iodc, 3);
                assert_relative_eq!(orbit.af0, 1000. * 2f64.powi(-31));
                assert_relative_eq!(orbit.sqrt_a, 2_702_000_000. / 524_288.);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_station_messages() {
        let mut w = BitWriter::default();
        w.put(1006, 12).put(2003, 12).put(0, 6).put(1, 1).put(1, 1);
        w.put(0, 1).put(0, 1).signed(41_629_394_123, 38).put(0, 1).put(0, 1);
        w.signed(6_715_991_234, 38).put(0, 2).signed(47_700_000_001, 38);
        w.put(15_000, 16);
        let mut bytes = frame(&w.finish());

        let mut w = BitWriter::default();
        w.put(1008, 12).put(2003, 12).put(20, 8);
        for c in b"LEIAR25.R3      LEIT" {
            w.put(*c as u64, 8);
        }
        w.put(0, 8).put(3, 8);
        for c in b"123" {
            w.put(*c as u64, 8);
        }
        bytes.extend(frame(&w.finish()));

        let mut decoder = Rtcm3Decoder::new("TEST0");
        let outcome = decoder.decode(&bytes, now());
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.aux.message_types, vec![1006, 1008]);
        assert_eq!(outcome.aux.antenna_descriptors, vec!["LEIAR25.R3      LEIT"]);
        let arp = &outcome.aux.antenna_positions[0];
        assert_relative_eq!(arp.x, 4_162_939.4123, epsilon = 1e-6);
        assert_relative_eq!(arp.z, 4_770_000.0001, epsilon = 1e-6);
        assert_eq!(arp.height.map(|h| (h * 1e4).round()), Some(15_000.));
    }

    #[test]
    fn test_reset() {
        let mut decoder = Rtcm3Decoder::new("TEST0");
        let outcome = decoder.decode(&msg1019(4, 100), now());
        assert_eq!(outcome.ephemerides().count(), 1);

        // an epoch left incomplete when the connection dropped
        decoder.decode(&frame(&msg1004(100_000_000, true, 5, 60)), now());
        decoder.reset();

        let outcome =
            decoder.decode(&frame(&msg1004(100_000_000, false, 7, 60)), now());
        let obs: Vec<_> = outcome.observations().collect();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].satellite, 7);
        let sat = SatelliteId::new(SatSystem::Gps, 12);
        assert_eq!(decoder.ephemerides().history(&sat).map(|h| h.len()), Some(1));

        // lock time going backwards is a slip
        let outcome =
            decoder.decode(&frame(&msg1004(100_001_000, false, 7, 10)), now());
        let slips: Vec<_> = outcome.observations().map(|o| o.l1.slip).collect();
        assert_eq!(slips, vec![1]);

        // after a reset, counters start over
        decoder.reset();
        let outcome =
            decoder.decode(&frame(&msg1004(100_002_000, false, 7, 5)), now());
        let slips: Vec<_> = outcome.observations().map(|o| o.l1.slip).collect();
        assert_eq!(slips, vec![0]);
    }
}
