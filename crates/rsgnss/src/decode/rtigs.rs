/**
 * ## RT-IGS records
 *
 * Every record starts with the same 12-byte header (big endian), followed
 * by a payload depending on the record type:
 *
 * | type | content                                                  |
 * | ---- | -------------------------------------------------------- |
 * | 100  | station description                                      |
 * | 200  | observations, compressed in the JPL SOC format           |
 * | 300  | GPS ephemeris, the 3 subframes without their parity bits |
 * | 400  | meteorological data                                      |
 *
 * The header time is expressed in seconds since the GPS epoch so no
 * external clock is needed to resolve the week.
 */
use super::ephemeris::EphemerisStore;
use super::rtcm3::navigation::resolve_week;
use super::time::{GpsTime, SECONDS_PER_WEEK};
use super::{sign_extend, DecodeError, DecodeOutcome, Decoded, Decoder, Format};
use crate::data::ephemeris::{EphemerisPayload, EphemerisRecord, GpsOrbit};
use crate::data::observation::{ObservationRecord, SatSystem, SatelliteId};
use deku::prelude::*;
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

pub const HEADER_LEN: usize = 12;
pub const SOC_LEN: usize = 21;
pub const EPHEMERIS_LEN: usize = 72;

pub const STATION_RECORD: u16 = 100;
pub const OBSERVATION_RECORD: u16 = 200;
pub const EPHEMERIS_RECORD: u16 = 300;
pub const METEO_RECORD: u16 = 400;

/// Records longer than this are considered garbage
const MAX_RECORD_LEN: usize = 2048;
/// Receivers stream at most this number of observations per record
const MAX_CHANNELS: usize = 12;

/// Phase deltas beyond this value are flagged as overflowing (m)
const MAX_PHASE_DELTA: f64 = 41.94302;

const C_LIGHT: f64 = 299_792_458.;
const FREQ_L1: f64 = 1.57542e9;
const FREQ_L2: f64 = 1.22760e9;

#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct RecordHeader {
    pub record_type: u16,
    pub station_id: u16,
    /// Seconds since the GPS epoch
    pub gps_time: u32,
    /// Length of the record, header included
    pub num_bytes: u16,
    /// Issue of data of the station configuration
    pub iods: u8,
    /// Number of observations (200) or PRN (300)
    pub count: u8,
}

/**
 * One satellite in the SOC (JPL) compressed format: the C/A pseudorange
 * in full, then the P-code ranges and phases as deltas to the C/A range.
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct SocObservation {
    pub prn: u8,
    /// Changes every time the receiver loses lock
    #[deku(endian = "little")]
    pub epoch_sequence: u16,
    #[deku(bits = 1)]
    pub ca_flag: bool,
    #[deku(bits = 1)]
    pub as_flag: bool,
    /// The L2 phase delta overflows
    #[deku(bits = 1)]
    pub p2_flag: bool,
    /// The L1 phase delta overflows
    #[deku(bits = 1)]
    pub p1_flag: bool,
    /// C/A pseudorange in mm, on 36 bits
    #[deku(bits = 4)]
    pub ca_msb: u8,
    pub ca_lsb: u32,
    pub ca_snr: u8,
    pub l2: RangePhaseDelta,
    pub l2_snr: u8,
    pub l1: RangePhaseDelta,
    pub l1_snr: u8,
}

#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "endian", ctx = "endian: deku::ctx::Endian")]
pub struct RangePhaseDelta {
    #[deku(bits = 1)]
    pub range_negative: bool,
    /// mm
    #[deku(bits = 17)]
    pub range: u32,
    #[deku(bits = 1)]
    pub phase_negative: bool,
    /// 0.02 mm
    #[deku(bits = 21)]
    pub phase: u32,
}

impl RangePhaseDelta {
    fn range(&self) -> f64 {
        let delta = self.range as f64 / 1000.;
        if self.range_negative {
            -delta
        } else {
            delta
        }
    }

    fn phase(&self, overflow: bool) -> f64 {
        let mut delta = self.phase as f64 * 2. / 100_000.;
        if overflow {
            delta += MAX_PHASE_DELTA;
        }
        if self.phase_negative {
            -delta
        } else {
            delta
        }
    }
}

impl SocObservation {
    /// C/A pseudorange (m)
    pub fn ca(&self) -> f64 {
        (((self.ca_msb as u64) << 32) | self.ca_lsb as u64) as f64 / 1000.
    }
}

/// GPS subframes 1 to 3, six 24-bit words each, right aligned in 32 bits
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct Subframes {
    pub sf1: [u32; 6],
    pub sf2: [u32; 6],
    pub sf3: [u32; 6],
}

fn field(word: u32, shift: u32, bits: u32) -> u64 {
    ((word >> shift) as u64) & ((1 << bits) - 1)
}

fn signed(value: u64, bits: u32, exponent: i32) -> f64 {
    sign_extend(value, bits) as f64 * 2f64.powi(exponent)
}

impl Subframes {
    /// Broadcast orbit with the week number resolved around the time the
    /// ephemeris was collected.
    pub fn to_orbit(&self, collected: GpsTime) -> GpsOrbit {
        let [w10, _, _, w13, w14, w15] = self.sf1;
        let [w20, w21, w22, w23, w24, w25] = self.sf2;
        let [w30, w31, w32, w33, w34, w35] = self.sf3;

        let af1 = field(w14, 0, 8) << 8 | field(w15, 24, 8);
        let iodc = field(w10, 8, 2) << 8 | field(w13, 0, 8);
        let sqrt_a = field(w24, 0, 24) << 8 | field(w25, 24, 8);
        let cus = field(w23, 0, 8) << 8 | field(w24, 24, 8);
        let e = field(w22, 0, 8) << 24 | field(w23, 8, 24);
        let m0 = field(w21, 0, 24) << 8 | field(w22, 24, 8);
        let delta_n = field(w20, 0, 8) << 8 | field(w21, 24, 8);
        let omega_dot = field(w34, 0, 16) << 8 | field(w35, 24, 8);
        let omega = field(w33, 0, 16) << 16 | field(w34, 16, 16);
        let omega0 = field(w30, 0, 16) << 16 | field(w31, 16, 16);

        let toe = field(w25, 8, 16) as f64 * 16.;
        // the week is the week of transmission, the reference time may
        // already belong to the following one
        let mut week = resolve_week(collected, field(w10, 22, 10) as u16);
        let transmitted = (collected.gps_seconds() - 18.)
            .rem_euclid(SECONDS_PER_WEEK);
        if transmitted - toe > SECONDS_PER_WEEK / 2. {
            week += 1;
        }

        GpsOrbit {
            week: week as u16,
            iodc: iodc as u16,
            iode: field(w35, 16, 8) as u8,
            toc: field(w14, 16, 16) as f64 * 16.,
            toe,
            af0: signed(field(w15, 2, 22), 22, -31),
            af1: signed(af1, 16, -43),
            af2: signed(field(w14, 8, 8), 8, -55),
            crs: signed(field(w20, 8, 16), 16, -5),
            delta_n: signed(delta_n, 16, -43) * PI,
            m0: signed(m0, 32, -31) * PI,
            cuc: signed(field(w22, 8, 16), 16, -29),
            e: e as f64 * 2f64.powi(-33),
            cus: signed(cus, 16, -29),
            sqrt_a: sqrt_a as f64 * 2f64.powi(-19),
            cic: signed(field(w30, 16, 16), 16, -29),
            omega0: signed(omega0, 32, -31) * PI,
            cis: signed(field(w31, 0, 16), 16, -29),
            i0: signed(w32 as u64, 32, -31) * PI,
            crc: signed(field(w33, 16, 16), 16, -5),
            omega: signed(omega, 32, -31) * PI,
            omega_dot: signed(omega_dot, 24, -43) * PI,
            idot: signed(field(w35, 2, 14), 14, -43) * PI,
            tgd: signed(field(w13, 8, 8), 8, -31),
            ura: field(w10, 16, 4) as u8,
            health: field(w10, 10, 6) as u8,
        }
    }
}

/// RT-IGS stream decoder
pub struct RtigsDecoder {
    station: String,
    buffer: Vec<u8>,
    /// Last epoch sequence number per PRN
    sequences: HashMap<u8, u16>,
    slips: HashMap<u8, i32>,
    ephemerides: EphemerisStore,
}

impl RtigsDecoder {
    pub fn new(station: &str) -> Self {
        Self {
            station: station.to_string(),
            buffer: Vec::new(),
            sequences: HashMap::new(),
            slips: HashMap::new(),
            ephemerides: EphemerisStore::default(),
        }
    }

    fn slip_count(&mut self, prn: u8, sequence: u16) -> i32 {
        let counter = self.slips.entry(prn).or_insert(0);
        if let Some(previous) = self.sequences.insert(prn, sequence) {
            if previous != sequence {
                *counter += 1;
            }
        }
        *counter
    }

    fn observations(
        &mut self,
        header: &RecordHeader,
        payload: &[u8],
        outcome: &mut DecodeOutcome,
    ) -> Result<(), DecodeError> {
        let num_obs = header.count as usize;
        if num_obs > MAX_CHANNELS {
            return Err(DecodeError::Malformed(format!(
                "{num_obs} observations in one record"
            )));
        }
        if payload.len() < num_obs * SOC_LEN {
            return Err(DecodeError::Truncated {
                message: header.record_type,
                expected: HEADER_LEN + num_obs * SOC_LEN,
                got: HEADER_LEN + payload.len(),
            });
        }
        let time = GpsTime::from_gps_seconds(header.gps_time as f64);
        let lambda1 = C_LIGHT / FREQ_L1;
        let lambda2 = C_LIGHT / FREQ_L2;
        let f1ion = FREQ_L2.powi(2) / (FREQ_L1.powi(2) - FREQ_L2.powi(2));
        let f2ion = FREQ_L1.powi(2) / (FREQ_L1.powi(2) - FREQ_L2.powi(2));
        let (sf1, sf2) = (f1ion + f2ion, 2. * f1ion);

        let mut records = Vec::with_capacity(num_obs);
        for chunk in payload.chunks_exact(SOC_LEN).take(num_obs) {
            let (_, soc) = SocObservation::from_bytes((chunk, 0))?;
            if !(1..=32).contains(&soc.prn) {
                outcome.errors.push(DecodeError::Malformed(format!(
                    "observation for PRN {}",
                    soc.prn
                )));
                continue;
            }
            if !soc.ca_flag {
                continue; // no C/A range, nothing to derive the rest from
            }
            let ca = soc.ca();
            let dl2 = soc.l2.range();
            let dl1 = soc.l1.range();

            let mut obs = ObservationRecord::new(SatSystem::Gps, soc.prn, time);
            obs.set_station(&self.station);
            let slip = self.slip_count(soc.prn, soc.epoch_sequence);

            obs.l1.code_ca = ca;
            obs.l1.code_p = ca + dl1;
            obs.l1.phase = (ca - sf2 * dl2 + soc.l1.phase(soc.p1_flag)) / lambda1;
            obs.l1.snr = soc.ca_snr as f64;
            obs.l1.slip = slip;

            obs.l2.code_p = ca + dl2;
            obs.l2.phase = (ca - sf1 * dl2 + soc.l2.phase(soc.p2_flag)) / lambda2;
            obs.l2.snr = soc.l2_snr as f64;
            obs.l2.slip = slip;
            records.push(obs);
        }
        if !records.is_empty() {
            outcome.items.push(Decoded::Observations(records));
        }
        Ok(())
    }

    fn ephemeris(
        &mut self,
        header: &RecordHeader,
        payload: &[u8],
        outcome: &mut DecodeOutcome,
    ) -> Result<(), DecodeError> {
        let prn = header.count;
        if !(1..=32).contains(&prn) {
            return Err(DecodeError::Malformed(format!(
                "GPS ephemeris for PRN {prn}"
            )));
        }
        if payload.len() < EPHEMERIS_LEN {
            return Err(DecodeError::Truncated {
                message: header.record_type,
                expected: HEADER_LEN + EPHEMERIS_LEN,
                got: HEADER_LEN + payload.len(),
            });
        }
        let (_, subframes) = Subframes::from_bytes((payload, 0))?;
        let collected = GpsTime::from_gps_seconds(header.gps_time as f64);
        let orbit = subframes.to_orbit(collected);
        let record = EphemerisRecord::new(
            SatelliteId::new(SatSystem::Gps, prn),
            orbit.iode as u16,
            GpsTime::new(orbit.week as u32, orbit.toe),
            7200.,
            EphemerisPayload::Gps(orbit),
        );
        if self.ephemerides.insert(record.clone()) {
            outcome.items.push(Decoded::Ephemeris(record));
        }
        Ok(())
    }

    fn decode_record(
        &mut self,
        record: &[u8],
        outcome: &mut DecodeOutcome,
    ) -> Result<(), DecodeError> {
        let ((rest, _), header) = RecordHeader::from_bytes((record, 0))?;
        outcome.aux.message_types.push(header.record_type);
        match header.record_type {
            OBSERVATION_RECORD => self.observations(&header, rest, outcome),
            EPHEMERIS_RECORD => self.ephemeris(&header, rest, outcome),
            _ => {
                debug!(
                    "{}: record {} skipped",
                    self.station, header.record_type
                );
                Ok(())
            }
        }
    }
}

fn is_record_start(bytes: &[u8]) -> bool {
    let record_type = u16::from_be_bytes([bytes[0], bytes[1]]);
    matches!(
        record_type,
        STATION_RECORD | OBSERVATION_RECORD | EPHEMERIS_RECORD | METEO_RECORD
    )
}

impl Decoder for RtigsDecoder {
    fn decode(&mut self, bytes: &[u8], _now: GpsTime) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        self.buffer.extend_from_slice(bytes);

        loop {
            match self.buffer.windows(2).position(is_record_start) {
                Some(start) => {
                    self.buffer.drain(..start);
                }
                None => {
                    // keep a last byte which may start a record type
                    let keep = self.buffer.len().min(1);
                    self.buffer.drain(..self.buffer.len() - keep);
                    break;
                }
            }
            if self.buffer.len() < HEADER_LEN {
                break;
            }
            let num_bytes =
                u16::from_be_bytes([self.buffer[8], self.buffer[9]]) as usize;
            if !(HEADER_LEN..=MAX_RECORD_LEN).contains(&num_bytes) {
                // not a record header after all
                self.buffer.drain(..1);
                continue;
            }
            if self.buffer.len() < num_bytes {
                break; // wait for the rest of the record
            }
            let record: Vec<u8> = self.buffer.drain(..num_bytes).collect();
            match self.decode_record(&record, &mut outcome) {
                Ok(()) => outcome.messages += 1,
                Err(e) => outcome.errors.push(e),
            }
        }
        outcome
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sequences.clear();
        self.slips.clear();
    }

    fn ephemerides(&self) -> &EphemerisStore {
        &self.ephemerides
    }

    fn format(&self) -> Format {
        Format::Rtigs
    }
}
