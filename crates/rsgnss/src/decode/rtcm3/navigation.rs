use crate::data::ephemeris::{
    EphemerisPayload, EphemerisRecord, GlonassOrbit, GpsOrbit,
};
use crate::data::observation::{SatSystem, SatelliteId};
use crate::decode::time::GpsTime;
use crate::decode::{sign_extend, sign_magnitude};
use deku::prelude::*;
use std::f64::consts::PI;

/**
 * ## GPS ephemeris (1019)
 *
 * Signed fields are read raw and converted with their scale factors in
 * [`GpsEphemeris::to_record`]. Angles are transmitted in semicircles.
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct GpsEphemeris {
    #[deku(bits = 12)]
    pub message_number: u16,
    #[deku(bits = 6)]
    pub prn: u8,
    /// Week number, modulo 1024
    #[deku(bits = 10)]
    pub week: u16,
    #[deku(bits = 4)]
    pub ura: u8,
    #[deku(bits = 2)]
    pub l2_code: u8,
    #[deku(bits = 14)]
    pub idot: u16,
    pub iode: u8,
    #[deku(bits = 16)]
    pub toc: u16,
    pub af2: u8,
    #[deku(bits = 16)]
    pub af1: u16,
    #[deku(bits = 22)]
    pub af0: u32,
    #[deku(bits = 10)]
    pub iodc: u16,
    #[deku(bits = 16)]
    pub crs: u16,
    #[deku(bits = 16)]
    pub delta_n: u16,
    pub m0: u32,
    #[deku(bits = 16)]
    pub cuc: u16,
    pub e: u32,
    #[deku(bits = 16)]
    pub cus: u16,
    pub sqrt_a: u32,
    #[deku(bits = 16)]
    pub toe: u16,
    #[deku(bits = 16)]
    pub cic: u16,
    pub omega0: u32,
    #[deku(bits = 16)]
    pub cis: u16,
    pub i0: u32,
    #[deku(bits = 16)]
    pub crc: u16,
    pub omega: u32,
    #[deku(bits = 24)]
    pub omega_dot: u32,
    pub tgd: u8,
    #[deku(bits = 6)]
    pub health: u8,
    #[deku(bits = 1)]
    pub l2p_flag: bool,
    #[deku(bits = 1)]
    pub fit_interval: bool,
}

fn scaled(value: u64, bits: u32, exponent: i32) -> f64 {
    sign_extend(value, bits) as f64 * 2f64.powi(exponent)
}

/// Resolve a week number modulo 1024 to the one closest to the reference
pub fn resolve_week(reference: GpsTime, week: u16) -> u32 {
    let reference = reference.week as i64;
    let week = week as i64;
    let mut full = reference - (reference - week).rem_euclid(1024);
    if reference - full > 512 {
        full += 1024;
    }
    full.max(0) as u32
}

impl GpsEphemeris {
    pub fn to_record(&self, reference: GpsTime) -> EphemerisRecord {
        let week = resolve_week(reference, self.week);
        let toe = self.toe as f64 * 16.;
        let orbit = GpsOrbit {
            week: week as u16,
            iodc: self.iodc,
            iode: self.iode,
            toc: self.toc as f64 * 16.,
            toe,
            af0: scaled(self.af0 as u64, 22, -31),
            af1: scaled(self.af1 as u64, 16, -43),
            af2: scaled(self.af2 as u64, 8, -55),
            crs: scaled(self.crs as u64, 16, -5),
            delta_n: scaled(self.delta_n as u64, 16, -43) * PI,
            m0: scaled(self.m0 as u64, 32, -31) * PI,
            cuc: scaled(self.cuc as u64, 16, -29),
            e: self.e as f64 * 2f64.powi(-33),
            cus: scaled(self.cus as u64, 16, -29),
            sqrt_a: self.sqrt_a as f64 * 2f64.powi(-19),
            cic: scaled(self.cic as u64, 16, -29),
            omega0: scaled(self.omega0 as u64, 32, -31) * PI,
            cis: scaled(self.cis as u64, 16, -29),
            i0: scaled(self.i0 as u64, 32, -31) * PI,
            crc: scaled(self.crc as u64, 16, -5),
            omega: scaled(self.omega as u64, 32, -31) * PI,
            omega_dot: scaled(self.omega_dot as u64, 24, -43) * PI,
            idot: scaled(self.idot as u64, 14, -43) * PI,
            tgd: scaled(self.tgd as u64, 8, -31),
            ura: self.ura,
            health: self.health,
        };
        EphemerisRecord::new(
            SatelliteId::new(SatSystem::Gps, self.prn),
            self.iode as u16,
            GpsTime::new(week, toe),
            7200.,
            EphemerisPayload::Gps(orbit),
        )
    }
}

/**
 * ## GLONASS ephemeris (1020)
 *
 * Only the part up to the frequency correction is read: the almanac
 * related fields which follow are of no use here. GLONASS signed fields
 * are encoded as sign and magnitude.
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct GlonassEphemeris {
    #[deku(bits = 12)]
    pub message_number: u16,
    #[deku(bits = 6)]
    pub slot: u8,
    #[deku(bits = 5)]
    pub channel: u8,
    #[deku(bits = 1)]
    pub almanac_health: bool,
    #[deku(bits = 1)]
    pub almanac_health_available: bool,
    #[deku(bits = 2)]
    pub p1: u8,
    /// hours (5 bits), minutes (6 bits), 30 s (1 bit)
    #[deku(bits = 12)]
    pub tk: u16,
    #[deku(bits = 1)]
    pub bn: u8,
    #[deku(bits = 1)]
    pub p2: u8,
    #[deku(bits = 7)]
    pub tb: u8,
    #[deku(bits = 24)]
    pub vx: u32,
    #[deku(bits = 27)]
    pub x: u32,
    #[deku(bits = 5)]
    pub ax: u8,
    #[deku(bits = 24)]
    pub vy: u32,
    #[deku(bits = 27)]
    pub y: u32,
    #[deku(bits = 5)]
    pub ay: u8,
    #[deku(bits = 24)]
    pub vz: u32,
    #[deku(bits = 27)]
    pub z: u32,
    #[deku(bits = 5)]
    pub az: u8,
    #[deku(bits = 1)]
    pub p3: u8,
    #[deku(bits = 11)]
    pub gamma: u16,
    #[deku(bits = 2)]
    pub p: u8,
    #[deku(bits = 1)]
    pub ln3: u8,
    #[deku(bits = 22)]
    pub tau: u32,
}

fn glonass_scaled(value: u64, bits: u32, exponent: i32) -> f64 {
    sign_magnitude(value, bits) as f64 * 2f64.powi(exponent)
}

impl GlonassEphemeris {
    pub fn to_record(&self, reference: GpsTime) -> EphemerisRecord {
        let tb_seconds = self.tb as f64 * 900.;
        let tk = ((self.tk >> 7) & 0x1f) as f64 * 3600.
            + ((self.tk >> 1) & 0x3f) as f64 * 60.
            + (self.tk & 0x1) as f64 * 30.;
        let orbit = GlonassOrbit {
            frequency_channel: self.channel as i8 - 7,
            tb: self.tb,
            tk,
            position: [
                glonass_scaled(self.x as u64, 27, -11),
                glonass_scaled(self.y as u64, 27, -11),
                glonass_scaled(self.z as u64, 27, -11),
            ],
            velocity: [
                glonass_scaled(self.vx as u64, 24, -20),
                glonass_scaled(self.vy as u64, 24, -20),
                glonass_scaled(self.vz as u64, 24, -20),
            ],
            acceleration: [
                glonass_scaled(self.ax as u64, 5, -30),
                glonass_scaled(self.ay as u64, 5, -30),
                glonass_scaled(self.az as u64, 5, -30),
            ],
            gamma: glonass_scaled(self.gamma as u64, 11, -40),
            tau: glonass_scaled(self.tau as u64, 22, -30),
            health: self.bn,
        };
        EphemerisRecord::new(
            SatelliteId::new(SatSystem::Glonass, self.slot),
            self.tb as u16,
            GpsTime::resolve_glonass_tod(reference, tb_seconds),
            1800.,
            EphemerisPayload::Glonass(orbit),
        )
    }
}
