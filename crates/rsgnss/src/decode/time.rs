/**
 * Timestamps come in various flavours on GNSS streams and need to be brought
 * back to a common GPS week and seconds of week.
 *
 * - Unix timestamps (from epoch), provided by std::time::SystemTime
 * - seconds since the GPS epoch (RT-IGS headers)
 * - milliseconds of the GPS week, without the week number (RTCM 3 GPS)
 * - milliseconds of the GLONASS day, in Moscow time (RTCM 3 GLONASS)
 */
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const GPS_TO_UNIX_OFFSET: f64 = 315964800.; // GPS epoch to Unix epoch in seconds

pub const LEAP_SECONDS_SINCE_2017: f64 = 18.;

pub const SECONDS_PER_WEEK: f64 = 604_800.;
pub const SECONDS_PER_DAY: f64 = 86_400.;

/// GLONASS time runs on Moscow time, UTC+3
const GLONASS_TO_UTC: f64 = 3. * 3600.;

pub fn now_in_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// A GPS time, as a week number and seconds in the week
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct GpsTime {
    pub week: u32,
    pub seconds: f64,
}

impl GpsTime {
    pub fn new(week: u32, seconds: f64) -> Self {
        Self { week, seconds }
    }

    /// Current GPS time from the system clock
    pub fn now() -> Self {
        Self::from_unix(now_in_s())
    }

    pub fn from_unix(unix_s: f64) -> Self {
        Self::from_gps_seconds(
            unix_s - GPS_TO_UNIX_OFFSET + LEAP_SECONDS_SINCE_2017,
        )
    }

    /// Seconds elapsed since the GPS epoch (1980-01-06)
    pub fn from_gps_seconds(total: f64) -> Self {
        let week = (total / SECONDS_PER_WEEK).floor().max(0.);
        Self {
            week: week as u32,
            seconds: total - week * SECONDS_PER_WEEK,
        }
    }

    pub fn gps_seconds(&self) -> f64 {
        self.week as f64 * SECONDS_PER_WEEK + self.seconds
    }

    pub fn to_unix(&self) -> f64 {
        self.gps_seconds() + GPS_TO_UNIX_OFFSET - LEAP_SECONDS_SINCE_2017
    }

    /// The integer second used as a key to synchronise epochs across stations
    pub fn absolute_second(&self) -> i64 {
        self.week as i64 * SECONDS_PER_WEEK as i64
            + (self.seconds + 0.5).floor() as i64
    }

    /// Resolve a time of week (no week number on the wire) to the week
    /// which brings it closest to the reference.
    pub fn resolve_tow(reference: GpsTime, tow: f64) -> Self {
        let ref_s = reference.gps_seconds();
        let week_start = reference.week as f64 * SECONDS_PER_WEEK;
        let mut candidate = week_start + tow;
        if candidate - ref_s > SECONDS_PER_WEEK / 2. {
            candidate -= SECONDS_PER_WEEK;
        } else if ref_s - candidate > SECONDS_PER_WEEK / 2. {
            candidate += SECONDS_PER_WEEK;
        }
        Self::from_gps_seconds(candidate)
    }

    /// Resolve a GLONASS time of day (Moscow time) to a GPS time, choosing
    /// the day which brings it closest to the reference.
    pub fn resolve_glonass_tod(reference: GpsTime, tod: f64) -> Self {
        let ref_s = reference.gps_seconds();
        let gps_tod = (tod - GLONASS_TO_UTC + LEAP_SECONDS_SINCE_2017)
            .rem_euclid(SECONDS_PER_DAY);
        let day_start = (ref_s / SECONDS_PER_DAY).floor() * SECONDS_PER_DAY;
        let mut candidate = day_start + gps_tod;
        if candidate - ref_s > SECONDS_PER_DAY / 2. {
            candidate -= SECONDS_PER_DAY;
        } else if ref_s - candidate > SECONDS_PER_DAY / 2. {
            candidate += SECONDS_PER_DAY;
        }
        Self::from_gps_seconds(candidate)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        let unix = self.to_unix();
        DateTime::from_timestamp(
            unix.floor() as i64,
            (unix.fract() * 1e9) as u32,
        )
        .unwrap_or_default()
    }
}

impl fmt::Display for GpsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4} {:14.7}", self.week, self.seconds)
    }
}
