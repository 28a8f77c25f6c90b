use crate::config::HealthConfig;
use chrono::{DateTime, Duration, Utc};
use rsgnss::prelude::GpsTime;
use std::fmt;

/// First pause (in seconds) between inspections of a corrupted stream
pub const INITIAL_PAUSE: i64 = 30;
pub const MAX_PAUSE: i64 = 960;

pub fn next_pause(current: i64) -> i64 {
    (current * 2).clamp(INITIAL_PAUSE, MAX_PAUSE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEventKind {
    BeginOutage,
    EndOutage,
    BeginCorrupted,
    EndCorrupted,
}

impl fmt::Display for HealthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeginOutage => "Begin_Outage",
            Self::EndOutage => "End_Outage",
            Self::BeginCorrupted => "Begin_Corrupted",
            Self::EndCorrupted => "End_Corrupted",
        };
        write!(f, "{name}")
    }
}

/// A threshold crossed by one stream
#[derive(Debug, Clone, PartialEq)]
pub struct HealthEvent {
    pub kind: HealthEventKind,
    pub station: String,
    pub begin: DateTime<Utc>,
    /// Only for the end of a condition
    pub end: Option<DateTime<Utc>>,
}

fn stamp(t: &DateTime<Utc>) -> String {
    t.format("%y-%m-%d %H:%M:%S").to_string()
}

impl HealthEvent {
    /// e.g. `End_Outage 24-01-05 10:15:00 Begin was 24-01-05 09:40:12`
    pub fn comment(&self) -> String {
        match &self.end {
            None => format!("{} {}", self.kind, stamp(&self.begin)),
            Some(end) => format!(
                "{} {} Begin was {}",
                self.kind,
                stamp(end),
                stamp(&self.begin)
            ),
        }
    }
}

impl fmt::Display for HealthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.end.as_ref().map(stamp).unwrap_or_default();
        match self.kind {
            HealthEventKind::BeginOutage => write!(
                f,
                "{}: Failure threshold exceeded, outage since {}",
                self.station,
                stamp(&self.begin)
            ),
            HealthEventKind::EndOutage => write!(
                f,
                "{}: Recovery threshold exceeded, outage ended {}",
                self.station, end
            ),
            HealthEventKind::BeginCorrupted => write!(
                f,
                "{}: Failure threshold exceeded, corrupted since {}",
                self.station,
                stamp(&self.begin)
            ),
            HealthEventKind::EndCorrupted => write!(
                f,
                "{}: Recovery threshold exceeded, corruption ended {}",
                self.station, end
            ),
        }
    }
}

/**
 * Outage and corruption detection for one stream.
 *
 * Decoding results are accumulated over inspection windows. A window
 * without a single decoded message counts as failed seconds, a window with
 * at least one counts as good seconds. While a stream stays corrupted, the
 * inspections are spaced out by a pause doubling up to [`MAX_PAUSE`]; the
 * skipped seconds are still counted as failed.
 *
 * Outages are about the connection: they begin when reconnection attempts
 * keep failing for longer than the failure threshold and end when data has
 * been decoded for longer than the recovery threshold since the last
 * reconnection.
 *
 * Every begin event is followed by at most one end event, and the other
 * way round.
 */
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    station: String,
    /// All durations in seconds
    window: i64,
    failure: i64,
    recovery: i64,
    make_pause: bool,

    num_succ: u32,
    sec_succ: i64,
    sec_fail: i64,
    curr_pause: i64,
    pause_started: Option<DateTime<Utc>>,
    check_time: DateTime<Utc>,
    /// Last inspection window with decoded data
    last_success: DateTime<Utc>,
    /// Last message decoded
    last_decode: DateTime<Utc>,
    /// Begin of the ongoing corruption
    corrupted: Option<DateTime<Utc>>,
    /// Begin of the ongoing outage
    outage: Option<DateTime<Utc>>,
    /// First decoded message after the outage
    recovering_since: Option<DateTime<Utc>>,
}

impl HealthMonitor {
    pub fn new(station: &str, config: &HealthConfig, now: DateTime<Utc>) -> Self {
        Self {
            station: station.to_string(),
            window: config.inspection_window as i64,
            failure: config.failure_threshold as i64 * 60,
            recovery: config.recovery_threshold as i64 * 60,
            make_pause: config.make_pause,
            num_succ: 0,
            sec_succ: 0,
            sec_fail: 0,
            curr_pause: INITIAL_PAUSE,
            pause_started: None,
            check_time: now,
            last_success: now,
            last_decode: now,
            corrupted: None,
            outage: None,
            recovering_since: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.window > 0
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.is_some()
    }

    pub fn is_outage(&self) -> bool {
        self.outage.is_some()
    }

    fn event(
        &self,
        kind: HealthEventKind,
        begin: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> HealthEvent {
        HealthEvent {
            kind,
            station: self.station.clone(),
            begin,
            end,
        }
    }

    /// Called after every decode attempt on an open connection
    pub fn check_outage(
        &mut self,
        decoded: bool,
        now: DateTime<Utc>,
    ) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        if !self.is_enabled() {
            return events;
        }

        if decoded {
            self.num_succ += 1;
            self.last_decode = now;
            if self.outage.is_some() && self.recovering_since.is_none() {
                self.recovering_since = Some(now);
            }
        }

        let pause_over = match self.pause_started {
            None => true,
            Some(started) => (now - started).num_seconds() >= self.curr_pause,
        };
        if pause_over && (now - self.check_time).num_seconds() >= self.window {
            self.check_time = now;
            self.inspect(now, &mut events);
        }

        if let (Some(begin), Some(since)) = (self.outage, self.recovering_since)
        {
            if (now - since).num_seconds() > self.recovery {
                let end = now - Duration::seconds(self.recovery);
                events.push(self.event(
                    HealthEventKind::EndOutage,
                    begin,
                    Some(end),
                ));
                self.outage = None;
                self.recovering_since = None;
            }
        }
        events
    }

    fn inspect(&mut self, now: DateTime<Utc>, events: &mut Vec<HealthEvent>) {
        if self.num_succ > 0 {
            self.sec_succ = (self.sec_succ + self.window).min(self.recovery + 1);
            self.sec_fail = 0;
            self.last_success = now;
            self.num_succ = 0;
            self.curr_pause = INITIAL_PAUSE;
            self.pause_started = None;
        } else {
            self.sec_fail = (self.sec_fail + self.window).min(self.failure + 1);
            self.sec_succ = 0;
            if self.make_pause {
                match self.pause_started {
                    None => self.pause_started = Some(now),
                    Some(_) => {
                        // the paused seconds were failures too
                        self.pause_started = None;
                        self.sec_fail += self.curr_pause - self.window;
                        self.curr_pause = next_pause(self.curr_pause);
                    }
                }
            }
        }

        match self.corrupted {
            Some(begin) if self.sec_succ > self.recovery => {
                let end = now - Duration::seconds(self.recovery);
                events.push(self.event(
                    HealthEventKind::EndCorrupted,
                    begin,
                    Some(end),
                ));
                self.corrupted = None;
                self.sec_fail = 0;
            }
            None if self.sec_fail > self.failure => {
                events.push(self.event(
                    HealthEventKind::BeginCorrupted,
                    self.last_success,
                    None,
                ));
                self.corrupted = Some(self.last_success);
                self.sec_succ = 0;
                self.num_succ = 0;
            }
            _ => {}
        }
    }

    /// Called before every reconnection attempt
    pub fn check_reconnect(&mut self, now: DateTime<Utc>) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        if !self.is_enabled() {
            return events;
        }
        self.recovering_since = None;
        if self.outage.is_none()
            && (now - self.last_decode).num_seconds() > self.failure
        {
            events.push(self.event(
                HealthEventKind::BeginOutage,
                self.last_decode,
                None,
            ));
            self.outage = Some(self.last_decode);
        }
        events
    }
}

/// Limit of the latencies taken into account, in seconds
const MAX_LATENCY: f64 = 1000.;

/// Statistics over one reporting interval
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub rms: f64,
    pub epochs: u32,
    /// Only once the usual spacing between epochs is known
    pub gaps: Option<u32>,
}

fn centi(value: f64) -> f64 {
    (value * 100.).trunc() / 100.
}

/// Latencies of the observations of one stream, reported at every multiple
/// of the interval
#[derive(Debug, Clone)]
pub struct LatencyStats {
    interval: i64,
    old_sec: i64,
    follow: bool,
    count: u32,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    diff_sec: i64,
    mean_diff: f64,
    gaps: u32,
}

impl LatencyStats {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval as i64,
            old_sec: 0,
            follow: false,
            count: 0,
            sum: 0.,
            sum_sq: 0.,
            min: MAX_LATENCY,
            max: -MAX_LATENCY,
            diff_sec: 0,
            mean_diff: 0.,
            gaps: 0,
        }
    }

    pub fn summary(&self) -> Option<LatencySummary> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let variance = (self.sum_sq - self.sum * self.sum / n) / n;
        Some(LatencySummary {
            mean: self.sum / n,
            min: self.min,
            max: self.max,
            rms: variance.max(0.).sqrt(),
            epochs: self.count,
            gaps: (self.mean_diff > 0.).then_some(self.gaps),
        })
    }

    /// e.g. `WTZR0: Mean latency 1.23 sec, min 0.9, max 2.1, rms 0.12, 60 epochs, 2 gaps`
    pub fn report(&self, station: &str) -> Option<String> {
        let s = self.summary()?;
        let mut line = format!(
            "{}: Mean latency {} sec, min {}, max {}, rms {}, {} epochs",
            station,
            centi(s.mean),
            centi(s.min),
            centi(s.max),
            centi(s.rms),
            s.epochs
        );
        if let Some(gaps) = s.gaps {
            line.push_str(&format!(", {gaps} gaps"));
        }
        Some(line)
    }

    fn reset(&mut self) {
        self.mean_diff = if self.count > 0 {
            self.diff_sec as f64 / self.count as f64
        } else {
            0.
        };
        self.diff_sec = 0;
        self.gaps = 0;
        self.sum = 0.;
        self.sum_sq = 0.;
        self.count = 0;
        self.min = MAX_LATENCY;
        self.max = -MAX_LATENCY;
    }

    /// Account for one observation; returns the report of the previous
    /// interval when this observation starts a new one.
    pub fn update(
        &mut self,
        station: &str,
        observed: &GpsTime,
        now: &GpsTime,
    ) -> Option<String> {
        if self.interval == 0 {
            return None;
        }
        let new_sec = observed.seconds as i64;
        if new_sec == self.old_sec {
            return None;
        }

        let mut report = None;
        if new_sec % self.interval < self.old_sec % self.interval {
            report = self.report(station);
            self.reset();
        }
        if self.follow {
            let diff = new_sec - self.old_sec;
            self.diff_sec += diff;
            if self.mean_diff > 0. && diff as f64 > 1.5 * self.mean_diff {
                self.gaps += 1;
            }
        }

        let latency = now.gps_seconds() - observed.gps_seconds();
        self.sum += latency;
        self.sum_sq += latency * latency;
        self.min = self.min.min(latency);
        self.max = self.max.max(latency);
        self.count += 1;
        self.old_sec = new_sec;
        self.follow = true;
        report
    }
}
