use crate::caster::{Batch, Ingest};
use crate::config::{Config, HealthConfig, MountpointConfig};
use crate::health::{HealthEvent, HealthMonitor, LatencyStats};
use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use rand::Rng;
use rsgnss::decode::passthrough::RawArchive;
use rsgnss::prelude::*;
use rsgnss::source::ntrip::gga_sentence;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(256);
const MAX_JITTER_MS: u64 = 500;

/// Observations further away (in seconds) from the current time are dropped
pub const MAX_EPOCH_OFFSET: i64 = 600;

/// Delay before the next connection attempt, `Duration::ZERO` after a
/// successful connection
pub fn next_reconnect_delay(current: Duration) -> Duration {
    if current.is_zero() {
        INITIAL_RECONNECT_DELAY
    } else {
        (current * 2).min(MAX_RECONNECT_DELAY)
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Streaming,
    /// Waiting before the next connection attempt
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    WrongEpoch,
    Old,
    Duplicate,
}

/// Drops observations with an implausible epoch, and those of a satellite
/// not newer than the last one accepted
#[derive(Debug, Default)]
pub struct EpochFilter {
    last: HashMap<SatelliteId, i64>,
}

impl EpochFilter {
    pub fn check(
        &mut self,
        record: &ObservationRecord,
        now: &GpsTime,
    ) -> Result<(), Rejection> {
        let t = record.time.absolute_second();
        if (now.absolute_second() - t).abs() > MAX_EPOCH_OFFSET {
            return Err(Rejection::WrongEpoch);
        }
        match self.last.get(&record.satellite_id()) {
            Some(&last) if t < last => Err(Rejection::Old),
            Some(&last) if t == last => Err(Rejection::Duplicate),
            _ => {
                self.last.insert(record.satellite_id(), t);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mountpoint: Mountpoint,
    pub version: NtripVersion,
    /// Sent as a `$GPGGA` sentence
    pub position: Option<(f64, f64)>,
    pub read_timeout: Duration,
    /// Raw bytes go to the caster as well
    pub forward_raw: bool,
    /// Message types, station descriptions and latency are logged
    pub log_aux: bool,
    /// Daily raw files, for streams which are not decoded
    pub raw_dir: Option<PathBuf>,
    pub health: HealthConfig,
}

impl SessionConfig {
    pub fn new(
        mountpoint: &MountpointConfig,
        config: &Config,
    ) -> Result<Self, TransportError> {
        let parsed = mountpoint.mountpoint()?;
        let selected = config.is_misc_mount(parsed.station());
        let passthrough =
            Format::from_tag(&mountpoint.format) == Ok(Format::Passthrough);
        Ok(Self {
            version: mountpoint.ntrip_version,
            position: mountpoint.position(),
            read_timeout: Duration::from_secs(config.read_timeout),
            forward_raw: selected && config.misc_port.is_some(),
            log_aux: selected,
            raw_dir: config.raw_dir.clone().filter(|_| passthrough),
            health: config.health.clone(),
            mountpoint: parsed,
        })
    }
}

enum Exit {
    Cancelled,
    Reconnect,
}

/**
 * One upstream stream, from connection to batches of observations.
 *
 * The session owns its decoder and health counters: nothing here is shared
 * with other tasks. Observations only leave through the channel to the
 * caster.
 */
pub struct StreamSession {
    station: String,
    config: SessionConfig,
    state: SessionState,
    decoder: Box<dyn Decoder>,
    health: HealthMonitor,
    latency: LatencyStats,
    filter: EpochFilter,
    archive: Option<RawArchive>,
    notifier: Notifier,
    tx: mpsc::Sender<Ingest>,
}

impl StreamSession {
    pub fn new(
        config: SessionConfig,
        decoder: Box<dyn Decoder>,
        tx: mpsc::Sender<Ingest>,
        notifier: Notifier,
    ) -> Self {
        let station = config.mountpoint.station().to_string();
        // latency is only reported for the stations selected by misc_mount
        let interval = if config.log_aux {
            config.health.latency_interval
        } else {
            0
        };
        let archive = config
            .raw_dir
            .clone()
            .map(|dir| RawArchive::new(&station, dir));
        Self {
            health: HealthMonitor::new(&station, &config.health, Utc::now()),
            latency: LatencyStats::new(interval),
            archive,
            station,
            config,
            state: SessionState::Disconnected,
            decoder,
            filter: EpochFilter::default(),
            notifier,
            tx,
        }
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        if state != self.state {
            debug!("{}: {:?} -> {:?}", self.station, self.state, state);
            self.state = state;
        }
    }

    fn emit(&self, events: Vec<HealthEvent>) {
        for event in events {
            warn!("{}", event);
            self.notifier.notify(&event);
        }
    }

    fn log_aux(&self, aux: &AuxMeta) {
        for message_type in &aux.message_types {
            info!("{}: Received message type {}", self.station, message_type);
        }
        for descriptor in &aux.antenna_descriptors {
            info!("{}: Antenna descriptor {}", self.station, descriptor);
        }
        for position in &aux.antenna_positions {
            info!("{}: {}", self.station, position);
        }
    }

    /// Decode a chunk of bytes. Whatever passes the epoch checks makes the
    /// batch for the caster.
    pub fn process(
        &mut self,
        bytes: &[u8],
        now: GpsTime,
        wall: DateTime<Utc>,
    ) -> Option<Batch> {
        let mut outcome = self.decoder.decode(bytes, now);
        for e in &outcome.errors {
            debug!("{}: {}", self.station, e);
        }
        let events = self.health.check_outage(outcome.is_success(), wall);
        self.emit(events);
        if self.config.log_aux {
            self.log_aux(&outcome.aux);
        }
        for eph in outcome.ephemerides() {
            debug!(
                "{}: ephemeris {} version {}",
                self.station, eph.satellite, eph.version
            );
        }

        let records = outcome.take_observations();
        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            if let Some(report) =
                self.latency.update(&self.station, &record.time, &now)
            {
                info!("{}", report);
            }
            match self.filter.check(&record, &now) {
                Ok(()) => accepted.push(record),
                Err(Rejection::WrongEpoch) => {
                    debug!("{}: Wrong observation epoch(s)", self.station)
                }
                Err(Rejection::Old) => {
                    debug!("{}: old observation {}", self.station, record.prn())
                }
                Err(Rejection::Duplicate) => debug!(
                    "{}: observation coming more than once {}",
                    self.station,
                    record.prn()
                ),
            }
        }
        (!accepted.is_empty()).then(|| Batch {
            station: self.station.clone(),
            records: accepted,
        })
    }

    async fn send(&self, input: Ingest, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            sent = self.tx.send(input) => match sent {
                Ok(()) => true,
                Err(_) => {
                    error!("{}: caster is gone", self.station);
                    false
                }
            }
        }
    }

    async fn stream(
        &mut self,
        stream: &mut NtripStream,
        cancel: &CancellationToken,
    ) -> Exit {
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Exit::Cancelled,
                read = stream.read_chunk(self.config.read_timeout) => read,
            };
            let bytes = match read {
                Ok(bytes) => bytes,
                Err(TransportError::Timeout(_))
                    if !self.config.health.reconnect_on_timeout =>
                {
                    debug!("{}: no data", self.station);
                    let events = self.health.check_outage(false, Utc::now());
                    self.emit(events);
                    continue;
                }
                Err(TransportError::Timeout(_)) => {
                    warn!("{}: Data timeout, reconnecting", self.station);
                    return Exit::Reconnect;
                }
                Err(e) => {
                    warn!("{}: {}, reconnecting", self.station, e);
                    return Exit::Reconnect;
                }
            };

            if let Some(archive) = self.archive.as_mut() {
                let today = Utc::now().date_naive();
                if let Err(e) = archive.write(&bytes, today).await {
                    error!("{}: cannot write raw data: {}", self.station, e);
                }
            }
            if self.config.forward_raw {
                let raw = Ingest::Raw {
                    station: self.station.clone(),
                    bytes: bytes.clone(),
                };
                if !self.send(raw, cancel).await {
                    return Exit::Cancelled;
                }
            }
            if let Some(batch) =
                self.process(&bytes, GpsTime::now(), Utc::now())
            {
                if !self.send(Ingest::Observations(batch), cancel).await {
                    return Exit::Cancelled;
                }
            }
        }
    }

    /// Runs until cancelled: every failure leads to a new connection, after
    /// an increasing delay.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "{}: {} stream from {}",
            self.station,
            self.decoder.format(),
            self.config.mountpoint
        );
        let mut delay = Duration::ZERO;
        let mut first = true;
        loop {
            if !first {
                self.set_state(SessionState::Paused);
                let pause = delay + jitter();
                debug!("{}: next attempt in {:?}", self.station, pause);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
                let events = self.health.check_reconnect(Utc::now());
                self.emit(events);
            }
            first = false;

            self.set_state(SessionState::Connecting);
            let gga = self
                .config
                .position
                .map(|(lat, lon)| gga_sentence(lat, lon, Utc::now().time()));
            let connect = NtripStream::connect(
                &self.config.mountpoint,
                self.config.version,
                gga.as_deref(),
                self.config.read_timeout,
            );
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                connected = connect => connected,
            };
            let mut stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("{}: {}", self.station, e);
                    self.set_state(SessionState::Disconnected);
                    delay = next_reconnect_delay(delay);
                    continue;
                }
            };

            delay = Duration::ZERO;
            self.decoder.reset();
            self.set_state(SessionState::Streaming);
            match self.stream(&mut stream, &cancel).await {
                Exit::Cancelled => break,
                Exit::Reconnect => {
                    self.set_state(SessionState::Disconnected);
                    delay = next_reconnect_delay(delay);
                }
            }
        }
        self.set_state(SessionState::Disconnected);
        info!("{}: session stopped", self.station);
    }
}
