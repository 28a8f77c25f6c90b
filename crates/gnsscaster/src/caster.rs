use crate::config::Config;
use bytes::{BufMut, Bytes, BytesMut};
use rsgnss::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SECONDS_PER_WEEK: i64 = 604_800;

/// Binary frames: one `A` before the records of an epoch, one `B` before
/// each record and one `C` after the last record.
pub const BEGIN_EPOCH: u8 = b'A';
pub const BEGIN_OBS: u8 = b'B';
pub const END_EPOCH: u8 = b'C';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("subscriber {0} is lagging behind")]
    Full(String),

    #[error("subscriber {0} is gone")]
    Closed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// Text blocks, one per second, after the wait time
    Text,
    /// Binary frames, one per second, after the wait time
    Binary,
    /// Text lines, as soon as the records arrive
    Unsync,
    /// Raw bytes of the selected stream
    Raw,
    /// One JSON object per record, after the wait time
    Json,
}

impl fmt::Display for SubscriberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Unsync => "unsynchronized",
            Self::Raw => "raw",
            Self::Json => "json",
        };
        write!(f, "{name}")
    }
}

/// Records decoded by a session in one go
#[derive(Debug, Clone)]
pub struct Batch {
    pub station: String,
    pub records: Vec<ObservationRecord>,
}

/// What sessions send to the caster task
#[derive(Debug)]
pub enum Ingest {
    Observations(Batch),
    Raw { station: String, bytes: Bytes },
}

#[derive(Debug)]
pub struct Subscriber {
    pub id: String,
    pub kind: SubscriberKind,
    tx: mpsc::Sender<Bytes>,
}

impl Subscriber {
    /// Never waits: a full queue is an error
    pub fn push(&self, bytes: Bytes) -> Result<(), CapacityError> {
        self.tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => CapacityError::Full(self.id.clone()),
            TrySendError::Closed(_) => CapacityError::Closed(self.id.clone()),
        })
    }
}

#[derive(Debug, Default)]
pub struct SubscriberSet {
    subscribers: Vec<Subscriber>,
}

impl SubscriberSet {
    pub fn add(
        &mut self,
        kind: SubscriberKind,
        queue: usize,
    ) -> (String, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let id = Uuid::new_v4().to_string();
        self.subscribers.push(Subscriber {
            id: id.clone(),
            kind,
            tx,
        });
        (id, rx)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn has(&self, kind: SubscriberKind) -> bool {
        self.subscribers.iter().any(|s| s.kind == kind)
    }

    /// Writers see their queue closed once they have sent what is left
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }

    /// Push to every subscriber of this kind. Those which fail are removed
    /// and returned, the others are not affected.
    pub fn broadcast(
        &mut self,
        kind: SubscriberKind,
        bytes: &Bytes,
    ) -> Vec<CapacityError> {
        let mut evicted = Vec::new();
        self.subscribers.retain(|subscriber| {
            if subscriber.kind != kind {
                return true;
            }
            match subscriber.push(bytes.clone()) {
                Ok(()) => true,
                Err(e) => {
                    evicted.push(e);
                    false
                }
            }
        });
        for e in &evicted {
            warn!("{kind} output: {e}, removed");
        }
        evicted
    }
}

/// All records of one second, ready to be sent out
#[derive(Debug, Clone, PartialEq)]
pub struct Flushed {
    pub second: i64,
    pub records: Vec<ObservationRecord>,
}

impl Flushed {
    /// One line per record, then an empty line
    pub fn to_text(&self) -> Bytes {
        let mut text = String::new();
        for record in &self.records {
            text.push_str(&record.to_string());
            text.push('\n');
        }
        text.push('\n');
        Bytes::from(text)
    }

    pub fn to_binary(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            2 + self.records.len() * (1 + ObservationRecord::BINARY_LEN),
        );
        buf.put_u8(BEGIN_EPOCH);
        for record in &self.records {
            buf.put_u8(BEGIN_OBS);
            buf.put_slice(&record.to_bytes());
        }
        buf.put_u8(END_EPOCH);
        buf.freeze()
    }

    pub fn to_json(&self) -> Bytes {
        let mut lines = String::new();
        for record in &self.records {
            if let Ok(json) = serde_json::to_string(record) {
                lines.push_str(&json);
                lines.push('\n');
            }
        }
        Bytes::from(lines)
    }
}

/**
 * The epoch buffer, with everything that must be changed together.
 *
 * Records are kept by absolute GPS second. When a record arrives for
 * second `t`, every second up to `t - wait_time` is sent out, in order,
 * and never again: later records for those seconds are thrown away.
 */
#[derive(Debug)]
pub struct CasterState {
    wait_time: i64,
    sampling: i64,
    last_dump: Option<i64>,
    epochs: BTreeMap<i64, Vec<ObservationRecord>>,
    pub subscribers: SubscriberSet,
    /// Tasks writing to sockets and files
    writers: Vec<JoinHandle<()>>,
    /// Running sessions, by mountpoint url
    sessions: BTreeMap<String, CancellationToken>,
}

impl CasterState {
    pub fn new(wait_time: u64, sampling: u64) -> Self {
        Self {
            wait_time: wait_time.max(1) as i64,
            sampling: sampling as i64,
            last_dump: None,
            epochs: BTreeMap::new(),
            subscribers: SubscriberSet::default(),
            writers: Vec::new(),
            sessions: BTreeMap::new(),
        }
    }

    /// Last second sent out
    pub fn last_dump(&self) -> Option<i64> {
        self.last_dump
    }

    /// Number of seconds waiting in the buffer
    pub fn buffered(&self) -> usize {
        self.epochs.len()
    }

    pub fn submit(
        &mut self,
        station: &str,
        is_first: bool,
        mut record: ObservationRecord,
    ) -> Vec<Flushed> {
        let t = record.time.absolute_second();
        let last_dump = *self.last_dump.get_or_insert(t - 1);
        if t <= last_dump {
            if is_first {
                info!(
                    "Station {}: old epoch {} thrown away",
                    station,
                    t.rem_euclid(SECONDS_PER_WEEK)
                );
            }
            return Vec::new();
        }
        record.set_station(station);

        if self.subscribers.has(SubscriberKind::Unsync) {
            let line = Bytes::from(format!("{record}\n"));
            self.subscribers.broadcast(SubscriberKind::Unsync, &line);
        }
        self.epochs.entry(t).or_default().push(record);

        let limit = t - self.wait_time;
        if limit <= last_dump {
            return Vec::new();
        }
        let flushed = self.drain_until(limit);
        self.last_dump = Some(limit);
        self.dispatch(&flushed);
        flushed
    }

    /// Seconds up to `limit` leave the buffer; only those on the sampling
    /// stride are returned.
    fn drain_until(&mut self, limit: i64) -> Vec<Flushed> {
        let rest = self.epochs.split_off(&(limit + 1));
        let ready = std::mem::replace(&mut self.epochs, rest);
        ready
            .into_iter()
            .filter(|(second, _)| {
                self.sampling == 0
                    || second.rem_euclid(SECONDS_PER_WEEK) % self.sampling == 0
            })
            .map(|(second, records)| Flushed { second, records })
            .collect()
    }

    /// Send out everything, without waiting for late records
    pub fn flush_all(&mut self) -> Vec<Flushed> {
        let Some(&limit) = self.epochs.keys().next_back() else {
            return Vec::new();
        };
        let flushed = self.drain_until(limit);
        self.last_dump = Some(limit);
        self.dispatch(&flushed);
        flushed
    }

    fn dispatch(&mut self, flushed: &[Flushed]) {
        for epoch in flushed {
            if self.subscribers.has(SubscriberKind::Text) {
                self.subscribers
                    .broadcast(SubscriberKind::Text, &epoch.to_text());
            }
            if self.subscribers.has(SubscriberKind::Binary) {
                self.subscribers
                    .broadcast(SubscriberKind::Binary, &epoch.to_binary());
            }
            if self.subscribers.has(SubscriberKind::Json) {
                self.subscribers
                    .broadcast(SubscriberKind::Json, &epoch.to_json());
            }
        }
    }
}

/// Shared handle on the caster
#[derive(Debug, Clone)]
pub struct Caster {
    state: Arc<Mutex<CasterState>>,
    queue: usize,
    write_timeout: Duration,
}

impl Caster {
    pub fn new(config: &Config) -> Self {
        Self {
            state: Arc::new(Mutex::new(CasterState::new(
                config.wait_time,
                config.sampling,
            ))),
            queue: config.subscriber_queue,
            write_timeout: Duration::from_millis(config.subscriber_timeout_ms),
        }
    }

    pub async fn submit_batch(&self, batch: Batch) -> Vec<Flushed> {
        let mut state = self.state.lock().await;
        let mut flushed = Vec::new();
        for (i, record) in batch.records.into_iter().enumerate() {
            flushed.extend(state.submit(&batch.station, i == 0, record));
        }
        flushed
    }

    pub async fn raw_data(&self, bytes: Bytes) {
        let mut state = self.state.lock().await;
        if state.subscribers.has(SubscriberKind::Raw) {
            state.subscribers.broadcast(SubscriberKind::Raw, &bytes);
        }
    }

    pub async fn subscribe(
        &self,
        kind: SubscriberKind,
    ) -> (String, mpsc::Receiver<Bytes>) {
        self.state.lock().await.subscribers.add(kind, self.queue)
    }

    pub async fn subscribers(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    /// Add a subscriber and spawn the task feeding its writer
    pub async fn attach<W>(
        &self,
        kind: SubscriberKind,
        writer: W,
        name: String,
    ) -> String
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (id, rx) = self.subscribe(kind).await;
        let handle =
            tokio::spawn(write_loop(name, writer, rx, self.write_timeout));
        let mut state = self.state.lock().await;
        state.writers.retain(|h| !h.is_finished());
        state.writers.push(handle);
        id
    }

    /// Returns false if a session already runs for this url
    pub async fn register(&self, url: &str, token: CancellationToken) -> bool {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(url) {
            return false;
        }
        state.sessions.insert(url.to_string(), token);
        true
    }

    /// The session is cancelled
    pub async fn unregister(&self, url: &str) -> bool {
        match self.state.lock().await.sessions.remove(url) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn sessions(&self) -> Vec<String> {
        self.state.lock().await.sessions.keys().cloned().collect()
    }

    /// Send out what is left, close every subscriber and give the writers
    /// `timeout` to finish. Stuck writers are left behind.
    pub async fn shutdown(&self, timeout: Duration) -> Vec<Flushed> {
        let (flushed, writers) = {
            let mut state = self.state.lock().await;
            let flushed = state.flush_all();
            state.subscribers.clear();
            (flushed, std::mem::take(&mut state.writers))
        };
        let pending = writers.len();
        let join = async {
            for writer in writers {
                let _ = writer.await;
            }
        };
        if tokio::time::timeout(timeout, join).await.is_err() {
            warn!("{} outputs not done after {:?}", pending, timeout);
        }
        flushed
    }
}

/// The caster task: drains the channel until all sessions are gone
pub async fn run(caster: Caster, mut rx: mpsc::Receiver<Ingest>) {
    while let Some(input) = rx.recv().await {
        match input {
            Ingest::Observations(batch) => {
                let flushed = caster.submit_batch(batch).await;
                if let Some(last) = flushed.last() {
                    debug!(
                        "epoch {} sent ({} records)",
                        last.second.rem_euclid(SECONDS_PER_WEEK),
                        last.records.len()
                    );
                }
            }
            Ingest::Raw { station, bytes } => {
                debug!("{}: {} raw bytes", station, bytes.len());
                caster.raw_data(bytes).await;
            }
        }
    }
    debug!("caster task stopped");
}

/// Accept subscribers on a port until cancelled
pub async fn serve(
    listener: TcpListener,
    caster: Caster,
    kind: SubscriberKind,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((socket, address)) => {
                info!("new {} subscriber: {}", kind, address);
                if let Err(e) = socket.set_nodelay(true) {
                    debug!("{}: {}", address, e);
                }
                caster.attach(kind, socket, address.to_string()).await;
            }
            Err(e) => warn!("{} port: {}", kind, e),
        }
    }
}

async fn write_loop<W>(
    name: String,
    mut writer: W,
    mut rx: mpsc::Receiver<Bytes>,
    timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = rx.recv().await {
        let write = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                info!("{}: {}, disconnected", name, e);
                break;
            }
            Err(_) => {
                warn!("{}: write timed out after {:?}, disconnected", name, timeout);
                break;
            }
        }
    }
}
