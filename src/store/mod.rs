mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{extended_day, free_slots, round_for_display};
pub use error::StoreError;

use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// Events of one mutation. Written whole or not at all.
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Stats {
        response: oneshot::Sender<WalStats>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalStats {
    pub appends_since_compact: u64,
    /// Group commits (fsyncs) since the store was opened.
    pub syncs: u64,
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the log and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued,
/// then flushes and fsyncs the whole batch once.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (events, response) = match cmd {
            WalCommand::Append { events, response } => (events, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(events, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        let event_count: usize = batch.iter().map(|(events, _)| events.len()).sum();
        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(event_count as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

/// Write and fsync the batch. On any failure the log is cut back to where
/// the batch began, so no caller told "failed" sees its event replayed.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mark = wal.mark()?;
    let result = batch
        .iter()
        .flat_map(|(events, _)| events)
        .try_for_each(|event| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        tracing::error!("WAL batch failed, rolling back: {e}");
        if let Err(rollback_err) = wal.rollback(mark) {
            tracing::error!("WAL rollback failed: {rollback_err}");
        }
    }
    result
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::Stats { response } => {
            let _ = response.send(WalStats {
                appends_since_compact: wal.appends_since_compact(),
                syncs: wal.syncs(),
            });
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── In-memory index ──────────────────────────────────────

/// All live bookings, sorted by start.
#[derive(Debug)]
pub struct BookingIndex {
    bookings: Vec<Booking>,
    next_id: BookingId,
}

impl BookingIndex {
    fn new() -> Self {
        Self {
            bookings: Vec::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn next_id(&self) -> BookingId {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter()
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    fn insert(&mut self, booking: Booking) {
        self.next_id = self.next_id.max(booking.id + 1);
        let pos = self.bookings.partition_point(|b| b.start() <= booking.start());
        self.bookings.insert(pos, booking);
    }

    fn remove(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    /// Bookings whose raw interval intersects `query`.
    /// Everything at index >= the partition point starts at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start() < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end() > query.start)
    }
}

/// Apply an event to the index (no locking; caller holds the write lock).
fn apply_to_index(index: &mut BookingIndex, event: &Event) {
    match event {
        Event::Sequence { next_id } => {
            index.next_id = index.next_id.max(*next_id);
        }
        Event::BookingCreated { booking } => index.insert(booking.clone()),
        Event::BookingCancelled { id } | Event::BookingExpired { id } => {
            index.remove(*id);
        }
        Event::ReminderSent { id, kind } => {
            if let Some(b) = index.get_mut(*id) {
                match kind {
                    ReminderKind::Start => b.start_reminded = true,
                    ReminderKind::End => b.end_notified = true,
                }
            }
        }
    }
}

/// The single owner of booking state. Reads share the lock; every mutation
/// takes the write lock, so check-then-insert is atomic.
pub struct Store {
    state: RwLock<BookingIndex>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Store {
    /// Replay the log at `wal_path` and start its writer task. Needs a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut index = BookingIndex::new();
        for event in &events {
            apply_to_index(&mut index, event);
        }
        tracing::info!(
            bookings = index.len(),
            events = events.len(),
            "booking log replayed from {}",
            wal_path.display()
        );

        Ok(Self {
            state: RwLock::new(index),
            wal_tx,
        })
    }

    async fn wal_append(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// Log first, then apply. A failed append leaves memory untouched.
    pub(super) async fn persist_and_apply(
        &self,
        index: &mut BookingIndex,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.persist_and_apply_all(index, vec![event.clone()]).await
    }

    /// Like `persist_and_apply` for several events sharing one group commit.
    pub(super) async fn persist_and_apply_all(
        &self,
        index: &mut BookingIndex,
        events: Vec<Event>,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        self.wal_append(events.clone()).await?;
        for event in &events {
            apply_to_index(index, event);
        }
        Ok(())
    }
}
