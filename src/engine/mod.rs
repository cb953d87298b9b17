mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::authz::{Action, Authorizer};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
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
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking service: room registry, per-room interval stores, the
/// authorization gate and the event outbox, behind one handle.
pub struct Engine {
    pub state: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) authz: Arc<Authorizer>,
    /// Serializes room creation so duplicate-id and room-limit checks
    /// cannot race.
    pub(super) create_lock: Mutex<()>,
    /// Orders appends against compaction: every mutation holds the read
    /// side while it appends; compaction holds the write side across
    /// snapshot + rewrite enqueue. An acknowledged append is therefore
    /// either inside the snapshot or queued behind the rewrite command.
    pub(super) compact_gate: RwLock<()>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the lock).
/// Booking insertion and the status transition happen together so readers
/// never observe a half-applied mutation.
fn apply_to_room(rs: &mut RoomState, event: &Event) {
    match event {
        Event::RoomBooked {
            booking_id,
            span,
            booked_by,
            ..
        } => {
            rs.insert_booking(Booking {
                id: *booking_id,
                span: *span,
                booked_by: booked_by.clone(),
            });
            rs.status = RoomStatus::Booked;
        }
        Event::RoomFreed { .. } => {
            rs.clear_bookings();
            rs.status = RoomStatus::Free;
        }
        Event::RoomLocked { .. } => {
            rs.status = RoomStatus::Locked;
        }
        Event::RoomUnlocked { .. } => {
            rs.status = RoomStatus::Free;
        }
        // RoomAdded is handled at the DashMap level, not here
        Event::RoomAdded { .. } => {}
    }
}

/// Structured audit record for every committed event.
pub(super) fn audit(event: &Event) {
    if let Ok(payload) = serde_json::to_string(event) {
        tracing::info!(target: "bookd::audit", event = event.name(), %payload);
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        authz: Arc<Authorizer>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            authz,
            create_lock: Mutex::new(()),
            compact_gate: RwLock::new(()),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (lazy tenant creation).
        for event in &events {
            match event {
                Event::RoomAdded { id, capacity } => {
                    let rs = RoomState::new(*id, *capacity);
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                other => {
                    if let Some(entry) = engine.state.get(&other.room_id()) {
                        let rs_arc = entry.clone();
                        if let Ok(mut guard) = rs_arc.try_write() {
                            apply_to_room(&mut guard, other);
                        }
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// Reject-before-mutate: every mutating operation calls this first.
    pub(super) fn authorize(&self, caller: &str, action: Action) -> Result<(), EngineError> {
        if self.authz.is_allowed(caller, action) {
            Ok(())
        } else {
            metrics::counter!(crate::observability::FORBIDDEN_TOTAL).increment(1);
            tracing::warn!(caller, action = action.as_str(), "rejected unauthorized mutation");
            Err(EngineError::Forbidden(caller.to_string()))
        }
    }

    /// WAL-append + apply + notify in one call, under the caller's room lock.
    /// A WAL failure aborts before any in-memory change.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event);
        audit(event);
        self.notify.send(room_id, event);
        Ok(())
    }
}
