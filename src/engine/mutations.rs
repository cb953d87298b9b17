use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::authz::Action;
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_interval};
use super::{audit, Engine, EngineError, WalCommand};

impl Engine {
    /// Create a room. Admin-gated; ids are unique for the lifetime of the
    /// service and capacity is fixed at creation. New rooms start FREE.
    pub async fn add_room(&self, caller: &str, id: Ulid, capacity: u32) -> Result<(), EngineError> {
        self.authorize(caller, Action::AddRoom)?;
        if capacity < 1 {
            return Err(EngineError::InvalidCapacity(capacity));
        }

        let _gate = self.compact_gate.read().await;
        // The duplicate check, the limit check and the insert must not race
        // with a concurrent add_room.
        let _create = self.create_lock.lock().await;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.state.len() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let event = Event::RoomAdded { id, capacity };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(RoomState::new(id, capacity))));
        audit(&event);
        self.notify.send(id, &event);
        Ok(())
    }

    /// Book `[start, end)` on a room. The caller becomes the booked_by
    /// identity. Sets status BOOKED at call time — the interval may lie
    /// entirely in the future.
    pub async fn book(
        &self,
        caller: &str,
        booking_id: Ulid,
        room_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<(), EngineError> {
        self.authorize(caller, Action::Book)?;
        if caller.len() > MAX_BOOKED_BY_LEN {
            return Err(EngineError::LimitExceeded("caller identity too long"));
        }
        let span = validate_interval(start, end)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let _gate = self.compact_gate.read().await;
        let mut guard = rs.write().await;
        if guard.status == RoomStatus::Locked {
            return Err(EngineError::Locked(room_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        check_no_conflict(&guard, &span)?;

        let event = Event::RoomBooked {
            booking_id,
            room_id,
            span,
            booked_by: caller.to_string(),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Clear all bookings and reset status to FREE. Also leaves LOCKED.
    pub async fn free(&self, caller: &str, room_id: Ulid) -> Result<(), EngineError> {
        self.authorize(caller, Action::Free)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let _gate = self.compact_gate.read().await;
        let mut guard = rs.write().await;

        let event = Event::RoomFreed { room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Administrative lock: blocks booking until unlocked. Idempotent —
    /// locking a locked room re-emits the event but changes nothing.
    pub async fn lock_room(&self, caller: &str, room_id: Ulid) -> Result<(), EngineError> {
        self.authorize(caller, Action::Lock)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let _gate = self.compact_gate.read().await;
        let mut guard = rs.write().await;

        let event = Event::RoomLocked { room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Leave the LOCKED state. Only valid on a locked room; bookings made
    /// before the lock survive it.
    pub async fn unlock_room(&self, caller: &str, room_id: Ulid) -> Result<(), EngineError> {
        self.authorize(caller, Action::Unlock)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let _gate = self.compact_gate.read().await;
        let mut guard = rs.write().await;
        if guard.status != RoomStatus::Locked {
            return Err(EngineError::NotLocked(room_id));
        }

        let event = Event::RoomUnlocked { room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        {
            // Write side of the compaction gate: no mutation can append while
            // the snapshot is built, and any append that starts after this
            // block is queued behind the Compact command, so it lands in the
            // rewritten log. An acknowledged append is never lost to the
            // rewrite.
            let _gate = self.compact_gate.write().await;
            let mut events = Vec::new();

            let room_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
            for id in room_ids {
                let Some(rs) = self.get_room(&id) else { continue };
                let guard = rs.read().await;

                events.push(Event::RoomAdded {
                    id: guard.id,
                    capacity: guard.capacity,
                });
                for booking in &guard.bookings {
                    events.push(Event::RoomBooked {
                        booking_id: booking.id,
                        room_id: guard.id,
                        span: booking.span,
                        booked_by: booking.booked_by.clone(),
                    });
                }
                // Replaying the bookings above leaves status BOOKED; append a
                // correcting event when the real status differs (locked room, or
                // unlocked-but-still-booked room that reads FREE).
                match guard.status {
                    RoomStatus::Locked => events.push(Event::RoomLocked { room_id: guard.id }),
                    RoomStatus::Free if !guard.bookings.is_empty() => {
                        events.push(Event::RoomUnlocked { room_id: guard.id });
                    }
                    _ => {}
                }
            }

            self.wal_tx
                .send(WalCommand::Compact { events, response: tx })
                .await
                .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        }
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
