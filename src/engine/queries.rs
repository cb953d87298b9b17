use ulid::Ulid;

use crate::model::*;

use super::conflict::validate_interval;
use super::{Engine, EngineError};

impl Engine {
    /// The coarse status flag. Unknown room is a distinct error, not FREE.
    pub async fn room_status(&self, room_id: Ulid) -> Result<RoomStatus, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.status)
    }

    /// Precise availability for `[start, end)`: recomputed over the stored
    /// intervals every time, independent of the coarse status. A BOOKED room
    /// still reports true for a disjoint window; a LOCKED room reports its
    /// interval-level availability unchanged. An inverted interval is
    /// rejected, not treated as unavailable.
    pub async fn is_room_available(
        &self,
        room_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<bool, EngineError> {
        let span = validate_interval(start, end)?;
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.overlapping(&span).next().is_none())
    }

    pub async fn room_info(&self, room_id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(RoomInfo {
            id: guard.id,
            capacity: guard.capacity,
            status: guard.status,
        })
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = Vec::with_capacity(self.state.len());
        let handles: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for rs in handles {
            let guard = rs.read().await;
            rooms.push(RoomInfo {
                id: guard.id,
                capacity: guard.capacity,
                status: guard.status,
            });
        }
        rooms
    }

    pub async fn room_bookings(&self, room_id: Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo {
                id: b.id,
                room_id,
                start: b.span.start,
                end: b.span.end,
                booked_by: b.booked_by.clone(),
            })
            .collect())
    }
}
