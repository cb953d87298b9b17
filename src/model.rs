use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Half-open overlap: touching boundaries do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[allow(dead_code)]
    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Coarse per-room flag, distinct from fine-grained interval availability.
///
/// Transitions only via explicit operations: `book` sets Booked at call time
/// (never inferred from the wall clock), `free` resets to Free, and the
/// administrative lock/unlock pair enters and leaves Locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Free,
    Booked,
    Locked,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Free => "FREE",
            RoomStatus::Booked => "BOOKED",
            RoomStatus::Locked => "LOCKED",
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reservation on a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub span: Span,
    pub booked_by: String,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    /// Declared seat count, >= 1. Immutable after creation; carries no
    /// booking semantics — any interval overlap is a conflict.
    pub capacity: u32,
    pub status: RoomStatus,
    /// All bookings, sorted by `span.start`, pairwise non-overlapping.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, capacity: u32) -> Self {
        Self {
            id,
            capacity,
            status: RoomStatus::Free,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn clear_bookings(&mut self) {
        self.bookings.clear();
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format and
/// the notification payload. One event per successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        id: Ulid,
        capacity: u32,
    },
    RoomBooked {
        booking_id: Ulid,
        room_id: Ulid,
        span: Span,
        booked_by: String,
    },
    RoomFreed {
        room_id: Ulid,
    },
    RoomLocked {
        room_id: Ulid,
    },
    RoomUnlocked {
        room_id: Ulid,
    },
}

impl Event {
    /// The room this event concerns.
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomAdded { id, .. } => *id,
            Event::RoomBooked { room_id, .. }
            | Event::RoomFreed { room_id }
            | Event::RoomLocked { room_id }
            | Event::RoomUnlocked { room_id } => *room_id,
        }
    }

    /// Event name as seen by audit consumers.
    pub fn name(&self) -> &'static str {
        match self {
            Event::RoomAdded { .. } => "RoomAdded",
            Event::RoomBooked { .. } => "RoomBooked",
            Event::RoomFreed { .. } => "RoomFreed",
            Event::RoomLocked { .. } => "RoomLocked",
            Event::RoomUnlocked { .. } => "RoomUnlocked",
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub capacity: u32,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub booked_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            span: Span::new(start, end),
            booked_by: "admin".into(),
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn booking_ordering() {
        let mut rs = RoomState::new(Ulid::new(), 1);
        rs.insert_booking(booking(300, 400));
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(200, 300));
        assert_eq!(rs.bookings[0].span.start, 100);
        assert_eq!(rs.bookings[1].span.start, 200);
        assert_eq!(rs.bookings[2].span.start, 300);
    }

    #[test]
    fn clear_bookings_empties() {
        let mut rs = RoomState::new(Ulid::new(), 2);
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(300, 400));
        rs.clear_bookings();
        assert!(rs.bookings.is_empty());
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut rs = RoomState::new(Ulid::new(), 1);
        rs.insert_booking(booking(100, 200));
        rs.insert_booking(booking(450, 600));
        rs.insert_booking(booking(1000, 1100));

        let query = Span::new(500, 800);
        let hits: Vec<_> = rs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // Booking ending exactly at query.start is NOT overlapping (half-open)
        let mut rs = RoomState::new(Ulid::new(), 1);
        rs.insert_booking(booking(100, 200));
        let hits: Vec<_> = rs.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_all_past() {
        let mut rs = RoomState::new(Ulid::new(), 1);
        for i in 0..5 {
            rs.insert_booking(booking(i * 100, i * 100 + 50));
        }
        let hits: Vec<_> = rs.overlapping(&Span::new(1000, 2000)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_spanning_query() {
        let mut rs = RoomState::new(Ulid::new(), 1);
        rs.insert_booking(booking(0, 10000));
        let hits: Vec<_> = rs.overlapping(&Span::new(500, 600)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_empty_room() {
        let rs = RoomState::new(Ulid::new(), 1);
        let hits: Vec<_> = rs.overlapping(&Span::new(0, 1000)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_single_ms_overlap() {
        // Booking [100, 201) overlaps query [200, 300) by exactly 1ms
        let mut rs = RoomState::new(Ulid::new(), 1);
        rs.insert_booking(booking(100, 201));
        let hits: Vec<_> = rs.overlapping(&Span::new(200, 300)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn new_room_is_free() {
        let rs = RoomState::new(Ulid::new(), 3);
        assert_eq!(rs.status, RoomStatus::Free);
        assert_eq!(rs.capacity, 3);
        assert!(rs.bookings.is_empty());
    }

    #[test]
    fn status_display() {
        assert_eq!(RoomStatus::Free.to_string(), "FREE");
        assert_eq!(RoomStatus::Booked.to_string(), "BOOKED");
        assert_eq!(RoomStatus::Locked.to_string(), "LOCKED");
    }

    #[test]
    fn event_room_id_and_name() {
        let rid = Ulid::new();
        let e = Event::RoomBooked {
            booking_id: Ulid::new(),
            room_id: rid,
            span: Span::new(0, 100),
            booked_by: "admin".into(),
        };
        assert_eq!(e.room_id(), rid);
        assert_eq!(e.name(), "RoomBooked");
        assert_eq!(Event::RoomAdded { id: rid, capacity: 1 }.room_id(), rid);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::RoomAdded {
            id: Ulid::new(),
            capacity: 4,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
