use ulid::Ulid;

use crate::model::Ms;

/// Every failure the booking engine reports. Each condition stays distinct
/// and inspectable — callers branch on these, the wire layer maps them to
/// SQLSTATE codes.
#[derive(Debug)]
pub enum EngineError {
    /// Caller is not authorized for a mutating operation.
    Forbidden(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Requested interval has `start >= end`.
    InvalidInterval { start: Ms, end: Ms },
    /// Requested interval overlaps the named existing booking.
    Conflict(Ulid),
    /// Room is administratively locked; booking is blocked.
    Locked(Ulid),
    /// Unlock requested on a room that is not locked.
    NotLocked(Ulid),
    /// Capacity below 1 at creation.
    InvalidCapacity(u32),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Forbidden(caller) => write!(f, "forbidden: caller {caller} may not mutate"),
            EngineError::NotFound(id) => write!(f, "room not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "room already exists: {id}"),
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval: [{start}, {end})")
            }
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::Locked(id) => write!(f, "room is locked: {id}"),
            EngineError::NotLocked(id) => write!(f, "room is not locked: {id}"),
            EngineError::InvalidCapacity(cap) => write!(f, "invalid capacity: {cap}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
