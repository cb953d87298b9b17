use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Validate a requested `[start, end)` interval before any state is touched.
/// `start >= end` is the caller's error; out-of-range timestamps and
/// oversized spans hit the service limits.
pub(crate) fn validate_interval(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("interval too wide"));
    }
    Ok(span)
}

/// Any overlap with an existing booking is a conflict — capacity is declared
/// room metadata, not a concurrency budget. Touching boundaries are fine
/// (half-open semantics).
pub(crate) fn check_no_conflict(rs: &RoomState, span: &Span) -> Result<(), EngineError> {
    if let Some(existing) = rs.overlapping(span).next() {
        return Err(EngineError::Conflict(existing.id));
    }
    Ok(())
}
