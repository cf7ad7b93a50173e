use chrono::Timelike;

use crate::limits::*;
use crate::model::*;

use super::{BookingIndex, StoreError};

pub(crate) fn validate_span(span: &Span) -> Result<(), StoreError> {
    if span.is_empty() {
        return Err(StoreError::InvalidSpan("empty or inverted interval"));
    }
    if span.duration().num_minutes() > MAX_SPAN_MINUTES {
        return Err(StoreError::LimitExceeded("span too wide"));
    }
    for t in [span.start, span.end] {
        if t.second() != 0 || t.nanosecond() != 0 {
            return Err(StoreError::InvalidSpan("times must be whole minutes"));
        }
    }
    Ok(())
}

/// The candidate widened by the buffer on both sides. Stored bookings are
/// compared unpadded against this window.
pub(crate) fn padded_window(span: &Span) -> Span {
    span.padded(buffer())
}

/// First booking whose raw interval intersects the padded candidate:
/// `B.start < E' && B.end > S'`. Touching boundaries are not conflicts.
pub(crate) fn find_conflict(index: &BookingIndex, span: &Span) -> Option<BookingId> {
    index.overlapping(&padded_window(span)).next().map(|b| b.id)
}

pub(crate) fn check_no_conflict(index: &BookingIndex, span: &Span) -> Result<(), StoreError> {
    match find_conflict(index, span) {
        Some(id) => Err(StoreError::Conflict(id)),
        None => Ok(()),
    }
}
