use crate::model::BookingId;

#[derive(Debug)]
pub enum StoreError {
    /// Missing id, or an id owned by someone else.
    NotFound(BookingId),
    /// The padded candidate window intersects this booking.
    Conflict(BookingId),
    InvalidSpan(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            StoreError::InvalidSpan(msg) => write!(f, "invalid span: {msg}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
