use chrono::Duration;

// ── Booking rules ────────────────────────────────────────────────

/// Gap kept free before and after every booking.
pub const BUFFER_MINUTES: i64 = 30;

/// Bookings shorter or longer than this need an explicit confirmation.
pub const MIN_TYPICAL_DURATION_MINUTES: i64 = 30;
pub const MAX_TYPICAL_DURATION_MINUTES: i64 = 180;

/// How long before the start a reminder goes out. Also the catch-up window
/// for end notices.
pub const REMINDER_LEAD_MINUTES: i64 = 15;

/// Number of calendar days offered in the date menu, today included.
pub const BOOKING_HORIZON_DAYS: i64 = 7;

/// The free-slot view runs from midnight until this hour of the next day.
pub const EXTENDED_DAY_END_HOUR: u32 = 4;

/// Free-slot display rounds to this many minutes.
pub const DISPLAY_ROUNDING_MINUTES: u32 = 5;

pub const DEFAULT_RETENTION_DAYS: i64 = 7;

// ── Input limits ─────────────────────────────────────────────────

/// `10:00-10:00` is a full day, the widest span the parser can express.
pub const MAX_SPAN_MINUTES: i64 = 24 * 60;
pub const MAX_BOOKINGS: usize = 100_000;
pub const MAX_BOOKINGS_PER_USER: usize = 50;
pub const MAX_RANGE_INPUT_LEN: usize = 64;

pub fn buffer() -> Duration {
    Duration::minutes(BUFFER_MINUTES)
}

pub fn reminder_lead() -> Duration {
    Duration::minutes(REMINDER_LEAD_MINUTES)
}
