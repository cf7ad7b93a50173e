use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::limits::*;
use crate::model::*;

// ── Free-slot enumeration ─────────────────────────────────────────

/// Midnight of `date` through `EXTENDED_DAY_END_HOUR` of the next day, so
/// overnight bookings bleeding into the early hours show up.
pub fn extended_day(date: NaiveDate) -> Span {
    let next = date.succ_opt().unwrap_or(date);
    Span::new(
        date.and_time(NaiveTime::MIN),
        next.and_hms_opt(EXTENDED_DAY_END_HOUR, 0, 0)
            .unwrap_or_else(|| next.and_time(NaiveTime::MIN)),
    )
}

/// Complement of the padded bookings over the extended day of `date`.
///
/// Sweeps a cursor from midnight. A gap before a booking is emitted only if
/// the cursor sits at least one buffer before the booking's padded start;
/// the trailing gap likewise needs at least one buffer of room. Gaps shorter
/// than the buffer are never reported.
pub fn free_slots(date: NaiveDate, booked: impl IntoIterator<Item = Span>) -> Vec<Span> {
    let day = extended_day(date);
    let buffer = buffer();

    let mut booked: Vec<Span> = booked.into_iter().collect();
    booked.sort_by_key(|s| s.start);

    let mut free = Vec::new();
    let mut cursor = day.start;
    for b in booked {
        let gap_end = (b.start - buffer).min(day.end);
        if gap_end - cursor >= buffer {
            free.push(Span::new(cursor, gap_end));
        }
        cursor = cursor.max(b.end + buffer);
    }
    if day.end - cursor >= buffer {
        free.push(Span::new(cursor, day.end));
    }
    free
}

/// Round the start down and the end up to the display grid.
pub fn round_for_display(span: &Span) -> (NaiveDateTime, NaiveDateTime) {
    let step = DISPLAY_ROUNDING_MINUTES;
    let floor = |t: NaiveDateTime| {
        t - Duration::minutes((t.minute() % step) as i64) - Duration::seconds(t.second() as i64)
    };
    let start = floor(span.start);
    let end_floor = floor(span.end);
    let end = if end_floor == span.end {
        span.end
    } else {
        end_floor + Duration::minutes(step as i64)
    };
    (start, end)
}
