use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub type BookingId = u64;

/// Chat platform user identifier. Private chats share the id with the user.
pub type UserId = i64;

/// Half-open interval `[start, end)` of local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Widen both ends by `by`.
    pub fn padded(&self, by: Duration) -> Span {
        Span::new(self.start - by, self.end + by)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderKind {
    Start,
    End,
}

/// A reserved slot. Never mutated after creation except for the reminder marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_reminded: bool,
    pub end_notified: bool,
}

impl Booking {
    pub fn new(id: BookingId, user_id: UserId, span: Span) -> Self {
        Self {
            id,
            user_id,
            start_date: span.start.date(),
            end_date: span.end.date(),
            start_time: span.start.time(),
            end_time: span.end.time(),
            start_reminded: false,
            end_notified: false,
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end_date.and_time(self.end_time)
    }

    pub fn span(&self) -> Span {
        Span::new(self.start(), self.end())
    }

    pub fn is_overnight(&self) -> bool {
        self.end_date > self.start_date
    }

    pub fn reminded(&self, kind: ReminderKind) -> bool {
        match kind {
            ReminderKind::Start => self.start_reminded,
            ReminderKind::End => self.end_notified,
        }
    }
}

/// Log record format. Every state change of the store is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Written first by compaction so ids are never handed out twice.
    Sequence { next_id: BookingId },
    BookingCreated { booking: Booking },
    BookingCancelled { id: BookingId },
    BookingExpired { id: BookingId },
    ReminderSent { id: BookingId, kind: ReminderKind },
}
