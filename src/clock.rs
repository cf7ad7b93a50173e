use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Wall clock of the place the machine stands in. Bookings are stored in
/// this zone's local time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Current local time truncated to the minute.
    pub fn now(&self) -> NaiveDateTime {
        let local = Utc::now().with_timezone(&self.tz).naive_local();
        local
            .date()
            .and_hms_opt(local.hour(), local.minute(), 0)
            .unwrap_or(local)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}
