use chrono::{NaiveDate, NaiveDateTime};

use crate::limits::*;
use crate::model::*;

use super::availability::{extended_day, free_slots};
use super::conflict::find_conflict;
use super::Store;

impl Store {
    /// True iff no stored booking intersects the candidate's padded window.
    /// Empty or inverted candidates are never available.
    pub async fn is_available(&self, span: &Span) -> bool {
        if span.is_empty() {
            return false;
        }
        let guard = self.state.read().await;
        find_conflict(&guard, span).is_none()
    }

    pub async fn get_booking(&self, id: BookingId) -> Option<Booking> {
        self.state.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// The user's bookings that have not ended yet, earliest first.
    pub async fn upcoming_for_user(&self, user_id: UserId, now: NaiveDateTime) -> Vec<Booking> {
        let guard = self.state.read().await;
        guard
            .iter()
            .filter(|b| b.user_id == user_id && b.end() > now)
            .cloned()
            .collect()
    }

    /// Free intervals of the extended day of `date`.
    pub async fn free_slots(&self, date: NaiveDate) -> Vec<Span> {
        // Widen by a buffer so bookings just outside the window still trim its edges.
        let window = extended_day(date).padded(buffer());
        let guard = self.state.read().await;
        free_slots(date, guard.overlapping(&window).map(|b| b.span()))
    }

    /// Bookings starting within the reminder lead that have not been reminded.
    pub async fn due_start_reminders(&self, now: NaiveDateTime) -> Vec<Booking> {
        let lead = reminder_lead();
        let guard = self.state.read().await;
        guard
            .iter()
            .filter(|b| !b.start_reminded && b.start() - lead <= now && now < b.start())
            .cloned()
            .collect()
    }

    /// Bookings that ended no longer than the reminder lead ago and were not announced.
    pub async fn due_end_notices(&self, now: NaiveDateTime) -> Vec<Booking> {
        let lead = reminder_lead();
        let guard = self.state.read().await;
        guard
            .iter()
            .filter(|b| !b.end_notified && b.end() <= now && now < b.end() + lead)
            .cloned()
            .collect()
    }
}
