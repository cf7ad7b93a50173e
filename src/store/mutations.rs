use chrono::NaiveDate;
use tokio::sync::oneshot;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{Store, StoreError, WalCommand, WalStats};

impl Store {
    /// Check availability and insert under one write lock. Two commits for
    /// overlapping windows are serialised here; the second sees the first.
    pub async fn create_booking(&self, user_id: UserId, span: Span) -> Result<Booking, StoreError> {
        validate_span(&span)?;
        let mut guard = self.state.write().await;
        if guard.len() >= MAX_BOOKINGS {
            return Err(StoreError::LimitExceeded("too many bookings"));
        }
        if guard.iter().filter(|b| b.user_id == user_id).count() >= MAX_BOOKINGS_PER_USER {
            return Err(StoreError::LimitExceeded("too many bookings for this user"));
        }

        check_no_conflict(&guard, &span)?;

        let booking = Booking::new(guard.next_id(), user_id, span);
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(booking)
    }

    /// Delete a booking owned by `user_id`. Missing and foreign ids both
    /// report `NotFound`, so a second cancel of the same id fails.
    pub async fn cancel_booking(&self, id: BookingId, user_id: UserId) -> Result<Booking, StoreError> {
        let mut guard = self.state.write().await;
        let booking = guard
            .get(id)
            .filter(|b| b.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;
        self.persist_and_apply(&mut guard, &Event::BookingCancelled { id })
            .await?;
        Ok(booking)
    }

    /// Record that a reminder went out. `Ok(false)` if it already had,
    /// which keeps delivery at most once per booking and kind.
    pub async fn mark_reminded(&self, id: BookingId, kind: ReminderKind) -> Result<bool, StoreError> {
        let mut guard = self.state.write().await;
        let booking = guard.get(id).ok_or(StoreError::NotFound(id))?;
        if booking.reminded(kind) {
            return Ok(false);
        }
        self.persist_and_apply(&mut guard, &Event::ReminderSent { id, kind })
            .await?;
        Ok(true)
    }

    /// Hard-delete every booking whose start date is before `cutoff`, in one
    /// group commit. Conditioned on the date only, so re-running after a
    /// failure is safe.
    pub async fn purge_started_before(&self, cutoff: NaiveDate) -> Result<Vec<BookingId>, StoreError> {
        let mut guard = self.state.write().await;
        let stale: Vec<BookingId> = guard
            .iter()
            .filter(|b| b.start_date < cutoff)
            .map(|b| b.id)
            .collect();
        let events = stale.iter().map(|&id| Event::BookingExpired { id }).collect();
        self.persist_and_apply_all(&mut guard, events).await?;
        Ok(stale)
    }

    /// Rewrite the log with only the events needed to rebuild the current
    /// state. Holds the write lock throughout so no append slips in between
    /// the snapshot and the swap.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let guard = self.state.write().await;
        let mut events = Vec::with_capacity(guard.len() + 1);
        events.push(Event::Sequence {
            next_id: guard.next_id(),
        });
        events.extend(guard.iter().map(|b| Event::BookingCreated { booking: b.clone() }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()));
        drop(guard);
        result
    }

    pub async fn wal_stats(&self) -> WalStats {
        let (tx, rx) = oneshot::channel();
        let empty = WalStats {
            appends_since_compact: 0,
            syncs: 0,
        };
        if self
            .wal_tx
            .send(WalCommand::Stats { response: tx })
            .await
            .is_err()
        {
            return empty;
        }
        rx.await.unwrap_or(empty)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal_stats().await.appends_since_compact
    }
}
