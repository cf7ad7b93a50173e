use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;

use crate::model::{Span, UserId};

/// A parsed range waiting for the user's confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Set once the user agreed the range runs into the next day.
    pub end_date: Option<NaiveDate>,
    pub duration_confirmed: bool,
}

impl Pending {
    pub fn new(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            date,
            start_time,
            end_time,
            end_date: None,
            duration_confirmed: false,
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.start_time >= self.end_time
    }

    /// The candidate interval with the end on `end_date`, or on `date` if not overridden.
    pub fn span(&self) -> Span {
        Span::new(
            self.date.and_time(self.start_time),
            self.end_date.unwrap_or(self.date).and_time(self.end_time),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReason {
    Overnight,
    UnusualDuration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    DateSelected {
        date: NaiveDate,
    },
    AwaitingConfirmation {
        pending: Pending,
        reason: ConfirmReason,
    },
}

/// Per-user conversation state. Idle users have no entry.
#[derive(Default)]
pub struct Sessions {
    map: DashMap<UserId, SessionState>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: UserId) -> SessionState {
        self.map
            .get(&user)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn set(&self, user: UserId, state: SessionState) {
        if state == SessionState::Idle {
            self.map.remove(&user);
        } else {
            self.map.insert(user, state);
        }
        metrics::gauge!(crate::observability::SESSIONS_ACTIVE).set(self.map.len() as f64);
    }

    pub fn reset(&self, user: UserId) {
        self.set(user, SessionState::Idle);
    }

    pub fn active(&self) -> usize {
        self.map.len()
    }
}
