mod parse;
mod reply;
mod session;

pub use parse::{parse_range, ParseError};
pub use reply::{format_booking, format_date, format_free_slot, format_span, Action, Button, Reply};
pub use session::{ConfirmReason, Pending, SessionState, Sessions};

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, CANCELLATIONS_TOTAL, HANDLE_DURATION_SECONDS, UPDATES_TOTAL};
use crate::store::{Store, StoreError};

const RANGE_PROMPT: &str =
    "Send the time you want as HH:MM-HH:MM, for example 12:30-13:00.\nTap /start to get back to the menu.";

/// Something the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Start,
    Action(Action),
    Text(String),
}

impl Inbound {
    fn label(&self) -> &'static str {
        match self {
            Inbound::Start => "start",
            Inbound::Action(a) => crate::observability::action_label(a),
            Inbound::Text(_) => "text",
        }
    }
}

/// Outcome of checking a pending range before commit.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    InPast,
    Ask(ConfirmReason),
    Commit(Span),
}

fn validate(pending: &Pending, now: NaiveDateTime) -> Verdict {
    if pending.date.and_time(pending.start_time) < now {
        return Verdict::InPast;
    }
    if pending.is_inverted() && pending.end_date.is_none() {
        return Verdict::Ask(ConfirmReason::Overnight);
    }
    let span = pending.span();
    let minutes = span.duration().num_minutes();
    let typical = MIN_TYPICAL_DURATION_MINUTES..=MAX_TYPICAL_DURATION_MINUTES;
    if !typical.contains(&minutes) && !pending.duration_confirmed {
        return Verdict::Ask(ConfirmReason::UnusualDuration);
    }
    Verdict::Commit(span)
}

fn question(reason: ConfirmReason) -> Reply {
    let text = match reason {
        ConfirmReason::Overnight => {
            "The start is later than the end.\nDo you want to book from this day into the next one?"
        }
        ConfirmReason::UnusualDuration => {
            "That is shorter than half an hour or longer than 3 hours.\nDo you still want to book it?"
        }
    };
    Reply::text(text).row(vec![
        Button::new("Yes", Action::Confirm(true)),
        Button::new("No", Action::Confirm(false)),
    ])
}

fn main_menu(text: &str) -> Reply {
    Reply::text(text)
        .row(vec![
            Button::new("Book", Action::Book),
            Button::new("Cancel", Action::Cancel),
        ])
        .row(vec![Button::new("My bookings", Action::MyBookings)])
}

/// The dates a user may book: today and the following days of the horizon.
pub fn bookable_dates(today: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    (0..BOOKING_HORIZON_DAYS).map(move |i| today + Duration::days(i))
}

/// Drives one conversation per user against the shared store.
pub struct Workflow {
    store: Arc<Store>,
    sessions: Sessions,
}

impl Workflow {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            sessions: Sessions::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Advance the user's conversation by one step. `now` is local wall-clock time.
    pub async fn handle(&self, user: UserId, inbound: Inbound, now: NaiveDateTime) -> Vec<Reply> {
        let start = std::time::Instant::now();
        let label = inbound.label();
        let replies = match inbound {
            Inbound::Start => {
                self.sessions.reset(user);
                vec![main_menu("Please choose:")]
            }
            Inbound::Action(action) => self.on_action(user, action, now).await,
            Inbound::Text(text) => self.on_text(user, &text, now).await,
        };
        metrics::counter!(UPDATES_TOTAL, "kind" => label).increment(1);
        metrics::histogram!(HANDLE_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        replies
    }

    async fn on_action(&self, user: UserId, action: Action, now: NaiveDateTime) -> Vec<Reply> {
        match action {
            Action::Book => vec![self.date_menu(now.date())],
            Action::Date(date) => self.select_date(user, date, now).await,
            Action::Confirm(yes) => self.confirm(user, yes, now).await,
            Action::MyBookings => self.my_bookings(user, now).await,
            Action::Cancel => self.cancel_menu(user, now).await,
            Action::Drop(id) => self.cancel(user, id).await,
        }
    }

    async fn on_text(&self, user: UserId, text: &str, now: NaiveDateTime) -> Vec<Reply> {
        match self.sessions.get(user) {
            SessionState::Idle => vec![main_menu("Pick a date first.")],
            SessionState::DateSelected { date } => self.enter_range(user, date, text, now).await,
            SessionState::AwaitingConfirmation { reason, .. } => vec![question(reason)],
        }
    }

    fn date_menu(&self, today: NaiveDate) -> Reply {
        bookable_dates(today).fold(Reply::text("Pick a date:"), |reply, date| {
            reply.row(vec![Button::new(format_date(date), Action::Date(date))])
        })
    }

    async fn select_date(&self, user: UserId, date: NaiveDate, now: NaiveDateTime) -> Vec<Reply> {
        let today = now.date();
        if !bookable_dates(today).any(|d| d == date) {
            return vec![
                Reply::text("That date is outside the booking window."),
                self.date_menu(today),
            ];
        }
        self.sessions.set(user, SessionState::DateSelected { date });

        let free = self.store.free_slots(date).await;
        let listing = if free.is_empty() {
            "Everything is taken that day, pick another date.".to_string()
        } else {
            let lines: Vec<String> = free.iter().map(format_free_slot).collect();
            format!("Free time on {}:\n{}", format_date(date), lines.join("\n"))
        };
        vec![Reply::text(listing), Reply::text(RANGE_PROMPT)]
    }

    async fn enter_range(
        &self,
        user: UserId,
        date: NaiveDate,
        text: &str,
        now: NaiveDateTime,
    ) -> Vec<Reply> {
        match parse_range(text) {
            Ok((start_time, end_time)) => {
                let pending = Pending::new(date, start_time, end_time);
                self.validate_and_commit(user, pending, now).await
            }
            Err(e) => {
                tracing::debug!(user, error = %e, "unparsable range");
                vec![Reply::text(
                    "Please send the time in the right format, for example 12:30-13:00.",
                )]
            }
        }
    }

    async fn confirm(&self, user: UserId, yes: bool, now: NaiveDateTime) -> Vec<Reply> {
        let SessionState::AwaitingConfirmation { mut pending, reason } = self.sessions.get(user)
        else {
            return vec![main_menu("There is nothing to confirm.")];
        };
        if !yes {
            self.sessions.reset(user);
            return vec![main_menu("Booking discarded.")];
        }
        match reason {
            ConfirmReason::Overnight => pending.end_date = pending.date.succ_opt(),
            ConfirmReason::UnusualDuration => pending.duration_confirmed = true,
        }
        self.validate_and_commit(user, pending, now).await
    }

    async fn validate_and_commit(
        &self,
        user: UserId,
        pending: Pending,
        now: NaiveDateTime,
    ) -> Vec<Reply> {
        match validate(&pending, now) {
            Verdict::InPast => {
                self.sessions
                    .set(user, SessionState::DateSelected { date: pending.date });
                vec![Reply::text(
                    "That time has already passed. Pick a time in the future.",
                )]
            }
            Verdict::Ask(reason) => {
                self.sessions
                    .set(user, SessionState::AwaitingConfirmation { pending, reason });
                vec![question(reason)]
            }
            Verdict::Commit(span) => {
                self.sessions.reset(user);
                vec![self.commit(user, span).await]
            }
        }
    }

    async fn commit(&self, user: UserId, span: Span) -> Reply {
        let result = self.store.create_booking(user, span).await;
        let status = match &result {
            Ok(_) => "ok",
            Err(StoreError::Conflict(_)) => "conflict",
            Err(StoreError::InvalidSpan(_)) => "invalid",
            Err(StoreError::LimitExceeded(_)) => "limit",
            Err(_) => "error",
        };
        metrics::counter!(BOOKINGS_TOTAL, "status" => status).increment(1);

        match result {
            Ok(booking) => {
                tracing::info!(user, id = booking.id, span = %format_booking(&booking), "booking created");
                main_menu(&format!("Booked: {}", format_booking(&booking)))
            }
            Err(StoreError::Conflict(id)) => {
                tracing::debug!(user, conflicting = id, "booking rejected");
                main_menu(
                    "That time overlaps another booking. 30 minutes are kept free around every booking, pick another time.",
                )
            }
            Err(e @ (StoreError::InvalidSpan(_) | StoreError::LimitExceeded(_))) => {
                main_menu(&format!("Cannot book that: {e}."))
            }
            Err(e) => {
                tracing::error!(user, error = %e, "booking failed");
                main_menu("Something went wrong, please try again later.")
            }
        }
    }

    async fn my_bookings(&self, user: UserId, now: NaiveDateTime) -> Vec<Reply> {
        let bookings = self.store.upcoming_for_user(user, now).await;
        if bookings.is_empty() {
            return vec![main_menu("You have no upcoming bookings.")];
        }
        let lines: Vec<String> = bookings.iter().map(format_booking).collect();
        vec![Reply::text(format!("Your bookings:\n{}", lines.join("\n")))]
    }

    async fn cancel_menu(&self, user: UserId, now: NaiveDateTime) -> Vec<Reply> {
        let bookings = self.store.upcoming_for_user(user, now).await;
        if bookings.is_empty() {
            return vec![main_menu("You have nothing to cancel.")];
        }
        let reply = bookings.iter().fold(
            Reply::text("Which booking do you want to cancel?"),
            |reply, b| reply.row(vec![Button::new(format_booking(b), Action::Drop(b.id))]),
        );
        vec![reply]
    }

    async fn cancel(&self, user: UserId, id: BookingId) -> Vec<Reply> {
        match self.store.cancel_booking(id, user).await {
            Ok(booking) => {
                metrics::counter!(CANCELLATIONS_TOTAL, "status" => "ok").increment(1);
                tracing::info!(user, id, "booking cancelled");
                vec![main_menu(&format!("Cancelled: {}", format_booking(&booking)))]
            }
            Err(StoreError::NotFound(_)) => {
                metrics::counter!(CANCELLATIONS_TOTAL, "status" => "not_found").increment(1);
                vec![main_menu("That booking no longer exists.")]
            }
            Err(e) => {
                metrics::counter!(CANCELLATIONS_TOTAL, "status" => "error").increment(1);
                tracing::error!(user, id, error = %e, "cancel failed");
                vec![main_menu("Something went wrong, please try again later.")]
            }
        }
    }
}
