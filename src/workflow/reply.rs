use chrono::{NaiveDate, NaiveDateTime};

use crate::model::{Booking, BookingId, Span};
use crate::store::round_for_display;

const DATE_FORMAT: &str = "%d.%m.%Y";
const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// A button press. Rendered into callback data as a short string
/// (`book`, `cancel`, `mine`, `date:YYYY-MM-DD`, `yes`, `no`, `drop:<id>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Book,
    Cancel,
    MyBookings,
    Date(NaiveDate),
    Confirm(bool),
    Drop(BookingId),
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Book => "book".into(),
            Action::Cancel => "cancel".into(),
            Action::MyBookings => "mine".into(),
            Action::Date(d) => format!("date:{}", d.format("%Y-%m-%d")),
            Action::Confirm(true) => "yes".into(),
            Action::Confirm(false) => "no".into(),
            Action::Drop(id) => format!("drop:{id}"),
        }
    }

    /// `None` for anything `encode` never produces.
    pub fn decode(data: &str) -> Option<Action> {
        match data {
            "book" => return Some(Action::Book),
            "cancel" => return Some(Action::Cancel),
            "mine" => return Some(Action::MyBookings),
            "yes" => return Some(Action::Confirm(true)),
            "no" => return Some(Action::Confirm(false)),
            _ => {}
        }
        let (tag, arg) = data.split_once(':')?;
        match tag {
            "date" => NaiveDate::parse_from_str(arg, "%Y-%m-%d")
                .ok()
                .map(Action::Date),
            "drop" => arg.parse().ok().map(Action::Drop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// One outbound message with an optional inline keyboard (rows of buttons).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.keyboard.push(buttons);
        self
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.keyboard.iter().flatten()
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_instant(t: NaiveDateTime) -> String {
    t.format(DATE_TIME_FORMAT).to_string()
}

/// `DD.MM.YYYY HH:MM - DD.MM.YYYY HH:MM`
pub fn format_span(span: &Span) -> String {
    format!("{} - {}", format_instant(span.start), format_instant(span.end))
}

/// Like `format_span`, snapped outward to the display grid.
pub fn format_free_slot(span: &Span) -> String {
    let (start, end) = round_for_display(span);
    format_span(&Span::new(start, end))
}

pub fn format_booking(booking: &Booking) -> String {
    format_span(&booking.span())
}
