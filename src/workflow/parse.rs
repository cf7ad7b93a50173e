use std::fmt;

use chrono::NaiveTime;

use crate::limits::MAX_RANGE_INPUT_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooLong,
    MissingSeparator,
    BadTime(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooLong => write!(f, "input too long"),
            ParseError::MissingSeparator => write!(f, "expected HH:MM-HH:MM"),
            ParseError::BadTime(s) => write!(f, "not a time: {s}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse `HH:MM-HH:MM` into start and end times. An en-dash works as the
/// separator too. The end may be earlier than the start; that is an
/// overnight range and is for the caller to confirm.
pub fn parse_range(input: &str) -> Result<(NaiveTime, NaiveTime), ParseError> {
    if input.len() > MAX_RANGE_INPUT_LEN {
        return Err(ParseError::TooLong);
    }
    let normalised = input.trim().replace('\u{2013}', "-");
    let (start, end) = normalised
        .split_once('-')
        .ok_or(ParseError::MissingSeparator)?;
    Ok((parse_time(start)?, parse_time(end)?))
}

fn parse_time(s: &str) -> Result<NaiveTime, ParseError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| ParseError::BadTime(s.to_string()))
}
