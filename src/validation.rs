//! Input validation shared by the HTTP layer and the scheduling core.
//!
//! Validators return `Err(message)` with a human-readable reason. For
//! collecting several field errors into one response, use the
//! `ValidationErrorBuilder` from the `api::error` module.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email syntax: local part, `@`, dotted domain with a 2+ letter TLD
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$"
    ).unwrap();
}

/// Minimum password length accepted at signup, change and reset
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if email.contains("..") || !EMAIL_REGEX.is_match(email) {
        return Err(format!("Invalid email address: {}", email));
    }

    Ok(())
}

/// Canonical stored form of an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate a password against the length policy
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }

    if password.len() > 1024 {
        return Err("Password is too long (max 1024 characters)".to_string());
    }

    Ok(())
}

/// Validate a display name (users and sports)
pub fn validate_name(name: &str, what: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", what));
    }

    if trimmed.chars().count() > 100 {
        return Err(format!("{} is too long (max 100 characters)", what));
    }

    Ok(())
}

/// Parse an ISO-8601 / RFC 3339 instant, normalised to UTC
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("Invalid date '{}'. Use ISO-8601, e.g. 2025-06-01T10:00:00Z", value))
}

/// Which end of a day a bare `YYYY-MM-DD` resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// Parse a report bound: either a full RFC 3339 instant or a bare date.
///
/// A bare date resolves to midnight for `DayBound::Start` and to the last
/// millisecond of that day for `DayBound::End`, so an end date is inclusive.
pub fn parse_date_bound(value: &str, bound: DayBound) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = match bound {
            DayBound::Start => NaiveTime::default(),
            DayBound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
                .unwrap_or_default(),
        };
        return Ok(date.and_time(time).and_utc());
    }

    parse_datetime(value)
}
