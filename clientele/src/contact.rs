//! Contact detail helpers
//!
//! Plausibility checks for email addresses and phone numbers, and display
//! formatting for Chilean mobile numbers. Advisory only: registration accepts
//! any non-blank value.

use once_cell::sync::Lazy;
use regex::Regex;

/// Conservative address shape: local part, one `@`, dotted domain, alphabetic TLD
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
});

/// Phone number detection regex (various formats)
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?[\d\s\-().]{7,20}$").unwrap()
});

/// Chilean country code
const COUNTRY_CODE: &str = "56";

/// Check if a string is an email address
pub fn is_email(text: &str) -> bool {
    let trimmed = text.trim();
    EMAIL_REGEX.is_match(trimmed) && validator::validate_email(trimmed)
}

/// Check if a string looks like a phone number
pub fn is_phone(text: &str) -> bool {
    let trimmed = text.trim();

    if !PHONE_REGEX.is_match(trimmed) {
        return false;
    }

    let digit_count = trimmed.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digit_count)
}

/// Format a Chilean number as `+56 X XXXX XXXX`.
///
/// Accepts the 9-digit national mobile form (`9XXXXXXXX`) and any 11-digit
/// number carrying the country code (`56XXXXXXXXX`), ignoring punctuation.
/// Anything else is returned unchanged.
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();

    let national = match digits.len() {
        9 if digits.starts_with('9') => Some(digits.as_str()),
        11 if digits.starts_with(COUNTRY_CODE) => Some(&digits[2..]),
        _ => None,
    };

    match national {
        Some(national) => format!(
            "+{} {} {} {}",
            COUNTRY_CODE,
            &national[..1],
            &national[1..5],
            &national[5..]
        ),
        None => phone.to_string(),
    }
}

/// Advisory issues with a client's contact details
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactIssues {
    pub email_malformed: bool,
    pub phone_malformed: bool,
}

impl ContactIssues {
    pub fn check(email: &str, phone: &str) -> Self {
        Self {
            email_malformed: !is_email(email),
            phone_malformed: !is_phone(phone),
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.email_malformed && !self.phone_malformed
    }
}
