//! Input validation for API requests.
//!
//! Field checks return `Result<(), String>` so handlers can feed them into a
//! `ValidationErrorBuilder`; query parsers return the parsed value.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// Fixed wire format of date-range query parameters
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

lazy_static! {
    /// Letters, digits, dots, dashes and underscores
    static ref LOGIN_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*$").unwrap();
}

pub fn validate_login(login: &str) -> Result<(), String> {
    if login.is_empty() {
        return Err("Login is required".to_string());
    }
    if login.len() < 3 {
        return Err("Login is too short (min 3 characters)".to_string());
    }
    if login.len() > 64 {
        return Err("Login is too long (max 64 characters)".to_string());
    }
    if !LOGIN_REGEX.is_match(login) {
        return Err(
            "Login may only contain letters, digits, dots, dashes and underscores".to_string(),
        );
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < 6 {
        return Err("Password is too short (min 6 characters)".to_string());
    }
    if password.len() > 256 {
        return Err("Password is too long (max 256 bytes)".to_string());
    }
    Ok(())
}

/// Display names and modeling names share the same rule
pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }
    if trimmed.chars().count() > 200 {
        return Err("Name is too long (max 200 characters)".to_string());
    }
    Ok(())
}

pub fn validate_price(price: i64, ceiling: i64) -> Result<(), String> {
    if price < 0 {
        return Err("Price must not be negative".to_string());
    }
    if price > ceiling {
        return Err(format!("Price must not exceed {}", ceiling));
    }
    Ok(())
}

/// Parse a price bound from the query string; absent or blank yields `default`
pub fn parse_price_bound(raw: Option<&str>, default: i64) -> Result<i64, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => {
            let value: i64 = s
                .parse()
                .map_err(|_| format!("'{}' is not a whole number", s))?;
            if value < 0 {
                return Err("Price bounds must not be negative".to_string());
            }
            Ok(value)
        }
    }
}

/// Parse a date-range bound; absent or blank means unbounded
pub fn parse_date_bound(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => {
            let invalid = || format!("'{}' is not a date in the form YYYY-MM-DDThh:mm:ssZ", s);
            let naive = NaiveDateTime::parse_from_str(s, QUERY_DATE_FORMAT).map_err(|_| invalid())?;
            // Stored timestamps compare as text, which only orders four-digit years
            let four_digit_year = s.get(..4).is_some_and(|y| y.bytes().all(|b| b.is_ascii_digit()));
            if !four_digit_year || !(0..=9999).contains(&naive.year()) {
                return Err(invalid());
            }
            Ok(Some(naive.and_utc()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_login() {
        assert!(validate_login("alice").is_ok());
        assert!(validate_login("a.l-i_ce42").is_ok());

        assert!(validate_login("").is_err());
        assert!(validate_login("ab").is_err());
        assert!(validate_login("-alice").is_err());
        assert!(validate_login("al ice").is_err());
        assert!(validate_login(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Queue simulation").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0, 100).is_ok());
        assert!(validate_price(100, 100).is_ok());
        assert!(validate_price(-1, 100).is_err());
        assert!(validate_price(101, 100).is_err());
    }

    #[test]
    fn test_parse_price_bound() {
        assert_eq!(parse_price_bound(None, 77), Ok(77));
        assert_eq!(parse_price_bound(Some(""), 77), Ok(77));
        assert_eq!(parse_price_bound(Some(" 1500 "), 77), Ok(1500));
        assert!(parse_price_bound(Some("cheap"), 77).is_err());
        assert!(parse_price_bound(Some("1.5"), 77).is_err());
        assert!(parse_price_bound(Some("-3"), 77).is_err());
    }

    #[test]
    fn test_parse_date_bound() {
        assert_eq!(parse_date_bound(None), Ok(None));
        assert_eq!(parse_date_bound(Some("")), Ok(None));
        assert_eq!(
            parse_date_bound(Some("2024-03-05T12:30:00Z")),
            Ok(Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 30, 0).unwrap()))
        );
        assert!(parse_date_bound(Some("2024-03-05")).is_err());
        assert!(parse_date_bound(Some("05.03.2024")).is_err());
    }

    #[test]
    fn test_parse_date_bound_rejects_years_outside_four_digits() {
        assert!(parse_date_bound(Some("+10000-01-01T00:00:00Z")).is_err());
        assert!(parse_date_bound(Some("10000-01-01T00:00:00Z")).is_err());
        assert!(parse_date_bound(Some("-0001-01-01T00:00:00Z")).is_err());
        assert!(parse_date_bound(Some("+2024-03-05T12:30:00Z")).is_err());

        assert!(parse_date_bound(Some("0000-01-01T00:00:00Z")).is_ok());
        assert!(parse_date_bound(Some("9999-12-31T23:59:59Z")).is_ok());
    }
}
