//! Locale-tolerant currency string parsing
//!
//! Notifications mix `1.234,56` and `1,234.56`, and sometimes drop the
//! decimals altogether (`1.234`). Parsing first tries "separators plus a
//! final 2-digit decimal group" and only then falls back to "whole number".
//! The order is fixed: strings such as `1.234` are read differently by the
//! two branches.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

static WITH_DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<integer>[0-9\.,]+)[\.,](?P<decimal>[0-9]{2})$").expect("valid currency pattern")
});

static WITHOUT_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<integer>[0-9\.,]+)").expect("valid currency pattern"));

fn strip_separators(integer: &str) -> String {
    integer.chars().filter(|c| *c != ',' && *c != '.').collect()
}

fn with_decimal(text: &str) -> Option<String> {
    let captures = WITH_DECIMAL.captures(text)?;
    let mut integer = strip_separators(captures.name("integer")?.as_str());
    let decimal = captures.name("decimal")?.as_str();
    if integer.is_empty() {
        integer.push('0');
    }

    Some(format!("{integer}.{decimal}"))
}

fn without_decimal(text: &str) -> Option<String> {
    let captures = WITHOUT_DECIMAL.captures(text)?;
    let integer = strip_separators(captures.name("integer")?.as_str());
    if integer.is_empty() {
        return None;
    }

    Some(format!("{integer}.0"))
}

/// Parse a currency string regardless of its separator convention
///
/// Returns `None` when neither convention yields a number.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let normalized = with_decimal(text).or_else(|| without_decimal(text))?;

    Decimal::from_str(&normalized).ok()
}
