//! Text normalization for prices, currencies, dates and availability labels.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::Availability;
use crate::demand::DemandLevel;

/// Currency assumed when a listing carries none.
pub const DEFAULT_CURRENCY: &str = "EUR";

static PRICE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:[.,\s]\d{3})+|\d+)(?:[.,](\d{1,2}))?").unwrap());

static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:event date|date|when|on)\s*:?\s*").unwrap());

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y",
];

/// Map a currency symbol or code to its ISO code.
pub fn normalize_currency(raw: &str) -> String {
    match raw.trim() {
        "€" => "EUR".to_string(),
        "£" => "GBP".to_string(),
        "$" | "US$" => "USD".to_string(),
        "¥" => "JPY".to_string(),
        "CHF" | "Fr." => "CHF".to_string(),
        "" => DEFAULT_CURRENCY.to_string(),
        other => other.to_uppercase(),
    }
}

/// Detect the currency of a price string from its symbol, if any.
pub fn detect_currency(text: &str) -> Option<String> {
    if text.contains('€') {
        Some("EUR".to_string())
    } else if text.contains('£') {
        Some("GBP".to_string())
    } else if text.contains('$') {
        Some("USD".to_string())
    } else if text.contains('¥') {
        Some("JPY".to_string())
    } else {
        None
    }
}

/// Extract the first price from free text such as `"€1.234,50"` or `"From £45"`.
///
/// Thousands separators may be `.`, `,` or a space; a trailing group of one
/// or two digits is taken as the decimal part.
pub fn parse_price(text: &str) -> Option<f64> {
    let caps = PRICE_PATTERN.captures(text)?;
    let whole: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let mut value: f64 = whole.parse().ok()?;
    if let Some(fraction) = caps.get(2) {
        let digits = fraction.as_str();
        let parsed: f64 = digits.parse().ok()?;
        value += parsed / 10f64.powi(digits.len() as i32);
    }
    Some(value)
}

/// Parse an event date in any of the formats seen on ticketing pages.
pub fn parse_event_date(text: &str) -> Option<NaiveDate> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = DATE_PREFIX.replace(&collapsed, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cleaned, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, format) {
            return Some(date);
        }
    }
    None
}

/// Map a free-text or schema.org availability label onto [`Availability`].
///
/// Sold-out phrases are checked first so that "unavailable" is never read as
/// "available".
pub fn normalize_availability(text: &str) -> Availability {
    let status = text.trim().to_lowercase();
    let status = status.rsplit('/').next().unwrap_or_default();

    const SOLD_OUT: &[&str] = &["sold out", "soldout", "agotado", "ausverkauft", "unavailable", "outofstock", "discontinued"];
    const COMING_SOON: &[&str] = &["coming soon", "pre-sale", "presale", "preorder"];
    const LIMITED: &[&str] = &["limited", "few remaining", "few left", "selling fast"];
    const AVAILABLE: &[&str] = &["available", "on sale", "instock", "in stock", "tickets remaining"];

    let contains_any = |needles: &[&str]| needles.iter().any(|n| status.contains(n));

    if contains_any(SOLD_OUT) {
        Availability::SoldOut
    } else if contains_any(COMING_SOON) {
        Availability::ComingSoon
    } else if contains_any(LIMITED) {
        Availability::Limited
    } else if contains_any(AVAILABLE) {
        Availability::Available
    } else {
        Availability::Unknown
    }
}

/// Demand level implied by a listing's own title and availability.
pub fn title_demand_level(title: &str, availability: Availability) -> DemandLevel {
    let title = title.to_lowercase();

    const EXTREME: &[&str] = &["clásico", "clasico", "final champions", "real madrid vs barcelona"];
    const VERY_HIGH: &[&str] = &["champions league", "derby", "final"];

    if EXTREME.iter().any(|k| title.contains(k)) {
        DemandLevel::Extreme
    } else if VERY_HIGH.iter().any(|k| title.contains(k)) {
        DemandLevel::VeryHigh
    } else if availability == Availability::Limited {
        DemandLevel::High
    } else {
        DemandLevel::Medium
    }
}
