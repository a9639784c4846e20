//! Site-independent parser for schema.org `Event` JSON-LD blocks.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

use super::{DocumentParser, ParseError};
use crate::listing::normalize::{normalize_availability, normalize_currency, parse_price};
use crate::listing::{Availability, CandidateTicket};

static LD_JSON_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .unwrap()
});

/// Extracts events from `<script type="application/ld+json">` blocks.
#[derive(Debug, Clone, Default)]
pub struct JsonLdEventParser;

impl JsonLdEventParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentParser for JsonLdEventParser {
    fn parse(&self, body: &str, platform: &str) -> Result<Vec<CandidateTicket>, ParseError> {
        let mut blocks = 0;
        let mut malformed = 0;
        let mut tickets = Vec::new();

        for caps in LD_JSON_SCRIPT.captures_iter(body) {
            blocks += 1;
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => {
                    let mut events = Vec::new();
                    collect_events(&value, &mut events);
                    tickets.extend(events.into_iter().filter_map(event_to_candidate));
                }
                Err(e) => {
                    malformed += 1;
                    debug!(platform = %platform, error = %e, "Skipping malformed JSON-LD block");
                }
            }
        }

        if blocks > 0 && malformed == blocks {
            return Err(ParseError::Malformed(format!(
                "all {} JSON-LD blocks failed to parse",
                blocks
            )));
        }
        Ok(tickets)
    }
}

fn is_event_type(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t.ends_with("Event"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|t| t.ends_with("Event"))),
        _ => false,
    }
}

fn collect_events<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_events(item, out)),
        Value::Object(map) => {
            if is_event_type(value) {
                out.push(value);
            } else if let Some(graph) = map.get("@graph") {
                collect_events(graph, out);
            }
        }
        _ => {}
    }
}

fn as_price(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}

fn as_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn event_to_candidate(event: &Value) -> Option<CandidateTicket> {
    let title = as_text(event.get("name"))?;

    let venue = match event.get("location") {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(location) => as_text(location.get("name")),
        None => None,
    };

    let offers: Vec<&Value> = match event.get("offers") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(offer @ Value::Object(_)) => vec![offer],
        _ => Vec::new(),
    };

    let mut prices = Vec::new();
    let mut currency = None;
    let mut availability = Availability::Unknown;
    let mut url = as_text(event.get("url"));

    for offer in &offers {
        prices.extend(
            ["price", "lowPrice", "highPrice"]
                .iter()
                .filter_map(|k| as_price(offer.get(*k))),
        );
        if currency.is_none() {
            currency = as_text(offer.get("priceCurrency")).map(|c| normalize_currency(&c));
        }
        if let Some(status) = as_text(offer.get("availability")) {
            let parsed = normalize_availability(&status);
            // Any purchasable offer makes the event available
            if availability != Availability::Available {
                availability = parsed;
            }
        }
        if url.is_none() {
            url = as_text(offer.get("url"));
        }
    }

    let min_price = prices.iter().copied().reduce(f64::min);
    let max_price = prices.iter().copied().reduce(f64::max);

    Some(CandidateTicket {
        title,
        venue,
        date: as_text(event.get("startDate")),
        min_price,
        max_price,
        currency,
        availability,
        url,
    })
}
