use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::normalize;
use crate::demand::DemandLevel;

/// Availability of a listing as reported by a platform.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Limited,
    SoldOut,
    ComingSoon,
    #[default]
    Unknown,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Limited => "limited",
            Availability::SoldOut => "sold_out",
            Availability::ComingSoon => "coming_soon",
            Availability::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller is looking for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScrapeCriteria {
    /// Free-text keyword(s), also used for demand classification.
    pub keyword: String,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Target platforms. Empty means "the platforms of the matched demand profile".
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub include_sold_out: bool,
}

impl ScrapeCriteria {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_price(mut self, max_price: f64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn including_sold_out(mut self) -> Self {
        self.include_sold_out = true;
        self
    }

    /// Whether a parsed candidate satisfies the price, date and availability filters.
    ///
    /// Candidates without a price or a parseable date are kept; filters only
    /// reject what they can prove is out of range.
    pub fn admits(&self, candidate: &CandidateTicket) -> bool {
        if !self.include_sold_out && candidate.availability == Availability::SoldOut {
            return false;
        }

        if let (Some(limit), Some(price)) = (self.max_price, candidate.min_price) {
            if price > limit {
                return false;
            }
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            if let Some(date) = candidate.date.as_deref().and_then(normalize::parse_event_date) {
                if self.date_from.is_some_and(|from| date < from) {
                    return false;
                }
                if self.date_to.is_some_and(|to| date > to) {
                    return false;
                }
            }
        }

        true
    }
}

/// A listing as extracted from a document, before it is attributed to a
/// session and classified.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateTicket {
    pub title: String,
    pub venue: Option<String>,
    /// Event date as found on the page.
    pub date: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub currency: Option<String>,
    pub availability: Availability,
    pub url: Option<String>,
}

impl CandidateTicket {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A normalized listing attributed to the platform and session that found it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedTicket {
    pub title: String,
    pub venue: Option<String>,
    pub date: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub currency: String,
    pub availability: Availability,
    pub demand_level: DemandLevel,
    pub platform: String,
    pub session_id: String,
    pub url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedTicket {
    /// Attribute a candidate to the session that found it.
    pub fn from_candidate(
        candidate: CandidateTicket,
        platform: &str,
        session_id: &str,
        demand_level: DemandLevel,
    ) -> Self {
        let currency = candidate
            .currency
            .as_deref()
            .map(normalize::normalize_currency)
            .unwrap_or_else(|| normalize::DEFAULT_CURRENCY.to_string());

        Self {
            title: candidate.title.trim().to_string(),
            venue: candidate.venue,
            date: candidate.date,
            min_price: candidate.min_price,
            max_price: candidate.max_price.or(candidate.min_price),
            currency,
            availability: candidate.availability,
            demand_level,
            platform: platform.to_string(),
            session_id: session_id.to_string(),
            url: candidate.url,
            scraped_at: Utc::now(),
        }
    }

    /// Identity used for cross-session and cross-platform deduplication.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.title.trim().to_lowercase(),
            self.date.as_deref().unwrap_or_default().trim().to_string(),
        )
    }
}
