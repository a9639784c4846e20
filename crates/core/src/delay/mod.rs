//! Human-plausible inter-request delays.
//!
//! Sampling is a pure function of the pattern, the platform multiplier and an
//! injected random source. [`HumanPacer`] wraps it with a seedable PRNG and a
//! cancellable sleep for use by the session pool and executor.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// What the simulated visitor is doing before the next request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PageLoad,
    Search,
    TicketCheck,
    Navigation,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::PageLoad => "page_load",
            ActionKind::Search => "search",
            ActionKind::TicketCheck => "ticket_check",
            ActionKind::Navigation => "navigation",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Uniform,
    Normal,
    Exponential,
}

/// A bounded delay range and the distribution sampled inside it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DelayPattern {
    pub min_ms: u64,
    pub max_ms: u64,
    pub distribution: Distribution,
}

impl DelayPattern {
    pub const fn new(min_ms: u64, max_ms: u64, distribution: Distribution) -> Self {
        Self {
            min_ms,
            max_ms,
            distribution,
        }
    }
}

/// `[delays]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelayConfig {
    #[serde(default = "default_page_load")]
    pub page_load: DelayPattern,
    #[serde(default = "default_search")]
    pub search: DelayPattern,
    #[serde(default = "default_ticket_check")]
    pub ticket_check: DelayPattern,
    #[serde(default = "default_navigation")]
    pub navigation: DelayPattern,
    /// Fixed PRNG seed for the pacer. Unset means seeded from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_page_load() -> DelayPattern {
    DelayPattern::new(2000, 5000, Distribution::Normal)
}

fn default_search() -> DelayPattern {
    DelayPattern::new(1500, 3500, Distribution::Normal)
}

fn default_ticket_check() -> DelayPattern {
    DelayPattern::new(3000, 8000, Distribution::Exponential)
}

fn default_navigation() -> DelayPattern {
    DelayPattern::new(800, 2000, Distribution::Uniform)
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            page_load: default_page_load(),
            search: default_search(),
            ticket_check: default_ticket_check(),
            navigation: default_navigation(),
            seed: None,
        }
    }
}

impl DelayConfig {
    pub fn pattern(&self, action: ActionKind) -> &DelayPattern {
        match action {
            ActionKind::PageLoad => &self.page_load,
            ActionKind::Search => &self.search,
            ActionKind::TicketCheck => &self.ticket_check,
            ActionKind::Navigation => &self.navigation,
        }
    }

    pub fn patterns(&self) -> [(ActionKind, &DelayPattern); 4] {
        [
            (ActionKind::PageLoad, &self.page_load),
            (ActionKind::Search, &self.search),
            (ActionKind::TicketCheck, &self.ticket_check),
            (ActionKind::Navigation, &self.navigation),
        ]
    }
}

/// Sample a value in `[min_ms, max_ms]` from the pattern's distribution.
pub fn sample_ms<R: Rng + ?Sized>(pattern: &DelayPattern, rng: &mut R) -> u64 {
    let (min, max) = (pattern.min_ms, pattern.max_ms.max(pattern.min_ms));
    if min == max {
        return min;
    }
    let (lo, hi) = (min as f64, max as f64);

    let value = match pattern.distribution {
        Distribution::Uniform => return rng.gen_range(min..=max),
        Distribution::Normal => {
            let mean = (lo + hi) / 2.0;
            let std_dev = (hi - lo) / 6.0;
            mean + std_dev * standard_normal(rng)
        }
        Distribution::Exponential => {
            // Mean offset sits at the middle of the range
            let lambda = 1.0 / ((lo + hi) / 2.0 - lo);
            let u: f64 = rng.gen();
            lo + -(1.0 - u).ln() / lambda
        }
    };

    value.round().clamp(lo, hi) as u64
}

/// Box-Muller transform; both uniforms are drawn fresh on every call.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Scale a sampled delay by a platform multiplier. Non-finite or negative
/// multipliers are treated as 1.0 and 0.0 respectively.
pub fn scaled(ms: u64, multiplier: f64) -> Duration {
    let multiplier = if multiplier.is_finite() {
        multiplier.max(0.0)
    } else {
        1.0
    };
    Duration::from_millis((ms as f64 * multiplier).round() as u64)
}

/// Delay for an action on a platform.
pub fn sample_delay<R: Rng + ?Sized>(
    config: &DelayConfig,
    action: ActionKind,
    multiplier: f64,
    rng: &mut R,
) -> Duration {
    scaled(sample_ms(config.pattern(action), rng), multiplier)
}

/// Jittered backoff before attempt `attempt + 1`.
///
/// The nominal value is `base * multiplier^(attempt-1)`; jitter is drawn
/// from an exponential distribution bounded by the next nominal step.
pub fn backoff_delay<R: Rng + ?Sized>(
    base_ms: u64,
    multiplier: f64,
    attempt: u32,
    rng: &mut R,
) -> Duration {
    let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
    let nominal = base_ms as f64 * multiplier.powi(attempt.saturating_sub(1) as i32);
    let ceiling = nominal * multiplier;
    let pattern = DelayPattern::new(
        nominal.round() as u64,
        ceiling.round() as u64,
        Distribution::Exponential,
    );
    Duration::from_millis(sample_ms(&pattern, rng))
}

/// Pacing capability used between requests.
#[async_trait]
pub trait Delayer: Send + Sync {
    /// Pick the delay for an action, scaled by the platform multiplier.
    fn delay_for(&self, action: ActionKind, multiplier: f64) -> Duration;

    /// Jittered backoff before the next attempt round.
    fn backoff(&self, base_ms: u64, multiplier: f64, attempt: u32) -> Duration;

    /// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// [`Delayer`] backed by a seedable ChaCha PRNG.
pub struct HumanPacer {
    config: DelayConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl std::fmt::Debug for HumanPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanPacer").field("config", &self.config).finish()
    }
}

impl HumanPacer {
    pub fn new(config: DelayConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_seed(config: DelayConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl Delayer for HumanPacer {
    fn delay_for(&self, action: ActionKind, multiplier: f64) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let delay = sample_delay(&self.config, action, multiplier, &mut *rng);
        trace!(action = action.as_str(), delay_ms = delay.as_millis() as u64, "Pacing delay");
        delay
    }

    fn backoff(&self, base_ms: u64, multiplier: f64, attempt: u32) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        backoff_delay(base_ms, multiplier, attempt, &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn test_samples_stay_in_range() {
        let config = DelayConfig::default();
        let mut rng = rng(1);
        for (_, pattern) in config.patterns() {
            for _ in 0..500 {
                let ms = sample_ms(pattern, &mut rng);
                assert!(ms >= pattern.min_ms && ms <= pattern.max_ms, "{ms} outside {pattern:?}");
            }
        }
    }

    #[test]
    fn test_sampling_is_deterministic_for_seed() {
        let config = DelayConfig::default();
        let a: Vec<_> = {
            let mut r = rng(99);
            (0..10).map(|_| sample_delay(&config, ActionKind::TicketCheck, 1.3, &mut r)).collect()
        };
        let b: Vec<_> = {
            let mut r = rng(99);
            (0..10).map(|_| sample_delay(&config, ActionKind::TicketCheck, 1.3, &mut r)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_multiplier_scales_after_bounding() {
        let pattern = DelayPattern::new(1000, 1000, Distribution::Normal);
        assert_eq!(sample_ms(&pattern, &mut rng(0)), 1000);
        assert_eq!(scaled(1000, 1.4), Duration::from_millis(1400));
        assert_eq!(scaled(1000, -2.0), Duration::ZERO);
        assert_eq!(scaled(1000, f64::NAN), Duration::from_millis(1000));
    }

    #[test]
    fn test_inverted_range_is_clamped_to_min() {
        let pattern = DelayPattern::new(500, 100, Distribution::Uniform);
        assert_eq!(sample_ms(&pattern, &mut rng(0)), 500);
    }

    #[test]
    fn test_backoff_within_nominal_step() {
        let mut r = rng(4);
        for attempt in 1..=6 {
            let nominal = 1000.0 * 1.5f64.powi(attempt as i32 - 1);
            let d = backoff_delay(1000, 1.5, attempt, &mut r).as_millis() as f64;
            assert!(d >= nominal.round() && d <= (nominal * 1.5).round(), "attempt {attempt}: {d}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_cancellable() {
        let pacer = HumanPacer::with_seed(DelayConfig::default(), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!pacer.pause(Duration::from_secs(60), &cancel).await);

        let live = CancellationToken::new();
        assert!(pacer.pause(Duration::from_millis(10), &live).await);
    }
}
