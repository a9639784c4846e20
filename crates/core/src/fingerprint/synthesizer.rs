//! Weighted, cached browser identity synthesis.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use tracing::debug;

use super::{BrowserArchetype, FingerprintConfig, SessionProfile};
use crate::config::PlatformConfig;

/// Produces the browser identity a session presents.
pub trait HeaderSynthesizer: Send + Sync {
    /// Profile for a platform, stable within the cache window.
    fn profile_for(&self, platform: &str) -> SessionProfile;

    /// A newly drawn profile that also replaces the cached one.
    fn fresh_profile(&self, platform: &str) -> SessionProfile;
}

struct CachedProfile {
    profile: SessionProfile,
    created_at: Instant,
}

pub struct FingerprintSynthesizer {
    ttl: Duration,
    default_weights: Vec<(BrowserArchetype, f64)>,
    platform_weights: HashMap<String, Vec<(BrowserArchetype, f64)>>,
    rng: Mutex<ChaCha8Rng>,
    cache: Mutex<HashMap<String, CachedProfile>>,
}

impl std::fmt::Debug for FingerprintSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintSynthesizer")
            .field("ttl", &self.ttl)
            .field("platforms", &self.platform_weights.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

impl FingerprintSynthesizer {
    /// Build from configuration, seeding from `config.seed` when set.
    pub fn new(config: &FingerprintConfig, platforms: &[PlatformConfig]) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::with_rng(config, platforms, rng)
    }

    pub fn with_seed(config: &FingerprintConfig, platforms: &[PlatformConfig], seed: u64) -> Self {
        Self::with_rng(config, platforms, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(config: &FingerprintConfig, platforms: &[PlatformConfig], rng: ChaCha8Rng) -> Self {
        let platform_weights = platforms
            .iter()
            .filter_map(|p| {
                p.browser_weights
                    .as_ref()
                    .map(|w| (p.id.clone(), w.iter().map(|(a, w)| (*a, *w)).collect()))
            })
            .collect();

        Self {
            ttl: Duration::from_secs(config.cache_ttl_secs),
            default_weights: config.default_weights.iter().map(|(a, w)| (*a, *w)).collect(),
            platform_weights,
            rng: Mutex::new(rng),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Weighted archetype choice for a platform. Unknown platforms use the
    /// default weights; unusable weights fall back to chrome on windows.
    pub fn choose_archetype(&self, platform: &str) -> BrowserArchetype {
        let mut rng = lock(&self.rng);
        self.choose_with(platform, &mut *rng)
    }

    fn choose_with<R: Rng + ?Sized>(&self, platform: &str, rng: &mut R) -> BrowserArchetype {
        let weights = self
            .platform_weights
            .get(platform)
            .unwrap_or(&self.default_weights);

        match WeightedIndex::new(weights.iter().map(|(_, w)| *w)) {
            Ok(dist) => weights[dist.sample(rng)].0,
            Err(_) => BrowserArchetype::ChromeWindows,
        }
    }

    fn generate(&self, platform: &str) -> SessionProfile {
        let mut rng = lock(&self.rng);
        let archetype = self.choose_with(platform, &mut *rng);
        build_profile(archetype, &mut *rng)
    }
}

impl HeaderSynthesizer for FingerprintSynthesizer {
    fn profile_for(&self, platform: &str) -> SessionProfile {
        if let Some(cached) = lock(&self.cache).get(platform) {
            if cached.created_at.elapsed() < self.ttl {
                return cached.profile.clone();
            }
        }
        self.fresh_profile(platform)
    }

    fn fresh_profile(&self, platform: &str) -> SessionProfile {
        let profile = self.generate(platform);
        debug!(
            platform = %platform,
            archetype = %profile.archetype,
            "Synthesized browser profile"
        );
        lock(&self.cache).insert(
            platform.to_string(),
            CachedProfile {
                profile: profile.clone(),
                created_at: Instant::now(),
            },
        );
        profile
    }
}

fn build_profile<R: Rng + ?Sized>(archetype: BrowserArchetype, rng: &mut R) -> SessionProfile {
    let version = rng.gen_range(0..archetype.version_count());
    let viewport = pick(archetype.viewports(), rng).to_string();
    let language = pick(archetype.languages(), rng).to_string();

    let mut headers: Vec<(String, String)> = vec![
        ("User-Agent".into(), archetype.user_agent(version)),
        ("Accept".into(), archetype.accept().into()),
        ("Accept-Language".into(), language.clone()),
        ("Accept-Encoding".into(), "gzip, deflate, br".into()),
        ("DNT".into(), "1".into()),
        ("Connection".into(), "keep-alive".into()),
        ("Upgrade-Insecure-Requests".into(), "1".into()),
        ("Sec-Fetch-Dest".into(), "document".into()),
        ("Sec-Fetch-Mode".into(), "navigate".into()),
        ("Sec-Fetch-User".into(), "?1".into()),
        ("Cache-Control".into(), "max-age=0".into()),
    ];
    headers.extend(
        archetype
            .client_hints(version)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value)),
    );

    SessionProfile {
        archetype,
        user_agent: archetype.user_agent(version),
        // Desktop browsers report the window as the screen size
        screen: viewport.clone(),
        viewport,
        language,
        timezone: pick(archetype.timezones(), rng).to_string(),
        platform: archetype.platform().to_string(),
        hardware_concurrency: *pick(archetype.hardware_concurrency(), rng),
        device_memory_gb: *pick(archetype.device_memory_gb(), rng),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_platforms;
    use std::collections::BTreeMap;

    fn synthesizer(seed: u64) -> FingerprintSynthesizer {
        FingerprintSynthesizer::with_seed(&FingerprintConfig::default(), &default_platforms(), seed)
    }

    #[test]
    fn test_same_seed_same_choices() {
        let a = synthesizer(42);
        let b = synthesizer(42);
        let picks_a: Vec<_> = (0..20).map(|_| a.choose_archetype("barcelona")).collect();
        let picks_b: Vec<_> = (0..20).map(|_| b.choose_archetype("barcelona")).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_profile_cached_within_window() {
        let s = synthesizer(7);
        let first = s.profile_for("real_madrid");
        let second = s.profile_for("real_madrid");
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_expires_after_ttl() {
        let config = FingerprintConfig {
            cache_ttl_secs: 10,
            ..Default::default()
        };
        let s = FingerprintSynthesizer::with_seed(&config, &[], 1);
        s.profile_for("psg");
        tokio::time::advance(Duration::from_secs(11)).await;

        let before = lock(&s.cache).get("psg").map(|c| c.created_at);
        s.profile_for("psg");
        let after = lock(&s.cache).get("psg").map(|c| c.created_at);
        assert_ne!(before, after);
    }

    #[test]
    fn test_unknown_platform_uses_defaults() {
        let s = synthesizer(3);
        let profile = s.profile_for("some_new_club");
        assert!(!profile.user_agent.is_empty());
        assert!(profile.headers.iter().any(|(k, _)| k == "User-Agent"));
    }

    #[test]
    fn test_zero_weights_fall_back_to_chrome_windows() {
        let config = FingerprintConfig {
            default_weights: BrowserArchetype::ALL.iter().map(|a| (*a, 0.0)).collect::<BTreeMap<_, _>>(),
            ..Default::default()
        };
        let s = FingerprintSynthesizer::with_seed(&config, &[], 9);
        assert_eq!(s.choose_archetype("anything"), BrowserArchetype::ChromeWindows);
    }

    #[test]
    fn test_single_weight_always_chosen() {
        let config = FingerprintConfig {
            default_weights: BTreeMap::from([(BrowserArchetype::SafariMac, 1.0)]),
            ..Default::default()
        };
        let s = FingerprintSynthesizer::with_seed(&config, &[], 11);
        for _ in 0..10 {
            assert_eq!(s.choose_archetype("x"), BrowserArchetype::SafariMac);
        }
        let profile = s.fresh_profile("x");
        assert_eq!(profile.platform, "MacIntel");
        assert!(!profile.headers.iter().any(|(k, _)| k.starts_with("sec-ch-ua")));
    }

    #[test]
    fn test_request_headers_referer() {
        let s = synthesizer(5);
        let profile = s.profile_for("juventus");

        let direct = profile.request_headers(None);
        assert!(direct.contains(&("Sec-Fetch-Site".to_string(), "none".to_string())));
        assert!(!direct.iter().any(|(k, _)| k == "Referer"));

        let followed = profile.request_headers(Some("https://www.juventus.com"));
        assert!(followed.contains(&("Sec-Fetch-Site".to_string(), "same-origin".to_string())));
        assert_eq!(followed.last().unwrap().0, "Referer");
        // User-Agent stays first
        assert_eq!(followed[0].0, "User-Agent");
    }
}
