//! Client fingerprint rotation
//!
//! Maintains a small pool of realistic client identity profiles and hands
//! one out per request cycle. The rotator never issues the profile that is
//! currently active (when the pool has more than one entry) and cycles
//! through every profile once before any repeats.

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;

/// A bundle of client-identifying attributes presented to the backend
/// to resemble one distinct real user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintProfile {
    /// Full User-Agent string
    pub user_agent: &'static str,

    /// Navigator platform (e.g. `"Win32"`)
    pub platform: &'static str,

    /// Navigator vendor (e.g. `"Google Inc."`)
    pub vendor: &'static str,

    /// Ordered preferred-language tags, most preferred first
    pub languages: &'static [&'static str],

    /// Screen width in pixels
    pub screen_width: u32,

    /// Screen height in pixels
    pub screen_height: u32,

    /// Screen color depth in bits
    pub color_depth: u8,
}

impl FingerprintProfile {
    /// Render the language list as an Accept-Language header value
    /// with descending q-weights
    pub fn accept_language(&self) -> String {
        let mut parts = Vec::with_capacity(self.languages.len());
        for (i, tag) in self.languages.iter().enumerate() {
            if i == 0 {
                parts.push((*tag).to_string());
            } else {
                let q = 1.0 - 0.1 * i as f64;
                parts.push(format!("{tag};q={q:.1}"));
            }
        }
        parts.join(",")
    }
}

/// Static pool of realistic client profiles
pub const PROFILES: &[FingerprintProfile] = &[
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        platform: "Win32",
        vendor: "Google Inc.",
        languages: &["de-DE", "de", "en-US", "en"],
        screen_width: 1920,
        screen_height: 1080,
        color_depth: 24,
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        platform: "MacIntel",
        vendor: "Google Inc.",
        languages: &["de-DE", "de", "en"],
        screen_width: 2560,
        screen_height: 1440,
        color_depth: 30,
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        platform: "Win32",
        vendor: "",
        languages: &["de", "en-US", "en"],
        screen_width: 1680,
        screen_height: 1050,
        color_depth: 24,
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        platform: "MacIntel",
        vendor: "Apple Computer, Inc.",
        languages: &["de-DE", "en-GB", "en"],
        screen_width: 1440,
        screen_height: 900,
        color_depth: 24,
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        platform: "Linux x86_64",
        vendor: "Google Inc.",
        languages: &["de-DE", "de", "en-US"],
        screen_width: 1920,
        screen_height: 1200,
        color_depth: 24,
    },
];

struct RotatorState {
    /// Index of the profile handed out by the last `rotate` call
    active: Option<usize>,

    /// Profiles already issued in the current cycle
    used: Vec<bool>,

    rng: ChaCha8Rng,
}

/// Rotates through the profile pool, one profile per request cycle
///
/// Internally synchronized; safe to share between both polling loops.
pub struct FingerprintRotator {
    pool: &'static [FingerprintProfile],
    state: Mutex<RotatorState>,
}

impl FingerprintRotator {
    /// Create a rotator over the default profile pool
    pub fn new() -> Self {
        Self::with_pool(PROFILES, ChaCha8Rng::from_entropy())
    }

    /// Create a rotator with a fixed seed (deterministic rotation order)
    pub fn with_seed(seed: u64) -> Self {
        Self::with_pool(PROFILES, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Create a rotator over a custom pool
    pub fn with_pool(pool: &'static [FingerprintProfile], rng: ChaCha8Rng) -> Self {
        assert!(!pool.is_empty(), "profile pool must not be empty");
        Self {
            pool,
            state: Mutex::new(RotatorState {
                active: None,
                used: vec![false; pool.len()],
                rng,
            }),
        }
    }

    /// Pick the next profile
    ///
    /// Never returns the currently active profile when the pool has more
    /// than one entry. Once every profile has been issued, the seen set
    /// resets and a new cycle begins.
    pub fn rotate(&self) -> &'static FingerprintProfile {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut candidates: Vec<usize> = (0..self.pool.len())
            .filter(|i| !state.used[*i])
            .collect();

        // Cycle exhausted: start over
        if candidates.is_empty() {
            state.used.fill(false);
            candidates = (0..self.pool.len()).collect();
        }

        // The active profile is always marked used, so mid-cycle it never
        // appears here; after a reset it must be excluded explicitly
        if self.pool.len() > 1 {
            let active = state.active;
            candidates.retain(|i| Some(*i) != active);
        }

        let idx = candidates
            .choose(&mut state.rng)
            .copied()
            .unwrap_or_default();

        state.used[idx] = true;
        state.active = Some(idx);
        &self.pool[idx]
    }

    /// The profile handed out by the most recent `rotate` call
    pub fn active(&self) -> Option<&'static FingerprintProfile> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active.map(|i| &self.pool[i])
    }

    /// Number of profiles in the pool
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

impl Default for FingerprintRotator {
    fn default() -> Self {
        Self::new()
    }
}
