//! Runtime configuration for the windowed-residency engine.
//!
//! The config is updatable at any time (e.g. from user settings). Invalid
//! values are clamped into their documented ranges, never rejected, so the
//! controller always stays in an operable state.

use serde::{Deserialize, Serialize};

/// Upper bound on the hot-zone radius.
pub const MAX_HOT_RADIUS: usize = 200;

/// Upper bound on the warm-zone radius.
pub const MAX_WARM_RADIUS: usize = 400;

/// Upper bound on resident pages.
pub const MAX_RESIDENT_PAGES_LIMIT: usize = 2000;

/// Upper bound on concurrent loads.
pub const MAX_INFLIGHT_LOADS_LIMIT: usize = 20;

/// Upper bound on eviction hysteresis.
pub const MAX_EVICT_HYSTERESIS_MS: u64 = 60_000;

/// Sweep interval bounds.
pub const MIN_SWEEP_INTERVAL_MS: u64 = 250;
pub const MAX_SWEEP_INTERVAL_MS: u64 = 120_000;

/// Upper bound on the prefetch velocity cutoff, in px/ms.
pub const MAX_SCROLL_VELOCITY_CUTOFF: f32 = 20.0;

/// Policy knobs for windowed page residency.
///
/// Defaults match the shipping configuration: a small always-resident hot
/// zone, a wider prefetch window, and a resident cap comfortably above the
/// warm-zone size so boundary flicker does not force evictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidencyConfig {
    /// Master switch. When off, every page loads eagerly and nothing evicts.
    ///
    /// A config document that omits this field gets the default (`true`),
    /// the same as every other missing field; disabling residency always
    /// takes an explicit `"enabled": false`.
    pub enabled: bool,

    /// Pages on each side of the anchor that must be resident.
    pub hot_radius: usize,

    /// Pages on each side of the anchor eligible for prefetch (>= hot).
    pub warm_radius: usize,

    /// Cap on simultaneously resident (loaded) pages.
    pub max_resident_pages: usize,

    /// Cap on simultaneously in-flight loads.
    pub max_inflight_loads: usize,

    /// Minimum out-of-zone dwell time before a resident page may be evicted.
    pub evict_hysteresis_ms: u64,

    /// Interval between periodic eviction sweeps.
    pub sweep_interval_ms: u64,

    /// Scroll speed (px/ms) above which warm-zone prefetch is suppressed.
    pub scroll_velocity_prefetch_cutoff: f32,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hot_radius: 2,
            warm_radius: 8,
            max_resident_pages: 16,
            max_inflight_loads: 3,
            evict_hysteresis_ms: 2000,
            sweep_interval_ms: 7000,
            scroll_velocity_prefetch_cutoff: 1.6,
        }
    }
}

impl ResidencyConfig {
    /// Clamp every field into its documented range.
    ///
    /// The warm radius is raised to at least the (clamped) hot radius, and a
    /// non-finite velocity cutoff falls back to the default.
    pub fn normalized(&self) -> Self {
        let hot_radius = self.hot_radius.min(MAX_HOT_RADIUS);
        let warm_radius = self.warm_radius.max(hot_radius).min(MAX_WARM_RADIUS);
        let scroll_velocity_prefetch_cutoff = if self.scroll_velocity_prefetch_cutoff.is_finite() {
            self.scroll_velocity_prefetch_cutoff
                .clamp(0.0, MAX_SCROLL_VELOCITY_CUTOFF)
        } else {
            Self::default().scroll_velocity_prefetch_cutoff
        };

        Self {
            enabled: self.enabled,
            hot_radius,
            warm_radius,
            max_resident_pages: self.max_resident_pages.clamp(1, MAX_RESIDENT_PAGES_LIMIT),
            max_inflight_loads: self.max_inflight_loads.clamp(1, MAX_INFLIGHT_LOADS_LIMIT),
            evict_hysteresis_ms: self.evict_hysteresis_ms.min(MAX_EVICT_HYSTERESIS_MS),
            sweep_interval_ms: self
                .sweep_interval_ms
                .clamp(MIN_SWEEP_INTERVAL_MS, MAX_SWEEP_INTERVAL_MS),
            scroll_velocity_prefetch_cutoff,
        }
    }

    /// Set the hot radius (builder style).
    pub fn with_hot_radius(mut self, radius: usize) -> Self {
        self.hot_radius = radius;
        self
    }

    /// Set the warm radius (builder style).
    pub fn with_warm_radius(mut self, radius: usize) -> Self {
        self.warm_radius = radius;
        self
    }

    /// Set the resident-page cap (builder style).
    pub fn with_max_resident_pages(mut self, cap: usize) -> Self {
        self.max_resident_pages = cap;
        self
    }

    /// Set the in-flight load cap (builder style).
    pub fn with_max_inflight_loads(mut self, cap: usize) -> Self {
        self.max_inflight_loads = cap;
        self
    }

    /// Set the eviction hysteresis (builder style).
    pub fn with_evict_hysteresis_ms(mut self, ms: u64) -> Self {
        self.evict_hysteresis_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ResidencyConfig::default();
        assert!(config.enabled);
        assert_eq!(config.hot_radius, 2);
        assert_eq!(config.warm_radius, 8);
        assert_eq!(config.max_resident_pages, 16);
        assert_eq!(config.max_inflight_loads, 3);
        assert_eq!(config.evict_hysteresis_ms, 2000);
        assert_eq!(config.sweep_interval_ms, 7000);
        assert!((config.scroll_velocity_prefetch_cutoff - 1.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_defaults_are_already_normalized() {
        let config = ResidencyConfig::default();
        assert_eq!(config.normalized(), config);
    }

    #[test]
    fn test_normalized_clamps_extremes() {
        let config = ResidencyConfig {
            enabled: true,
            hot_radius: 10_000,
            warm_radius: 0,
            max_resident_pages: 0,
            max_inflight_loads: 999,
            evict_hysteresis_ms: u64::MAX,
            sweep_interval_ms: 1,
            scroll_velocity_prefetch_cutoff: -4.0,
        }
        .normalized();

        assert_eq!(config.hot_radius, MAX_HOT_RADIUS);
        assert_eq!(config.warm_radius, MAX_HOT_RADIUS); // raised to hot
        assert_eq!(config.max_resident_pages, 1);
        assert_eq!(config.max_inflight_loads, MAX_INFLIGHT_LOADS_LIMIT);
        assert_eq!(config.evict_hysteresis_ms, MAX_EVICT_HYSTERESIS_MS);
        assert_eq!(config.sweep_interval_ms, MIN_SWEEP_INTERVAL_MS);
        assert_eq!(config.scroll_velocity_prefetch_cutoff, 0.0);
    }

    #[test]
    fn test_normalized_replaces_non_finite_cutoff() {
        let config = ResidencyConfig {
            scroll_velocity_prefetch_cutoff: f32::NAN,
            ..ResidencyConfig::default()
        }
        .normalized();
        assert!((config.scroll_velocity_prefetch_cutoff - 1.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_warm_radius_raised_to_hot_radius() {
        let config = ResidencyConfig::default()
            .with_hot_radius(6)
            .with_warm_radius(3)
            .normalized();
        assert_eq!(config.hot_radius, 6);
        assert_eq!(config.warm_radius, 6);
    }

    #[test]
    fn test_missing_serde_fields_take_defaults() {
        let config: ResidencyConfig = serde_json::from_str(r#"{"hot_radius": 4}"#).unwrap();
        assert_eq!(config.hot_radius, 4);
        assert_eq!(config.warm_radius, 8);
        assert!(config.enabled);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ResidencyConfig::default().with_max_resident_pages(5);
        let json = serde_json::to_string(&config).unwrap();
        let back: ResidencyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
