//! Aggressive degradation mode under memory pressure.
//!
//! A graceful-degradation policy, not a hard limit handler: while active it
//! trades prefetch aggressiveness for a faster return under the resident
//! cap by shrinking zones, reducing load concurrency, and capping eviction
//! hysteresis.

use crate::config::ResidencyConfig;

/// Minimum duration aggressive mode stays active after a trigger.
pub const AGGRESSIVE_MODE_MIN_MS: u64 = 8000;

/// Hysteresis cap applied while aggressive mode is active.
pub const AGGRESSIVE_HYSTERESIS_CAP_MS: u64 = 300;

/// Why aggressive mode was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureReason {
    /// Resident count exceeded the configured cap at sweep time.
    ResidentOverCap,

    /// The host forwarded an external memory-pressure signal.
    MemoryPressureHint,
}

impl PressureReason {
    /// Short identifier for instrumentation events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResidentOverCap => "resident_over_cap",
            Self::MemoryPressureHint => "memory_pressure_hint",
        }
    }
}

/// Result of a trigger: a fresh entry or an extension of an active window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Entered,
    Extended,
}

/// Policy parameters effective for a single residency cycle.
///
/// Derived from the base config once per cycle; never read mid-cycle, so
/// scheduling and eviction observe a consistent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub hot_radius: usize,
    pub warm_radius: usize,
    pub max_resident_pages: usize,
    pub max_inflight_loads: usize,
    pub evict_hysteresis_ms: u64,
    pub scroll_velocity_prefetch_cutoff: f32,
    pub aggressive: bool,
}

/// Tracks the aggressive-mode activation window.
#[derive(Debug, Default)]
pub struct AggressiveMode {
    active_until_ms: u64,
}

impl AggressiveMode {
    /// Create with the mode inactive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the mode is active at `now_ms`.
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.active_until_ms
    }

    /// Activate (or re-extend) the window from `now_ms`.
    ///
    /// Re-triggering extends the window from the latest trigger; windows do
    /// not stack. Returns whether this was a fresh entry, so the caller can
    /// record entries exactly once per independent pressure event.
    pub fn trigger(&mut self, now_ms: u64) -> Trigger {
        let was_active = self.is_active(now_ms);
        let next_until = now_ms + AGGRESSIVE_MODE_MIN_MS;
        if next_until > self.active_until_ms {
            self.active_until_ms = next_until;
        }
        if was_active {
            Trigger::Extended
        } else {
            Trigger::Entered
        }
    }

    /// Deactivate immediately (document close).
    pub fn reset(&mut self) {
        self.active_until_ms = 0;
    }

    /// Effective policy for this cycle.
    ///
    /// While active: halves both radii (floor 1, warm floored at hot), drops
    /// one load slot (floor 1), and caps hysteresis at
    /// [`AGGRESSIVE_HYSTERESIS_CAP_MS`].
    pub fn effective_config(&self, base: &ResidencyConfig, now_ms: u64) -> EffectiveConfig {
        if !self.is_active(now_ms) {
            return EffectiveConfig {
                hot_radius: base.hot_radius,
                warm_radius: base.warm_radius,
                max_resident_pages: base.max_resident_pages,
                max_inflight_loads: base.max_inflight_loads,
                evict_hysteresis_ms: base.evict_hysteresis_ms,
                scroll_velocity_prefetch_cutoff: base.scroll_velocity_prefetch_cutoff,
                aggressive: false,
            };
        }
        let hot_radius = (base.hot_radius / 2).max(1);
        EffectiveConfig {
            hot_radius,
            warm_radius: (base.warm_radius / 2).max(hot_radius),
            max_resident_pages: base.max_resident_pages,
            max_inflight_loads: base.max_inflight_loads.saturating_sub(1).max(1),
            evict_hysteresis_ms: base.evict_hysteresis_ms.min(AGGRESSIVE_HYSTERESIS_CAP_MS),
            scroll_velocity_prefetch_cutoff: base.scroll_velocity_prefetch_cutoff,
            aggressive: true,
        }
    }
}
