//! Eviction eligibility and candidate ordering.
//!
//! Zone-membership-first, recency-second: only loaded pages outside both
//! zones are ever candidates, and candidates are released longest-idle
//! first. Hysteresis (a minimum out-of-zone dwell time) prevents thrash
//! when a page flickers at the zone boundary.

use crate::aggressive::EffectiveConfig;
use crate::page::{PageState, PageStatus, PageTable};
use crate::zones::Zones;

/// Why a page was evicted, for instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Routine residency update found the page outside the warm zone.
    OutsideWarm,

    /// Aggressive mode forced the page out under memory pressure.
    AggressivePressure,
}

impl EvictReason {
    /// Short identifier for instrumentation events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutsideWarm => "outside_warm",
            Self::AggressivePressure => "aggressive_pressure",
        }
    }
}

/// Whether one page is eligible for eviction this cycle.
///
/// Requires: loaded, outside both zones, past the hysteresis dwell, and
/// either the resident count exceeds the cap or zone residency is being
/// enforced unconditionally.
pub fn should_evict(
    state: &PageState,
    zones: &Zones,
    resident_count: usize,
    config: &EffectiveConfig,
    enforce_zone_residency: bool,
    now_ms: u64,
) -> bool {
    if state.status != PageStatus::Loaded {
        return false;
    }
    if zones.hot_contains(state.index) || zones.warm_contains(state.index) {
        return false;
    }
    let cap = config.max_resident_pages.max(1);
    if resident_count <= cap && !enforce_zone_residency {
        return false;
    }
    now_ms.saturating_sub(state.last_visible_at) >= config.evict_hysteresis_ms
}

/// Eviction candidates ordered longest-idle first, index ascending on ties.
pub fn eviction_candidates(
    table: &PageTable,
    zones: &Zones,
    config: &EffectiveConfig,
    enforce_zone_residency: bool,
    now_ms: u64,
) -> Vec<usize> {
    let resident_count = table.resident_count();
    let mut candidates: Vec<usize> = table
        .iter()
        .filter(|state| {
            should_evict(state, zones, resident_count, config, enforce_zone_residency, now_ms)
        })
        .map(|state| state.index)
        .collect();
    candidates.sort_by_key(|&index| {
        let last_visible_at = table.get(index).map_or(0, |state| state.last_visible_at);
        (last_visible_at, index)
    });
    candidates
}
