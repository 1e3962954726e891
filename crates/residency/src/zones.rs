//! Hot/warm zone computation around the viewport anchor.
//!
//! Pure and stateless: an anchor index plus radii map to two contiguous
//! index ranges clamped to the document. The hot range must be resident;
//! the warm range is the prefetch window and always contains the hot range.

use std::ops::RangeInclusive;

/// Distance-from-anchor priority used to order load scheduling.
///
/// Lower is more urgent; ties are broken by ascending index at the sort
/// sites.
pub fn priority(anchor: usize, index: usize) -> usize {
    anchor.abs_diff(index)
}

/// Contiguous hot and warm index ranges for one residency cycle.
///
/// Zones are recomputed every cycle and never persisted; both ranges are
/// empty when the document has no pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zones {
    hot: Option<(usize, usize)>,
    warm: Option<(usize, usize)>,
}

impl Zones {
    /// Compute zones for `anchor` in a document of `total_pages`.
    ///
    /// The anchor is clamped into the document and the warm radius is raised
    /// to at least the hot radius, so `hot ⊆ warm` always holds.
    pub fn compute(anchor: usize, total_pages: usize, hot_radius: usize, warm_radius: usize) -> Self {
        if total_pages == 0 {
            return Self {
                hot: None,
                warm: None,
            };
        }
        let last = total_pages - 1;
        let anchor = anchor.min(last);
        let warm_radius = warm_radius.max(hot_radius);

        let hot = (
            anchor.saturating_sub(hot_radius),
            (anchor + hot_radius).min(last),
        );
        let warm = (
            anchor.saturating_sub(warm_radius),
            (anchor + warm_radius).min(last),
        );
        Self {
            hot: Some(hot),
            warm: Some(warm),
        }
    }

    /// Empty zones (used while no document is open).
    pub fn empty() -> Self {
        Self {
            hot: None,
            warm: None,
        }
    }

    /// Whether `index` must be resident.
    pub fn hot_contains(&self, index: usize) -> bool {
        matches!(self.hot, Some((start, end)) if (start..=end).contains(&index))
    }

    /// Whether `index` is a prefetch candidate (includes the hot range).
    pub fn warm_contains(&self, index: usize) -> bool {
        matches!(self.warm, Some((start, end)) if (start..=end).contains(&index))
    }

    /// The hot range, if any.
    pub fn hot_range(&self) -> Option<RangeInclusive<usize>> {
        self.hot.map(|(start, end)| start..=end)
    }

    /// The warm range, if any.
    pub fn warm_range(&self) -> Option<RangeInclusive<usize>> {
        self.warm.map(|(start, end)| start..=end)
    }
}
