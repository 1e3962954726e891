//! Viewport metrics and the virtualized offset table.
//!
//! Maintains prefix sums of estimated page heights so the anchor index and
//! scroll targets can be resolved without laying out every page. The table
//! is rebuilt wholesale (never patched incrementally) whenever a dirty
//! version counter changes; the controller coalesces rebuilds to at most one
//! per frame.

use crate::page::PageTable;

/// Widest a page is rendered, regardless of content width.
pub const PAGE_MAX_WIDTH: f32 = 980.0;

/// Vertical padding reserved in fit-height mode.
pub const FIT_HEIGHT_PADDING_PX: f32 = 28.0;

/// Height/width ratio assumed for pages with no known dimensions.
pub const FALLBACK_ASPECT_RATIO: f32 = 1.45;

/// Floor for any estimated slot height.
pub const MIN_FALLBACK_HEIGHT: f32 = 80.0;

/// Margin kept when clamping an in-page offset, so a requested offset can
/// never land on the next page.
const OFFSET_CLAMP_MARGIN_PX: f32 = 2.0;

/// How pages are scaled into the content area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Scale to content width (capped at [`PAGE_MAX_WIDTH`]).
    FitWidth,

    /// Scale so the whole page fits the content height.
    FitHeight,
}

/// Size of the scrollable content area, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentRect {
    pub width: f32,
    pub height: f32,
}

impl ContentRect {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }
}

/// One entry in the offset table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlot {
    /// Top edge in scroll coordinates.
    pub top: f32,

    /// Estimated rendered height.
    pub height: f32,
}

impl PageSlot {
    /// Bottom edge in scroll coordinates.
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// Offset table plus scroll tracking for one reader surface.
#[derive(Debug)]
pub struct ViewportMetrics {
    content: ContentRect,
    fit_mode: FitMode,
    page_gap: f32,
    padding_top: f32,
    slots: Vec<PageSlot>,
    version: u64,
    rebuilt_version: u64,
    scroll_top: f32,
    last_sample_at_ms: u64,
    last_sample_top: f32,
    velocity_px_per_ms: f32,
}

impl ViewportMetrics {
    /// Create metrics for a content area with the given inter-page gap and
    /// top padding. Starts dirty so the first `ensure_ready` builds slots.
    pub fn new(content: ContentRect, page_gap: f32, padding_top: f32) -> Self {
        Self {
            content,
            fit_mode: FitMode::FitWidth,
            page_gap: page_gap.max(0.0),
            padding_top: padding_top.max(0.0),
            slots: Vec::new(),
            version: 1,
            rebuilt_version: 0,
            scroll_top: 0.0,
            last_sample_at_ms: 0,
            last_sample_top: 0.0,
            velocity_px_per_ms: 0.0,
        }
    }

    /// Current fit mode.
    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    /// Switch fit mode; invalidates the offset table.
    pub fn set_fit_mode(&mut self, mode: FitMode) {
        if self.fit_mode != mode {
            self.fit_mode = mode;
            self.mark_dirty();
        }
    }

    /// Update the content area; invalidates the offset table.
    pub fn set_content(&mut self, content: ContentRect) {
        if self.content != content {
            self.content = content;
            self.mark_dirty();
        }
    }

    /// Bump the dirty version so the next `ensure_ready` rebuilds.
    pub fn mark_dirty(&mut self) {
        self.version += 1;
    }

    /// Whether the offset table is out of date.
    pub fn is_dirty(&self) -> bool {
        self.version != self.rebuilt_version
    }

    /// Rebuild the offset table if dirty. Returns `true` when a rebuild ran.
    pub fn ensure_ready(&mut self, table: &mut PageTable) -> bool {
        if !self.is_dirty() {
            return false;
        }
        self.rebuild(table);
        true
    }

    /// Record the latest scroll position reported by the host.
    pub fn record_scroll(&mut self, scroll_top: f32) {
        self.scroll_top = scroll_top.max(0.0);
    }

    /// Current scroll position.
    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    /// Forget scroll position and velocity history (document close).
    pub fn reset_scroll_tracking(&mut self) {
        self.scroll_top = 0.0;
        self.last_sample_at_ms = 0;
        self.last_sample_top = 0.0;
        self.velocity_px_per_ms = 0.0;
    }

    /// Update and return the scroll velocity estimate in px/ms.
    pub fn sample_velocity(&mut self, now_ms: u64) -> f32 {
        if self.last_sample_at_ms > 0 && now_ms > self.last_sample_at_ms {
            let dt = (now_ms - self.last_sample_at_ms) as f32;
            let dy = (self.scroll_top - self.last_sample_top).abs();
            self.velocity_px_per_ms = dy / dt;
        }
        self.last_sample_at_ms = now_ms;
        self.last_sample_top = self.scroll_top;
        self.velocity_px_per_ms
    }

    /// Number of slots in the table.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot for `index`, if present.
    pub fn slot(&self, index: usize) -> Option<PageSlot> {
        self.slots.get(index).copied()
    }

    /// Resolve the anchor page: the page under a fixed point just below the
    /// top padding, found by binary search over the offset table.
    pub fn anchor_index(&self) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        if self.scroll_top <= self.padding_top + 1.0 {
            return Some(0);
        }
        let view_top = self.scroll_top + self.padding_top + 1.0;
        let mut left = 0usize;
        let mut right = self.slots.len() - 1;
        while left <= right {
            let mid = (left + right) / 2;
            if view_top <= self.slots[mid].bottom() {
                if mid == 0 {
                    break;
                }
                right = mid - 1;
            } else {
                left = mid + 1;
            }
        }
        Some(left.min(self.slots.len() - 1))
    }

    /// In-page offset of the current anchor, in pixels.
    pub fn current_offset_px(&self) -> f32 {
        let Some(index) = self.anchor_index() else {
            return 0.0;
        };
        let Some(slot) = self.slot(index) else {
            return 0.0;
        };
        let view_top = self.scroll_top + self.padding_top;
        (view_top - slot.top).max(0.0).round()
    }

    /// Scroll position that puts `index` at the top of the viewport.
    pub fn scroll_target_for(&self, index: usize) -> Option<f32> {
        let slot = self.slot(index)?;
        Some((slot.top - self.padding_top).max(0.0))
    }

    /// Scroll position for `index` plus an in-page offset.
    ///
    /// The offset is clamped to the page's estimated height so the target
    /// can never cross into the next page.
    pub fn scroll_target_with_offset(&self, index: usize, offset_px: f32) -> Option<f32> {
        let slot = self.slot(index)?;
        let max_offset = (slot.height.round() - OFFSET_CLAMP_MARGIN_PX).max(0.0);
        let safe_offset = offset_px.max(0.0).min(max_offset);
        Some((slot.top + safe_offset - self.padding_top).max(0.0))
    }

    fn rebuild(&mut self, table: &mut PageTable) {
        self.rebuilt_version = self.version;
        self.slots.clear();
        if table.is_empty() {
            return;
        }

        let fallback = self.fallback_height();
        let mut known_sum = 0.0f32;
        let mut known_count = 0usize;
        for state in table.iter() {
            if let Some(height) = self.height_from_known(state.known_width, state.known_height) {
                known_sum += height;
                known_count += 1;
            } else if let Some(cached) = state.cached_slot_height {
                if cached > 1.0 {
                    known_sum += cached;
                    known_count += 1;
                }
            }
        }
        let average = if known_count > 0 {
            (known_sum / known_count as f32).round()
        } else {
            fallback
        };

        let mut top = self.padding_top;
        for state in table.iter_mut() {
            let height = self
                .height_from_known(state.known_width, state.known_height)
                .or_else(|| state.cached_slot_height.filter(|h| *h > 1.0))
                .unwrap_or(average.max(MIN_FALLBACK_HEIGHT));
            state.cached_slot_height = Some(height);
            self.slots.push(PageSlot { top, height });
            top += height + self.page_gap;
        }
    }

    /// Estimated rendered height for known natural dimensions under the
    /// current fit mode, or `None` if no dimensions are known.
    fn height_from_known(&self, width: Option<u32>, height: Option<u32>) -> Option<f32> {
        let (width, height) = (width? as f32, height? as f32);
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let scaled = match self.fit_mode {
            FitMode::FitHeight => {
                let max_width = self.content.width;
                let max_height = (self.content.height - FIT_HEIGHT_PADDING_PX).max(0.0);
                let scale = 1.0f32.min(max_width / width).min(max_height / height);
                height * scale
            }
            FitMode::FitWidth => {
                let max_width = self.content.width.min(PAGE_MAX_WIDTH);
                let scale = 1.0f32.min(max_width / width);
                height * scale
            }
        };
        // A zero-sized content area (no resize seen yet) scales everything
        // to nothing; treat that as unknown so the estimation chain falls
        // through to the fallback instead of caching zero heights.
        let rounded = scaled.round();
        if rounded <= 0.0 {
            return None;
        }
        Some(rounded)
    }

    /// Fixed fallback height for pages with no dimension information at all.
    fn fallback_height(&self) -> f32 {
        let estimate = match self.fit_mode {
            FitMode::FitHeight => (self.content.height - FIT_HEIGHT_PADDING_PX).max(0.0),
            FitMode::FitWidth => {
                let width = if self.content.width > 0.0 {
                    self.content.width.min(PAGE_MAX_WIDTH)
                } else {
                    PAGE_MAX_WIDTH
                };
                width * FALLBACK_ASPECT_RATIO
            }
        };
        estimate.round().max(MIN_FALLBACK_HEIGHT)
    }
}
