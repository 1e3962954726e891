//! The windowed-residency controller.
//!
//! One instance per open document: owns the page table, load queue,
//! viewport metrics, aggressive-mode window, and session guard. The host
//! drives it cooperatively — scroll/resize/visibility events set a
//! coalescing flag, `on_frame` runs at most one metrics rebuild and one
//! residency cycle per rendering frame, and `on_sweep_tick` fires on the
//! configured interval while the viewer is visible.
//!
//! Loads are handed off the way a job scheduler hands work to a worker:
//! starting a load yields a [`LoadRequest`] carrying a cancellation token
//! and the session token; the host performs the fetch and reports back via
//! [`ResidencyController::complete_load`].

use std::sync::Arc;

use reader_core::{FetchFailure, InstrumentationSink, LoadOutcome, NoopSink, PageDescriptor};
use tracing::{debug, trace};

use crate::aggressive::{AggressiveMode, EffectiveConfig, PressureReason, Trigger};
use crate::cancel::CancellationToken;
use crate::clock::{Clock, SystemClock};
use crate::config::ResidencyConfig;
use crate::page::{PageStatus, PageTable};
use crate::queue::LoadQueue;
use crate::session::{SessionGuard, SessionToken};
use crate::sweep::{self, EvictReason};
use crate::viewport::{ContentRect, FitMode, ViewportMetrics};
use crate::zones::{self, Zones};

/// Default inter-page gap, matching the reader surface's spacing.
pub const DEFAULT_PAGE_GAP: f32 = 16.0;

/// Cap on post-jump scroll re-alignment attempts.
///
/// Deliberately asymmetric with fetch retries: alignment is a
/// layout-settling heuristic and gives up after a few tries, while fetch
/// retries continue indefinitely on backoff.
pub const MAX_ALIGNMENT_ATTEMPTS: u32 = 3;

/// Tolerance below which a scroll position counts as aligned.
const ALIGNMENT_TOLERANCE_PX: f32 = 2.0;

/// A load the host must start: fetch `source_path`, honor `cancellation`,
/// and report the outcome back with `index` and `session`.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub index: usize,
    pub source_path: String,
    pub session: SessionToken,
    pub cancellation: CancellationToken,
}

/// Host actions produced by a controller entry point.
#[derive(Debug, Default)]
pub struct ControllerOutput {
    /// Loads to start, already in scheduling order.
    pub loads: Vec<LoadRequest>,

    /// Scroll position the host should apply, if any.
    pub scroll_to: Option<f32>,
}

#[derive(Debug)]
struct PendingAlignment {
    index: usize,
    attempts: u32,
}

/// Windowed page-residency and prefetch controller.
pub struct ResidencyController {
    config: ResidencyConfig,
    clock: Box<dyn Clock>,
    sink: Arc<dyn InstrumentationSink>,
    on_auth_denied: Option<Box<dyn FnMut(usize)>>,
    sessions: SessionGuard,
    table: PageTable,
    queue: LoadQueue,
    viewport: ViewportMetrics,
    aggressive: AggressiveMode,
    visible: bool,
    document_open: bool,
    update_scheduled: bool,
    pending_alignment: Option<PendingAlignment>,
}

impl ResidencyController {
    /// Create a controller with the given (clamped) configuration.
    pub fn new(config: ResidencyConfig) -> Self {
        Self {
            config: config.normalized(),
            clock: Box::new(SystemClock::new()),
            sink: Arc::new(NoopSink),
            on_auth_denied: None,
            sessions: SessionGuard::new(),
            table: PageTable::new(),
            queue: LoadQueue::new(),
            viewport: ViewportMetrics::new(ContentRect::new(0.0, 0.0), DEFAULT_PAGE_GAP, 0.0),
            aggressive: AggressiveMode::new(),
            visible: true,
            document_open: false,
            update_scheduled: false,
            pending_alignment: None,
        }
    }

    /// Replace the clock (tests use a manually advanced one).
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Attach an instrumentation sink.
    pub fn with_instrumentation(mut self, sink: Arc<dyn InstrumentationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register the callback invoked when a fetch is denied authorization.
    pub fn with_auth_callback(mut self, callback: impl FnMut(usize) + 'static) -> Self {
        self.on_auth_denied = Some(Box::new(callback));
        self
    }

    /// Open a document. Any previous document is torn down first.
    ///
    /// With residency enabled, loads begin on the next `on_frame`. With it
    /// disabled, every page is requested eagerly right away.
    pub fn open(&mut self, pages: &[PageDescriptor]) -> ControllerOutput {
        self.teardown_session();
        let now = self.clock.now_ms();
        self.table = PageTable::from_descriptors(pages, now);
        self.document_open = true;
        self.pending_alignment = None;
        self.viewport.mark_dirty();
        debug!(pages = pages.len(), "reader document opened");

        if !self.config.enabled {
            return ControllerOutput {
                loads: self.start_all_loads(now),
                scroll_to: None,
            };
        }
        self.update_scheduled = true;
        ControllerOutput::default()
    }

    /// Close the current document, cancelling all work and releasing every
    /// resident resource.
    pub fn close(&mut self) {
        self.teardown_session();
        self.table = PageTable::new();
        self.document_open = false;
        self.pending_alignment = None;
        self.viewport.mark_dirty();
        debug!("reader document closed");
    }

    /// Record a scroll position change. Coalesced into the next frame.
    pub fn on_scroll(&mut self, scroll_top: f32) {
        self.viewport.record_scroll(scroll_top);
        self.update_scheduled = true;
    }

    /// Record a content-area resize. Coalesced into the next frame.
    pub fn on_resize(&mut self, content: ContentRect) {
        self.viewport.set_content(content);
        self.update_scheduled = true;
    }

    /// Record a foreground/background visibility change.
    ///
    /// While hidden, sweep ticks are no-ops; returning to the foreground
    /// schedules an immediate cycle.
    pub fn on_visibility_change(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            self.update_scheduled = true;
        }
    }

    /// Frame-aligned batching point: runs at most one metrics rebuild, one
    /// alignment step, and one residency cycle per call.
    pub fn on_frame(&mut self) -> ControllerOutput {
        let mut output = ControllerOutput::default();
        if !self.document_open {
            return output;
        }
        self.rebuild_metrics_if_dirty();
        output.scroll_to = self.step_alignment();
        if self.update_scheduled {
            self.update_scheduled = false;
            output.loads = self.run_cycle();
        }
        output
    }

    /// Periodic sweep entry point. No-op while hidden or disabled.
    pub fn on_sweep_tick(&mut self) -> ControllerOutput {
        if !self.document_open || !self.visible || !self.config.enabled {
            return ControllerOutput::default();
        }
        self.update_scheduled = false;
        ControllerOutput {
            loads: self.run_cycle(),
            scroll_to: None,
        }
    }

    /// Report the outcome of a load previously handed out.
    ///
    /// Stale completions — a prior session, a page no longer in the table,
    /// or a load superseded by a newer one for the same page — are
    /// discarded without mutating page state; the resource (if any) is
    /// dropped on the spot.
    pub fn complete_load(
        &mut self,
        index: usize,
        session: SessionToken,
        outcome: LoadOutcome,
    ) -> ControllerOutput {
        let now = self.clock.now_ms();
        let mut output = ControllerOutput::default();
        if !self.sessions.accepts(session) {
            self.sink.count("residency.loads.stale_discarded", 1);
            return output;
        }
        let Some(state) = self.table.get_mut(index) else {
            self.sink.count("residency.loads.stale_discarded", 1);
            return output;
        };
        if state.session_at_load != Some(session) || state.status != PageStatus::Loading {
            self.sink.count("residency.loads.stale_discarded", 1);
            return output;
        }

        match outcome {
            LoadOutcome::Loaded(image) => {
                state.complete_load(image, now);
                self.sink.count("residency.loads.completed", 1);
                self.viewport.mark_dirty();
                self.update_scheduled = true;
            }
            LoadOutcome::Cancelled => {
                state.cancel_load();
                self.sink.count("residency.loads.aborted", 1);
            }
            LoadOutcome::Failed(kind) => {
                state.fail_load(now);
                self.sink.count("residency.loads.failed", 1);
                if kind == FetchFailure::Unauthorized {
                    self.sink.count("residency.loads.auth_denied", 1);
                    if let Some(callback) = self.on_auth_denied.as_mut() {
                        callback(index);
                    }
                }
            }
        }

        let max_inflight = self
            .aggressive
            .effective_config(&self.config, now)
            .max_inflight_loads;
        output.loads = self.drain_queue(max_inflight, now);
        output
    }

    /// Scroll so `index` sits at the top of the viewport.
    ///
    /// Returns the target scroll position and schedules up to
    /// [`MAX_ALIGNMENT_ATTEMPTS`] re-alignment steps on subsequent frames,
    /// since estimated heights settle as loads complete.
    pub fn scroll_to_index(&mut self, index: usize) -> ControllerOutput {
        let mut output = ControllerOutput::default();
        if self.table.is_empty() {
            return output;
        }
        self.rebuild_metrics_if_dirty();
        let clamped = index.min(self.table.len() - 1);
        if let Some(target) = self.viewport.scroll_target_for(clamped) {
            self.viewport.record_scroll(target);
            self.pending_alignment = Some(PendingAlignment {
                index: clamped,
                attempts: 0,
            });
            self.update_scheduled = true;
            output.scroll_to = Some(target);
        }
        output
    }

    /// Scroll to `index` plus an in-page offset, clamped so the target
    /// never crosses into the next page.
    pub fn scroll_to_index_with_offset(&mut self, index: usize, offset_px: f32) -> ControllerOutput {
        let mut output = ControllerOutput::default();
        if self.table.is_empty() {
            return output;
        }
        self.rebuild_metrics_if_dirty();
        let clamped = index.min(self.table.len() - 1);
        if let Some(target) = self.viewport.scroll_target_with_offset(clamped, offset_px) {
            self.viewport.record_scroll(target);
            self.update_scheduled = true;
            output.scroll_to = Some(target);
        }
        output
    }

    /// The page index currently anchoring the viewport.
    pub fn current_index(&mut self) -> Option<usize> {
        if self.table.is_empty() {
            return None;
        }
        self.rebuild_metrics_if_dirty();
        self.viewport.anchor_index()
    }

    /// In-page scroll offset of the current anchor, in pixels.
    pub fn current_offset_px(&mut self) -> f32 {
        self.rebuild_metrics_if_dirty();
        self.viewport.current_offset_px()
    }

    /// Flip between fit-width and fit-height, re-anchoring on the current
    /// page and offset after the layout change.
    pub fn toggle_fit_mode(&mut self) -> ControllerOutput {
        let anchor = self.current_index();
        let offset = self.viewport.current_offset_px();
        let next = match self.viewport.fit_mode() {
            FitMode::FitWidth => FitMode::FitHeight,
            FitMode::FitHeight => FitMode::FitWidth,
        };
        self.viewport.set_fit_mode(next);

        let mut output = ControllerOutput::default();
        if let Some(anchor) = anchor {
            self.rebuild_metrics_if_dirty();
            if let Some(target) = self.viewport.scroll_target_with_offset(anchor, offset) {
                self.viewport.record_scroll(target);
                output.scroll_to = Some(target);
            }
            self.update_scheduled = true;
        }
        output
    }

    /// Replace the runtime configuration. Fields are clamped, never
    /// rejected; the next cycle uses the new values.
    pub fn set_runtime_config(&mut self, config: ResidencyConfig) {
        self.config = config.normalized();
        self.sink
            .gauge("residency.enabled", if self.config.enabled { 1.0 } else { 0.0 });
        self.update_scheduled = true;
        debug!(
            hot = self.config.hot_radius,
            warm = self.config.warm_radius,
            max_resident = self.config.max_resident_pages,
            "residency config updated"
        );
    }

    /// Forward an external memory-pressure signal.
    pub fn handle_memory_pressure(&mut self, level: &str) {
        if !self.config.enabled {
            return;
        }
        let now = self.clock.now_ms();
        self.sink.count("residency.memory_pressure_hints", 1);
        self.sink.event("residency.memory_pressure_hint", level);
        self.note_pressure(PressureReason::MemoryPressureHint, now);
        self.update_scheduled = true;
    }

    /// Number of pages in the open document.
    pub fn page_count(&self) -> usize {
        self.table.len()
    }

    /// Number of pages currently holding a decoded resource.
    pub fn resident_count(&self) -> usize {
        self.table.resident_count()
    }

    /// Number of loads currently in flight.
    pub fn inflight_count(&self) -> usize {
        self.table.inflight_count()
    }

    /// Lifecycle status of one page.
    pub fn page_status(&self, index: usize) -> Option<PageStatus> {
        self.table.get(index).map(|state| state.status)
    }

    /// The active (clamped) configuration.
    pub fn config(&self) -> &ResidencyConfig {
        &self.config
    }

    /// Interval at which the host should call `on_sweep_tick`.
    pub fn sweep_interval_ms(&self) -> u64 {
        self.config.sweep_interval_ms
    }

    /// Current fit mode.
    pub fn fit_mode(&self) -> FitMode {
        self.viewport.fit_mode()
    }

    /// Whether aggressive mode is active right now.
    pub fn is_aggressive(&self) -> bool {
        self.aggressive.is_active(self.clock.now_ms())
    }

    /// Whether the viewer is in the foreground.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn rebuild_metrics_if_dirty(&mut self) {
        if self.viewport.ensure_ready(&mut self.table) {
            self.sink.count("residency.metrics.rebuilds", 1);
        }
    }

    /// Invalidate the session: cancel every in-flight load, drop queued
    /// work, and reset the aggressive window and scroll tracking. Resident
    /// resources are released when the caller replaces the table.
    fn teardown_session(&mut self) {
        let _ = self.sessions.begin();
        for state in self.table.iter_mut() {
            if let Some(token) = state.cancellation.take() {
                token.cancel();
            }
        }
        let resident = self.table.resident_count();
        if resident > 0 {
            self.sink
                .count("residency.resources.released", resident as u64);
        }
        self.queue.clear();
        self.aggressive.reset();
        self.update_scheduled = false;
        self.viewport.reset_scroll_tracking();
    }

    /// Eager fallback used when windowed residency is disabled: start a
    /// load for every page with no concurrency bound.
    fn start_all_loads(&mut self, now_ms: u64) -> Vec<LoadRequest> {
        let session = self.sessions.current();
        let mut loads = Vec::with_capacity(self.table.len());
        for state in self.table.iter_mut() {
            if !state.is_load_candidate(now_ms) {
                continue;
            }
            let token = CancellationToken::new();
            state.begin_load(token.clone(), session, now_ms);
            loads.push(LoadRequest {
                index: state.index,
                source_path: state.source_path.clone(),
                session,
                cancellation: token,
            });
        }
        self.sink.count("residency.loads.started", loads.len() as u64);
        loads
    }

    fn note_pressure(&mut self, reason: PressureReason, now_ms: u64) {
        match self.aggressive.trigger(now_ms) {
            Trigger::Entered => {
                self.sink.count("residency.aggressive.entries", 1);
                self.sink.event("residency.aggressive.enter", reason.as_str());
                debug!(reason = reason.as_str(), "aggressive mode entered");
            }
            Trigger::Extended => {
                self.sink.event("residency.aggressive.extend", reason.as_str());
            }
        }
        self.sink.gauge("residency.aggressive.active", 1.0);
    }

    /// One residency cycle: resolve the anchor, compute zones once, cancel
    /// strays, enqueue candidates, evict, then drain the queue.
    fn run_cycle(&mut self) -> Vec<LoadRequest> {
        if !self.config.enabled || !self.visible || self.table.is_empty() {
            return Vec::new();
        }
        self.rebuild_metrics_if_dirty();
        let now = self.clock.now_ms();
        let anchor = self
            .viewport
            .anchor_index()
            .unwrap_or(0)
            .min(self.table.len() - 1);

        if self.table.resident_count() > self.config.max_resident_pages {
            self.note_pressure(PressureReason::ResidentOverCap, now);
        }
        let effective = self.aggressive.effective_config(&self.config, now);
        self.sink.gauge(
            "residency.aggressive.active",
            if effective.aggressive { 1.0 } else { 0.0 },
        );
        let zones = Zones::compute(
            anchor,
            self.table.len(),
            effective.hot_radius,
            effective.warm_radius,
        );
        trace!(anchor, aggressive = effective.aggressive, "residency cycle");

        // Hot membership refreshes the eviction clock.
        if let Some(range) = zones.hot_range() {
            for index in range {
                if let Some(state) = self.table.get_mut(index) {
                    state.last_visible_at = now;
                }
            }
        }

        // Cancel loads that fell outside the warm zone. The pages stay
        // `Loading` until the host acknowledges the cancellation.
        let mut cancels = 0u64;
        for state in self.table.iter_mut() {
            if state.status != PageStatus::Loading || zones.warm_contains(state.index) {
                continue;
            }
            if let Some(token) = &state.cancellation {
                if !token.is_cancelled() {
                    token.cancel();
                    cancels += 1;
                }
            }
        }
        if cancels > 0 {
            self.sink.count("residency.loads.cancel_requested", cancels);
        }

        // Classify and priority-sort candidates; hot always enqueues first.
        let mut hot_candidates = Vec::new();
        let mut warm_candidates = Vec::new();
        for state in self.table.iter() {
            if !state.is_load_candidate(now) {
                continue;
            }
            if zones.hot_contains(state.index) {
                hot_candidates.push(state.index);
            } else if zones.warm_contains(state.index) {
                warm_candidates.push(state.index);
            }
        }
        hot_candidates.sort_by_key(|&index| (zones::priority(anchor, index), index));
        warm_candidates.sort_by_key(|&index| (zones::priority(anchor, index), index));

        for index in hot_candidates {
            self.enqueue(index);
        }
        let velocity = self.viewport.sample_velocity(now);
        if velocity <= effective.scroll_velocity_prefetch_cutoff
            && self.table.inflight_count() < effective.max_inflight_loads
            && self.table.resident_count() < effective.max_resident_pages
        {
            for index in warm_candidates {
                self.enqueue(index);
            }
        }

        let reason = if effective.aggressive {
            EvictReason::AggressivePressure
        } else {
            EvictReason::OutsideWarm
        };
        self.apply_evictions(&zones, &effective, reason, now);

        self.sink
            .gauge("residency.resident.current", self.table.resident_count() as f64);
        self.sink
            .gauge("residency.inflight.current", self.table.inflight_count() as f64);
        self.drain_queue(effective.max_inflight_loads, now)
    }

    fn enqueue(&mut self, index: usize) {
        if self.queue.push(index) {
            self.sink.count("residency.loads.enqueued", 1);
        }
    }

    /// Zone-enforcing eviction pass; hysteresis is applied per candidate in
    /// the eligibility check.
    fn apply_evictions(
        &mut self,
        zones: &Zones,
        effective: &EffectiveConfig,
        reason: EvictReason,
        now_ms: u64,
    ) {
        let candidates = sweep::eviction_candidates(&self.table, zones, effective, true, now_ms);
        let mut evicted = 0u64;
        for index in candidates {
            let released = self
                .table
                .get_mut(index)
                .map_or(false, |state| state.evict());
            if released {
                evicted += 1;
                self.sink.event("residency.evict", reason.as_str());
            }
        }
        if evicted > 0 {
            self.sink.count("residency.evictions", evicted);
            self.viewport.mark_dirty();
        }
    }

    /// Start queued loads while an in-flight slot is free, skipping entries
    /// whose page changed status since enqueue.
    fn drain_queue(&mut self, max_inflight: usize, now_ms: u64) -> Vec<LoadRequest> {
        let mut loads = Vec::new();
        while self.table.inflight_count() < max_inflight.max(1) {
            let Some(index) = self.queue.pop() else {
                break;
            };
            let session = self.sessions.current();
            let request = {
                let Some(state) = self.table.get_mut(index) else {
                    continue;
                };
                if !state.is_load_candidate(now_ms) {
                    continue;
                }
                let token = CancellationToken::new();
                state.begin_load(token.clone(), session, now_ms);
                LoadRequest {
                    index,
                    source_path: state.source_path.clone(),
                    session,
                    cancellation: token,
                }
            };
            self.sink.count("residency.loads.started", 1);
            loads.push(request);
        }
        loads
    }

    /// One re-alignment step after a programmatic jump: re-targets the
    /// requested page as estimated heights settle, giving up after
    /// [`MAX_ALIGNMENT_ATTEMPTS`].
    fn step_alignment(&mut self) -> Option<f32> {
        let pending = self.pending_alignment.as_mut()?;
        let Some(target) = self.viewport.scroll_target_for(pending.index) else {
            self.pending_alignment = None;
            return None;
        };
        if (self.viewport.scroll_top() - target).abs() <= ALIGNMENT_TOLERANCE_PX {
            self.pending_alignment = None;
            return None;
        }
        pending.attempts += 1;
        if pending.attempts >= MAX_ALIGNMENT_ATTEMPTS {
            self.pending_alignment = None;
        }
        self.viewport.record_scroll(target);
        Some(target)
    }
}
