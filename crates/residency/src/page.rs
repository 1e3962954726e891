//! Per-page lifecycle records and the page-state arena.
//!
//! Page indices are contiguous and bounded, so the table is a dense `Vec`
//! indexed by page index. The table is the single owner of every decoded
//! resource handle and every live cancellation token; releases happen
//! exactly once, guarded by the status transition.

use reader_core::{DecodedImage, PageDescriptor};

use crate::cancel::CancellationToken;
use crate::session::SessionToken;

/// Cap applied to the exponential backoff delay.
pub const RETRY_BACKOFF_CAP_MS: u64 = 5000;

/// Base backoff delay before the first retry.
pub const RETRY_BACKOFF_BASE_MS: u64 = 250;

/// Backoff delay after `retry_count` consecutive failures.
///
/// Capped exponential: `min(5000, 250 · 2^min(retry_count, 4))`.
pub fn retry_backoff_ms(retry_count: u32) -> u64 {
    (RETRY_BACKOFF_BASE_MS << retry_count.min(4)).min(RETRY_BACKOFF_CAP_MS)
}

/// Lifecycle status of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Never loaded in this session.
    Idle,

    /// A fetch is in flight; exactly one live cancellation token exists.
    Loading,

    /// The decoded resource is resident; exactly one handle exists.
    Loaded,

    /// Previously resident; the resource was released.
    Evicted,

    /// The most recent fetch failed; retry gated by `next_retry_at`.
    Error,
}

/// Mutable per-page record owned exclusively by the controller.
#[derive(Debug)]
pub struct PageState {
    /// Page index (mirrors the position in the table).
    pub index: usize,

    /// Logical path handed to the byte-fetch collaborator.
    pub source_path: String,

    /// Current lifecycle status.
    pub status: PageStatus,

    /// Decoded resource; present exactly while `status == Loaded`.
    pub resource: Option<DecodedImage>,

    /// Cancellation token; present exactly while `status == Loading`.
    pub cancellation: Option<CancellationToken>,

    /// Last observed natural width. Survives eviction to avoid layout jitter.
    pub known_width: Option<u32>,

    /// Last observed natural height. Survives eviction.
    pub known_height: Option<u32>,

    /// Last measured/estimated rendered slot height. Survives eviction.
    pub cached_slot_height: Option<f32>,

    /// Timestamp of last hot-zone membership; the eviction clock.
    pub last_visible_at: u64,

    /// When the current/most-recent load started.
    pub last_load_started_at: Option<u64>,

    /// When the most recent load completed.
    pub last_load_completed_at: Option<u64>,

    /// Consecutive fetch failures since the last success.
    pub retry_count: u32,

    /// Earliest timestamp at which an errored page may be re-enqueued.
    pub next_retry_at: Option<u64>,

    /// Session generation under which the current/most-recent load started.
    pub session_at_load: Option<SessionToken>,
}

impl PageState {
    /// Create a fresh record from a descriptor at document-open time.
    pub fn from_descriptor(descriptor: &PageDescriptor, now_ms: u64) -> Self {
        Self {
            index: descriptor.index,
            source_path: descriptor.source_path.clone(),
            status: PageStatus::Idle,
            resource: None,
            cancellation: None,
            known_width: descriptor.known_width,
            known_height: descriptor.known_height,
            cached_slot_height: None,
            last_visible_at: now_ms,
            last_load_started_at: None,
            last_load_completed_at: None,
            retry_count: 0,
            next_retry_at: None,
            session_at_load: None,
        }
    }

    /// Whether this page may be (re-)enqueued for loading right now.
    ///
    /// Pages already loading or loaded are never re-enqueued; errored pages
    /// wait out their backoff.
    pub fn is_load_candidate(&self, now_ms: u64) -> bool {
        match self.status {
            PageStatus::Loading | PageStatus::Loaded => false,
            PageStatus::Idle | PageStatus::Evicted => true,
            PageStatus::Error => self.next_retry_at.map_or(true, |at| now_ms >= at),
        }
    }

    /// Transition into `Loading` with a fresh token.
    pub fn begin_load(&mut self, token: CancellationToken, session: SessionToken, now_ms: u64) {
        debug_assert!(!matches!(self.status, PageStatus::Loading | PageStatus::Loaded));
        self.status = PageStatus::Loading;
        self.cancellation = Some(token);
        self.session_at_load = Some(session);
        self.last_load_started_at = Some(now_ms);
    }

    /// Store the decoded resource and transition into `Loaded`.
    pub fn complete_load(&mut self, image: DecodedImage, now_ms: u64) {
        self.known_width = Some(image.width);
        self.known_height = Some(image.height);
        self.resource = Some(image);
        self.cancellation = None;
        self.status = PageStatus::Loaded;
        self.last_load_completed_at = Some(now_ms);
        self.retry_count = 0;
        self.next_retry_at = None;
    }

    /// Acknowledge a cancelled load: `Loading → Idle`, no retry penalty.
    ///
    /// No-op unless the page is currently loading, so a late acknowledgement
    /// cannot disturb a page that already moved on.
    pub fn cancel_load(&mut self) {
        if self.status != PageStatus::Loading {
            return;
        }
        self.cancellation = None;
        self.status = PageStatus::Idle;
        self.next_retry_at = None;
    }

    /// Record a fetch failure: `Loading → Error` with capped backoff.
    pub fn fail_load(&mut self, now_ms: u64) {
        if self.status != PageStatus::Loading {
            return;
        }
        self.cancellation = None;
        self.status = PageStatus::Error;
        self.retry_count += 1;
        self.next_retry_at = Some(now_ms + retry_backoff_ms(self.retry_count));
    }

    /// Release the resident resource: `Loaded → Evicted`.
    ///
    /// Snapshots natural dimensions from the resource before releasing so
    /// the placeholder reserves the same layout space. Idempotent: evicting
    /// a page that is not loaded returns `false` and changes nothing.
    pub fn evict(&mut self) -> bool {
        if self.status != PageStatus::Loaded {
            return false;
        }
        if let Some(resource) = self.resource.take() {
            self.known_width = Some(resource.width);
            self.known_height = Some(resource.height);
        }
        self.cancellation = None;
        self.session_at_load = None;
        self.status = PageStatus::Evicted;
        true
    }
}

/// Dense arena of page records for one open document.
#[derive(Debug, Default)]
pub struct PageTable {
    pages: Vec<PageState>,
}

impl PageTable {
    /// Empty table (no document open).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh table from the descriptor list at open time.
    ///
    /// Records are stored by position, so descriptor order defines page
    /// order regardless of the `index` fields supplied.
    pub fn from_descriptors(descriptors: &[PageDescriptor], now_ms: u64) -> Self {
        let pages = descriptors
            .iter()
            .enumerate()
            .map(|(position, descriptor)| {
                let mut state = PageState::from_descriptor(descriptor, now_ms);
                state.index = position;
                state
            })
            .collect();
        Self { pages }
    }

    /// Number of pages in the document.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the table holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Record for `index`, if the page exists.
    pub fn get(&self, index: usize) -> Option<&PageState> {
        self.pages.get(index)
    }

    /// Mutable record for `index`, if the page exists.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut PageState> {
        self.pages.get_mut(index)
    }

    /// Iterate over all records in index order.
    pub fn iter(&self) -> impl Iterator<Item = &PageState> {
        self.pages.iter()
    }

    /// Mutable iteration over all records in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageState> {
        self.pages.iter_mut()
    }

    /// Number of pages currently holding a decoded resource.
    pub fn resident_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| page.status == PageStatus::Loaded)
            .count()
    }

    /// Number of pages with a fetch in flight.
    pub fn inflight_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| page.status == PageStatus::Loading)
            .count()
    }
}
