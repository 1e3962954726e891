//! Shared types for the reader page pipeline.
//!
//! This crate holds the leaf types exchanged between the residency engine
//! and its host: page descriptors supplied at open time, opaque decoded-image
//! resources, the fetch-failure taxonomy, load outcomes, and the optional
//! instrumentation sink.

use std::sync::Arc;

use thiserror::Error;

/// Maximum accepted pre-known page dimension in pixels.
pub const MAX_PAGE_DIMENSION: u32 = 100_000;

/// Clamp a pre-known page dimension to the accepted range.
///
/// Returns `None` for dimensions outside `1..=100_000`; callers treat an
/// out-of-range dimension the same as an unknown one.
pub fn normalize_dimension(value: u32) -> Option<u32> {
    if (1..=MAX_PAGE_DIMENSION).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Descriptor for one page, supplied once when a document is opened.
///
/// Descriptors are immutable for the lifetime of an open document. Pre-known
/// dimensions let the viewer reserve layout space before any bytes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Position of this page in the document (contiguous from zero).
    pub index: usize,

    /// Logical path handed to the byte-fetch collaborator.
    pub source_path: String,

    /// Pre-known natural width, if the host already measured it.
    pub known_width: Option<u32>,

    /// Pre-known natural height, if the host already measured it.
    pub known_height: Option<u32>,
}

impl PageDescriptor {
    /// Create a descriptor with no pre-known dimensions.
    pub fn new(index: usize, source_path: impl Into<String>) -> Self {
        Self {
            index,
            source_path: source_path.into(),
            known_width: None,
            known_height: None,
        }
    }

    /// Attach pre-known natural dimensions, normalized to the accepted range.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.known_width = normalize_dimension(width);
        self.known_height = normalize_dimension(height);
        self
    }
}

/// Opaque decoded-image resource for one page.
///
/// The residency engine only manages the lifetime of these handles; it never
/// looks inside the bytes. The page table is the single owner of every
/// handle, and dropping the handle releases the resource.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Natural width in pixels.
    pub width: u32,

    /// Natural height in pixels.
    pub height: u32,

    /// Decoded image bytes.
    pub bytes: Arc<[u8]>,
}

impl DecodedImage {
    /// Wrap decoded bytes with their natural dimensions.
    pub fn new(width: u32, height: u32, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            bytes: bytes.into(),
        }
    }
}

/// Classification of a failed page-byte fetch.
///
/// The classification decides retry-versus-escalation treatment upstream;
/// the engine itself applies the same backoff to every failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The byte store refused the request (e.g. the vault is locked).
    #[error("authorization denied by the byte store")]
    Unauthorized,

    /// The page bytes do not exist at the requested path.
    #[error("page bytes not found")]
    NotFound,

    /// Network or transport-level failure; expected to clear on its own.
    #[error("transient transport failure")]
    Transient,
}

/// Result of one asynchronous page load, reported back by the host.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The fetch completed and the bytes were decoded.
    Loaded(DecodedImage),

    /// The fetch acknowledged a cancellation request. Not a failure.
    Cancelled,

    /// The fetch failed with the given classification.
    Failed(FetchFailure),
}

/// Observational sink for residency counters, gauges, and events.
///
/// Purely diagnostic: the engine behaves identically with the no-op sink.
/// Implementations must be cheap; the engine calls these from its hot path.
pub trait InstrumentationSink {
    /// Increment a named counter.
    fn count(&self, _name: &'static str, _delta: u64) {}

    /// Record the current value of a named gauge.
    fn gauge(&self, _name: &'static str, _value: f64) {}

    /// Record a named event with a short detail string.
    fn event(&self, _name: &'static str, _detail: &str) {}
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl InstrumentationSink for NoopSink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dimension_accepts_valid_range() {
        assert_eq!(normalize_dimension(1), Some(1));
        assert_eq!(normalize_dimension(4096), Some(4096));
        assert_eq!(normalize_dimension(MAX_PAGE_DIMENSION), Some(MAX_PAGE_DIMENSION));
    }

    #[test]
    fn test_normalize_dimension_rejects_out_of_range() {
        assert_eq!(normalize_dimension(0), None);
        assert_eq!(normalize_dimension(MAX_PAGE_DIMENSION + 1), None);
    }

    #[test]
    fn test_descriptor_with_dimensions_normalizes() {
        let page = PageDescriptor::new(3, "pages/003.png").with_dimensions(1200, 0);
        assert_eq!(page.known_width, Some(1200));
        assert_eq!(page.known_height, None);
    }

    #[test]
    fn test_decoded_image_shares_bytes() {
        let image = DecodedImage::new(10, 20, vec![0u8; 16]);
        let clone = image.clone();
        assert!(Arc::ptr_eq(&image.bytes, &clone.bytes));
        assert_eq!(clone.width, 10);
        assert_eq!(clone.height, 20);
    }

    #[test]
    fn test_fetch_failure_messages() {
        assert_eq!(
            FetchFailure::Unauthorized.to_string(),
            "authorization denied by the byte store"
        );
        assert_eq!(FetchFailure::NotFound.to_string(), "page bytes not found");
    }

    #[test]
    fn test_noop_sink_is_silent() {
        let sink = NoopSink;
        sink.count("anything", 1);
        sink.gauge("anything", 1.0);
        sink.event("anything", "detail");
    }
}
