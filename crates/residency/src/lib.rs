//! Windowed page-residency and prefetch engine for a paginated reader.
//!
//! Keeps a bounded window of decoded pages resident around the reading
//! position: a hot zone that must be loaded, a warm prefetch zone, a
//! bounded-concurrency load scheduler with capped-exponential retry, and a
//! hysteresis-based eviction sweeper. A virtualized offset table resolves
//! the anchor page and scroll targets from estimated heights, and an
//! aggressive degradation mode tightens the whole policy under memory
//! pressure.
//!
//! The engine is single-threaded and host-driven: the host forwards scroll,
//! resize, and visibility events, calls [`ResidencyController::on_frame`]
//! once per rendering frame and [`ResidencyController::on_sweep_tick`] on
//! the configured interval, performs the actual byte fetches for the
//! [`LoadRequest`]s it is handed, and reports outcomes back through
//! [`ResidencyController::complete_load`].

pub mod aggressive;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod controller;
pub mod page;
pub mod queue;
pub mod session;
pub mod sweep;
pub mod viewport;
pub mod zones;

pub use aggressive::{AggressiveMode, EffectiveConfig, PressureReason};
pub use cancel::CancellationToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ResidencyConfig;
pub use controller::{ControllerOutput, LoadRequest, ResidencyController};
pub use page::{PageState, PageStatus, PageTable};
pub use queue::LoadQueue;
pub use session::{SessionGuard, SessionToken};
pub use sweep::EvictReason;
pub use viewport::{ContentRect, FitMode, PageSlot, ViewportMetrics};
pub use zones::Zones;
