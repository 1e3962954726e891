//! End-to-end residency flows driven the way a reader surface drives the
//! controller: events in, load requests out, completions reported back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reader_core::{
    DecodedImage, FetchFailure, InstrumentationSink, LoadOutcome, PageDescriptor,
};
use reader_residency::{
    ContentRect, LoadRequest, ManualClock, PageStatus, ResidencyConfig, ResidencyController,
};

#[derive(Default)]
struct CountingSink {
    counters: Mutex<HashMap<&'static str, u64>>,
    events: Mutex<Vec<(&'static str, String)>>,
}

impl CountingSink {
    fn counter(&self, name: &'static str) -> u64 {
        *self.counters.lock().unwrap().get(name).unwrap_or(&0)
    }

    fn events_named(&self, name: &'static str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, _)| *event == name)
            .map(|(_, detail)| detail.clone())
            .collect()
    }
}

impl InstrumentationSink for CountingSink {
    fn count(&self, name: &'static str, delta: u64) {
        *self.counters.lock().unwrap().entry(name).or_insert(0) += delta;
    }

    fn event(&self, name: &'static str, detail: &str) {
        self.events
            .lock()
            .unwrap()
            .push((name, detail.to_owned()));
    }
}

fn pages(count: usize) -> Vec<PageDescriptor> {
    (0..count)
        .map(|i| PageDescriptor::new(i, format!("pages/{i:03}.png")).with_dimensions(500, 1000))
        .collect()
}

fn image() -> DecodedImage {
    DecodedImage::new(500, 1000, vec![0u8; 4])
}

fn harness(
    config: ResidencyConfig,
) -> (ResidencyController, ManualClock, Arc<CountingSink>) {
    let clock = ManualClock::new();
    let sink = Arc::new(CountingSink::default());
    let mut controller = ResidencyController::new(config)
        .with_clock(clock.clone())
        .with_instrumentation(sink.clone());
    controller.on_resize(ContentRect::new(1000.0, 800.0));
    (controller, clock, sink)
}

fn complete_all(controller: &mut ResidencyController, loads: Vec<LoadRequest>) -> Vec<LoadRequest> {
    let mut follow_ups = Vec::new();
    for load in loads {
        let output = controller.complete_load(load.index, load.session, LoadOutcome::Loaded(image()));
        follow_ups.extend(output.loads);
    }
    follow_ups
}

#[test]
fn bounded_concurrency_drains_queue_in_priority_order() {
    let config = ResidencyConfig::default()
        .with_hot_radius(0)
        .with_warm_radius(2)
        .with_max_inflight_loads(2);
    let (mut controller, _clock, sink) = harness(config);

    controller.open(&pages(5));
    let first = controller.on_frame();

    // Anchor plus two warm pages are wanted, but only two slots exist.
    let started: Vec<usize> = first.loads.iter().map(|load| load.index).collect();
    assert_eq!(started, vec![0, 1]);
    assert_eq!(controller.inflight_count(), 2);
    assert_eq!(sink.counter("residency.loads.enqueued"), 3);
    assert_eq!(sink.counter("residency.loads.started"), 2);

    // Each completion frees a slot and pulls the next queued page.
    let next = complete_all(&mut controller, first.loads);
    let followed: Vec<usize> = next.iter().map(|load| load.index).collect();
    assert_eq!(followed, vec![2]);

    complete_all(&mut controller, next);
    assert_eq!(controller.resident_count(), 3);
    assert_eq!(controller.inflight_count(), 0);
    assert_eq!(sink.counter("residency.loads.completed"), 3);

    // Pages outside the warm zone were never scheduled.
    assert_eq!(controller.page_status(3), Some(PageStatus::Idle));
    assert_eq!(controller.page_status(4), Some(PageStatus::Idle));
}

#[test]
fn jump_far_away_cancels_superseded_loads() {
    let config = ResidencyConfig::default()
        .with_hot_radius(0)
        .with_warm_radius(1)
        .with_max_inflight_loads(4);
    let (mut controller, _clock, sink) = harness(config);

    controller.open(&pages(12));
    let first = controller.on_frame();
    let started: Vec<usize> = first.loads.iter().map(|load| load.index).collect();
    assert_eq!(started, vec![0, 1]);

    controller.scroll_to_index(10);
    let after_jump = controller.on_frame();

    // Both in-flight loads fell outside the new warm zone.
    assert!(first.loads.iter().all(|load| load.cancellation.is_cancelled()));
    assert_eq!(sink.counter("residency.loads.cancel_requested"), 2);

    // The cancelled loads still hold slots until acknowledged, so only two
    // of the three wanted pages start right away.
    let jumped: Vec<usize> = after_jump.loads.iter().map(|load| load.index).collect();
    assert_eq!(jumped, vec![10, 9]);

    // Acknowledged cancellations return the pages to idle with no penalty
    // and free slots for the remaining queued page.
    let mut released = Vec::new();
    for load in first.loads {
        let output = controller.complete_load(load.index, load.session, LoadOutcome::Cancelled);
        released.extend(output.loads);
    }
    let released: Vec<usize> = released.iter().map(|load| load.index).collect();
    assert_eq!(released, vec![11]);
    assert_eq!(controller.page_status(0), Some(PageStatus::Idle));
    assert_eq!(controller.page_status(1), Some(PageStatus::Idle));
    assert_eq!(sink.counter("residency.loads.aborted"), 2);
}

#[test]
fn resident_over_cap_enters_aggressive_mode_and_sheds_pages() {
    let config = ResidencyConfig::default()
        .with_hot_radius(1)
        .with_warm_radius(2)
        .with_max_resident_pages(2)
        .with_max_inflight_loads(4)
        .with_evict_hysteresis_ms(20_000);
    let (mut controller, clock, sink) = harness(config);

    controller.open(&pages(10));
    let first = controller.on_frame();
    complete_all(&mut controller, first.loads);
    assert_eq!(controller.resident_count(), 3);

    // Scroll to the far end after the hysteresis-capped dwell has passed.
    clock.advance(1000);
    controller.scroll_to_index(9);
    let after_jump = controller.on_frame();

    // Over-cap residency triggered aggressive mode exactly once, and the
    // capped hysteresis (not the 20s base) let the old pages go.
    assert!(controller.is_aggressive());
    assert_eq!(sink.counter("residency.aggressive.entries"), 1);
    assert_eq!(sink.events_named("residency.aggressive.enter"), vec!["resident_over_cap"]);
    assert_eq!(controller.resident_count(), 0);
    assert_eq!(sink.counter("residency.evictions"), 3);
    assert_eq!(controller.page_status(0), Some(PageStatus::Evicted));

    // The new hot neighborhood reloads under the reduced in-flight cap.
    let jumped: Vec<usize> = after_jump.loads.iter().map(|load| load.index).collect();
    assert_eq!(jumped, vec![9, 8]);
    complete_all(&mut controller, after_jump.loads);
    assert_eq!(controller.resident_count(), 2);

    // A pressure hint inside the window extends it without a second entry.
    controller.handle_memory_pressure("warning");
    assert_eq!(sink.counter("residency.aggressive.entries"), 1);
    assert_eq!(sink.events_named("residency.aggressive.extend"), vec!["memory_pressure_hint"]);
}

#[test]
fn aggressive_eviction_still_honors_capped_hysteresis_per_page() {
    let config = ResidencyConfig::default()
        .with_hot_radius(1)
        .with_warm_radius(4)
        .with_max_resident_pages(2)
        .with_max_inflight_loads(3)
        .with_evict_hysteresis_ms(20_000);
    let (mut controller, clock, sink) = harness(config);

    controller.open(&pages(10));
    let first = controller.on_frame();
    let started: Vec<usize> = first.loads.iter().map(|load| load.index).collect();
    assert_eq!(started, vec![0, 1, 2]);
    complete_all(&mut controller, first.loads);
    assert_eq!(controller.resident_count(), 3);

    // Over-cap residency enters aggressive mode. Pages 0 and 1 sit in the
    // halved hot zone and get their eviction clocks refreshed; page 2 stays
    // inside the halved warm zone, so nothing is shed yet.
    clock.advance(1000);
    controller.on_scroll(0.0);
    controller.on_frame();
    assert!(controller.is_aggressive());
    assert_eq!(sink.counter("residency.aggressive.entries"), 1);
    assert_eq!(controller.resident_count(), 3);

    // Jump away 100ms later: the 300ms aggressive cap (not the 20s base
    // hysteresis) decides per page. Page 2 has been out of the hot zone for
    // 1100ms and goes; pages 0 and 1 were hot 100ms ago and are retained.
    clock.advance(100);
    controller.scroll_to_index(9);
    controller.on_frame();

    assert_eq!(controller.page_status(2), Some(PageStatus::Evicted));
    assert_eq!(controller.page_status(0), Some(PageStatus::Loaded));
    assert_eq!(controller.page_status(1), Some(PageStatus::Loaded));
    assert_eq!(controller.resident_count(), 2);
    assert_eq!(sink.counter("residency.evictions"), 1);
    // The second over-cap cycle extended the window rather than re-entering.
    assert_eq!(sink.counter("residency.aggressive.entries"), 1);
}

#[test]
fn memory_pressure_hint_is_counted_once_per_signal() {
    let (mut controller, _clock, sink) = harness(ResidencyConfig::default());
    controller.open(&pages(4));
    controller.on_frame();

    controller.handle_memory_pressure("critical");
    assert_eq!(sink.counter("residency.memory_pressure_hints"), 1);
    assert_eq!(
        sink.events_named("residency.memory_pressure_hint"),
        vec!["critical"]
    );
    assert!(controller.is_aggressive());
}

#[test]
fn scroll_to_index_round_trips_through_current_index() {
    let (mut controller, _clock, _sink) = harness(ResidencyConfig::default());
    controller.open(&pages(40));
    controller.on_frame();

    for target in [0usize, 7, 23, 39] {
        let output = controller.scroll_to_index(target);
        assert!(output.scroll_to.is_some());
        controller.on_frame();
        assert_eq!(controller.current_index(), Some(target));
    }
}

#[test]
fn reopening_discards_late_completions_from_the_previous_document() {
    let (mut controller, _clock, sink) = harness(ResidencyConfig::default());
    controller.open(&pages(6));
    let first = controller.on_frame();
    let stale = first.loads[0].clone();

    // The new document reuses the same indices; stale results must not leak
    // into it.
    controller.open(&pages(6));
    controller.complete_load(stale.index, stale.session, LoadOutcome::Loaded(image()));
    assert_eq!(controller.resident_count(), 0);
    assert_eq!(sink.counter("residency.loads.stale_discarded"), 1);

    // The fresh session loads normally.
    let fresh = controller.on_frame();
    assert!(!fresh.loads.is_empty());
    controller.complete_load(
        fresh.loads[0].index,
        fresh.loads[0].session,
        LoadOutcome::Loaded(image()),
    );
    assert_eq!(controller.resident_count(), 1);
}

#[test]
fn failed_loads_retry_after_backoff_and_escalate_auth_denials() {
    let denied = Arc::new(Mutex::new(Vec::new()));
    let seen = denied.clone();
    let clock = ManualClock::new();
    let sink = Arc::new(CountingSink::default());
    let config = ResidencyConfig::default()
        .with_hot_radius(0)
        .with_warm_radius(0)
        .with_max_inflight_loads(1);
    let mut controller = ResidencyController::new(config)
        .with_clock(clock.clone())
        .with_instrumentation(sink.clone())
        .with_auth_callback(move |index| seen.lock().unwrap().push(index));
    controller.on_resize(ContentRect::new(1000.0, 800.0));

    controller.open(&pages(2));
    let first = controller.on_frame();
    let request = first.loads[0].clone();

    controller.complete_load(
        request.index,
        request.session,
        LoadOutcome::Failed(FetchFailure::Unauthorized),
    );
    assert_eq!(denied.lock().unwrap().as_slice(), &[0]);
    assert_eq!(sink.counter("residency.loads.auth_denied"), 1);
    assert_eq!(controller.page_status(0), Some(PageStatus::Error));

    // First retry waits out 250 * 2^1 = 500ms.
    clock.advance(499);
    controller.on_scroll(0.0);
    assert!(controller.on_frame().loads.is_empty());

    clock.advance(1);
    controller.on_scroll(0.0);
    let retry = controller.on_frame();
    assert_eq!(retry.loads.len(), 1);
    assert_eq!(retry.loads[0].index, 0);
    assert_eq!(sink.counter("residency.loads.failed"), 1);
}

#[test]
fn steady_reading_session_keeps_inflight_bounded() {
    let config = ResidencyConfig::default()
        .with_hot_radius(1)
        .with_warm_radius(3)
        .with_max_resident_pages(6)
        .with_max_inflight_loads(2);
    let (mut controller, clock, _sink) = harness(config);
    controller.open(&pages(30));

    let mut pending: Vec<LoadRequest> = Vec::new();
    for step in 0..30 {
        clock.advance(500);
        controller.on_scroll(step as f32 * 1016.0);
        let frame = controller.on_frame();
        assert!(controller.inflight_count() <= 2);
        pending.extend(frame.loads);

        // Acknowledge anything cancelled along the way, then complete one
        // outstanding load per step.
        let mut live = Vec::new();
        for load in pending.drain(..) {
            if load.cancellation.is_cancelled() {
                let output =
                    controller.complete_load(load.index, load.session, LoadOutcome::Cancelled);
                live.extend(output.loads);
            } else {
                live.push(load);
            }
        }
        pending = live;
        if let Some(load) = pending.pop() {
            let output =
                controller.complete_load(load.index, load.session, LoadOutcome::Loaded(image()));
            pending.extend(output.loads);
        }
        assert!(controller.inflight_count() <= 2);
    }

    // Residency stays windowed: far-behind pages were evicted on sweeps.
    clock.advance(10_000);
    controller.on_sweep_tick();
    assert!(controller.resident_count() <= 6);
}

#[test]
fn sweep_tick_evicts_after_hysteresis_without_new_scrolling() {
    let config = ResidencyConfig::default()
        .with_hot_radius(0)
        .with_warm_radius(1)
        .with_max_inflight_loads(4)
        .with_evict_hysteresis_ms(2000);
    let (mut controller, clock, sink) = harness(config);

    controller.open(&pages(12));
    let first = controller.on_frame();
    complete_all(&mut controller, first.loads);
    assert_eq!(controller.resident_count(), 2);

    controller.scroll_to_index(10);
    let jump = controller.on_frame();
    complete_all(&mut controller, jump.loads);

    // Pages 0 and 1 are out of zone but still inside the hysteresis window.
    assert_eq!(controller.page_status(0), Some(PageStatus::Loaded));
    controller.on_sweep_tick();
    assert_eq!(controller.page_status(0), Some(PageStatus::Loaded));

    clock.advance(2500);
    controller.on_sweep_tick();
    assert_eq!(controller.page_status(0), Some(PageStatus::Evicted));
    assert_eq!(controller.page_status(1), Some(PageStatus::Evicted));
    assert!(sink
        .events_named("residency.evict")
        .iter()
        .all(|detail| detail == "outside_warm"));
}
