//! Behavioral tests for tally-engine
//!
//! These drive the engine through its public API only, the way a scanner
//! shell would: dispatch events, poll timers, report write outcomes.

use proptest::prelude::*;
use tally_engine::{
    Catalog, Command, CountSessionItem, NetworkHealth, PendingFlush, Quantity, RequestId,
    ScanEngine, ScanEvent, ScanSettings, TrackedItem, WriteError, WriteErrorKind,
};

const COUNT: &str = "7f4c3c1e-2a54-4d0e-9a51-2d7f0d8a9b10";
const MILK: &str = "0b6f1f6a-3c2e-4f7b-8a0d-5e9c1b2a3d4e";
const OATS: &str = "5d2a9c3e-8b7f-4e1a-9c6d-2f3b4a5c6d7e";
const SUGAR: &str = "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d";
const FLOUR: &str = "3c1d2e4f-6a7b-4c8d-9e0f-1a2b3c4d5e6f";

fn catalog() -> Catalog {
    Catalog::new(
        COUNT,
        vec![
            TrackedItem::new(MILK, "Milk 1L").with_barcode("111"),
            TrackedItem::new(OATS, "Oats 500g").with_barcode("222"),
            TrackedItem::new(SUGAR, "Sugar 1kg"),
            // In the global catalog but not part of this count
            TrackedItem::new(FLOUR, "Flour 2kg").with_barcode("444"),
        ],
        vec![
            CountSessionItem::new(COUNT, MILK, 10),
            CountSessionItem::new(COUNT, OATS, 0),
            CountSessionItem::new(COUNT, SUGAR, 0),
        ],
    )
}

fn engine_with(settings: ScanSettings, item: &str) -> ScanEngine {
    let mut engine = ScanEngine::new(settings, catalog()).unwrap();
    engine.dispatch(ScanEvent::item_selected(item), 0);
    engine
}

fn writes(cmds: &[Command]) -> Vec<(RequestId, String, Quantity)> {
    cmds.iter()
        .filter_map(|c| match c {
            Command::ApplyDelta {
                request,
                item_id,
                delta,
                ..
            } => Some((*request, item_id.clone(), *delta)),
            _ => None,
        })
        .collect()
}

fn errors(cmds: &[Command]) -> Vec<String> {
    cmds.iter()
        .filter_map(Command::feedback)
        .filter(|f| f.is_error())
        .map(|f| f.title.clone())
        .collect()
}

fn lost() -> WriteError {
    WriteError::new(WriteErrorKind::ConnectionLost, "Failed to fetch")
}

// ============================================================================
// Dedup
// ============================================================================

#[test]
fn repeat_within_window_changes_nothing() {
    let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
    engine.dispatch(ScanEvent::scan_detected("111"), 100);
    let deadline = engine.next_deadline();

    let cmds = engine.dispatch(ScanEvent::scan_detected("111"), 699);
    assert!(cmds.is_empty());
    assert_eq!(engine.session_increments(), 1);
    assert_eq!(engine.next_deadline(), deadline);

    engine.dispatch(ScanEvent::scan_detected("111"), 700);
    assert_eq!(engine.session_increments(), 2);
}

#[test]
fn different_code_is_not_a_duplicate() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_auto_switch(false), MILK);
    engine.dispatch(ScanEvent::scan_detected("111"), 100);
    let cmds = engine.dispatch(ScanEvent::scan_detected("222"), 110);
    assert!(!cmds.is_empty());
}

// ============================================================================
// Optimistic accumulation
// ============================================================================

#[test]
fn total_updates_without_waiting_on_network() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_qty_per_scan(6), MILK);
    for i in 0..4 {
        engine.dispatch(ScanEvent::scan_detected("111"), i * 1000);
    }
    assert_eq!(engine.session_increments(), 24);
    assert_eq!(engine.displayed_total(), Some(34));

    // A write is in flight and never answered.
    let cmds = engine.poll_timers(3350);
    assert_eq!(writes(&cmds).len(), 1);
    engine.dispatch(ScanEvent::scan_detected("111"), 4000);
    assert_eq!(engine.session_increments(), 30);
    assert_eq!(engine.displayed_total(), Some(40));
}

#[test]
fn burst_is_written_once_after_quiet_period() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_dedupe_ms(0), MILK);
    for t in [0, 50, 100, 150, 200] {
        engine.dispatch(ScanEvent::scan_detected("111"), t);
    }
    assert!(writes(&engine.poll_timers(549)).is_empty());
    assert_eq!(writes(&engine.poll_timers(550)), vec![(1, MILK.to_string(), 5)]);
}

// ============================================================================
// Rollback and confirmation
// ============================================================================

#[test]
fn exhausted_retries_roll_back_to_backup() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_dedupe_ms(0), MILK);
    for t in 0..5 {
        engine.dispatch(ScanEvent::scan_detected("111"), t);
    }
    let cmds = engine.poll_timers(400);
    let (request, _, delta) = writes(&cmds)[0].clone();
    assert_eq!(delta, 5);

    let mut now = 450;
    let mut last = Vec::new();
    for _ in 0..3 {
        last = engine.complete(request, Err(lost()), now);
        if let Some(deadline) = engine.next_deadline() {
            now = deadline;
            let retried = engine.poll_timers(now);
            assert_eq!(writes(&retried), vec![(request, MILK.to_string(), 5)]);
        }
    }

    assert!(!engine.is_persisting());
    assert_eq!(engine.session_increments(), 5);
    assert_eq!(errors(&last), vec!["Connection lost"]);
}

#[test]
fn clear_waits_for_confirmation_delay() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_dedupe_ms(0), MILK);
    for t in 0..3 {
        engine.dispatch(ScanEvent::scan_detected("111"), t);
    }
    let (request, _, _) = writes(&engine.poll_timers(400))[0].clone();
    engine.complete(request, Ok(()), 1000);

    engine.poll_timers(2000);
    assert_eq!(engine.session_increments(), 3);
    assert_eq!(engine.snapshot().unsent_increments, 0);
    assert!(!engine.snapshot().has_unsaved());
    engine.poll_timers(2600);
    assert_eq!(engine.session_increments(), 0);
    assert_eq!(engine.displayed_total(), Some(13));
}

#[test]
fn invalid_id_error_is_not_retried() {
    let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
    engine.dispatch(ScanEvent::scan_detected("111"), 0);
    let (request, _, _) = writes(&engine.poll_timers(350))[0].clone();

    let error = WriteError::from_message("invalid input syntax for type uuid: \"undefined\"");
    let cmds = engine.complete(request, Err(error), 400);
    assert_eq!(errors(&cmds), vec!["Invalid record"]);
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn offline_write_is_kept_for_later() {
    let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
    engine.set_network_health(NetworkHealth::Offline);
    engine.dispatch(ScanEvent::scan_detected("111"), 0);

    let cmds = engine.poll_timers(350);
    assert!(writes(&cmds).is_empty());
    assert_eq!(errors(&cmds), vec!["Connection lost"]);
    assert_eq!(engine.session_increments(), 1);

    engine.set_network_health(NetworkHealth::Online);
    let cmds = engine.retry_pending(5000);
    assert_eq!(writes(&cmds), vec![(2, MILK.to_string(), 1)]);
}

// ============================================================================
// Item switch
// ============================================================================

#[test]
fn switch_flushes_previous_item_and_resets() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_dedupe_ms(0), MILK);
    for t in 0..4 {
        engine.dispatch(ScanEvent::scan_detected("111"), t);
    }

    let cmds = engine.dispatch(ScanEvent::item_selected(OATS), 100);
    assert_eq!(engine.session_increments(), 0);
    let (request, item, delta) = writes(&cmds)[0].clone();
    assert_eq!((item.as_str(), delta), (MILK, 4));

    // The flush outcome does not touch the new item's accumulator.
    engine.dispatch(ScanEvent::scan_detected("222"), 200);
    engine.complete(request, Err(WriteError::from_message("permission denied")), 300);
    assert_eq!(engine.session_increments(), 1);
    assert_eq!(
        engine.pending_flushes(),
        vec![PendingFlush {
            item_id: MILK.to_string(),
            delta: 4
        }]
    );
}

#[test]
fn debounced_write_targets_item_it_was_scanned_for() {
    let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
    engine.dispatch(ScanEvent::scan_detected("111"), 0);
    engine.dispatch(ScanEvent::item_selected(OATS), 100);
    let cmds = engine.poll_timers(1000);
    assert!(writes(&cmds).iter().all(|(_, item, _)| item != OATS));
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn strict_mode_mismatch_changes_nothing() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_auto_select(false), MILK);
    let cmds = engine.dispatch(ScanEvent::scan_detected("222"), 0);

    assert_eq!(errors(&cmds), vec!["Not this item"]);
    assert_eq!(engine.session_increments(), 0);
    assert_eq!(engine.current_item_id().map(String::as_str), Some(MILK));
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn items_outside_session_are_never_matched() {
    let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
    let cmds = engine.dispatch(ScanEvent::scan_detected("444"), 0);
    assert_eq!(errors(&cmds), vec!["Item not in this count"]);
    assert_eq!(engine.current_item_id().map(String::as_str), Some(MILK));
    assert!(engine.catalog().find_in_session("444").is_none());
}

#[test]
fn barcode_less_item_attaches_unknown_code() {
    let mut engine = engine_with(ScanSettings::new(COUNT), SUGAR);
    let cmds = engine.dispatch(ScanEvent::scan_detected("555"), 0);
    assert!(matches!(&cmds[..], [Command::AssignBarcode { code, .. }] if code == "555"));
}

// ============================================================================
// Attachment guard
// ============================================================================

#[test]
fn rapid_repeat_attaches_once() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_dedupe_ms(0), SUGAR);
    let mut assigns = 0;

    let cmds = engine.dispatch(ScanEvent::scan_detected("555"), 0);
    assigns += cmds
        .iter()
        .filter(|c| matches!(c, Command::AssignBarcode { .. }))
        .count();
    let request = cmds[0].request().unwrap();

    // Dropped while the attach is outstanding.
    assert!(engine.dispatch(ScanEvent::scan_detected("555"), 100).is_empty());

    engine.complete(request, Err(lost()), 200);
    let cmds = engine.dispatch(ScanEvent::scan_detected("555"), 800);
    assigns += cmds
        .iter()
        .filter(|c| matches!(c, Command::AssignBarcode { .. }))
        .count();

    assert_eq!(assigns, 1);

    // Past the guard the user may try again.
    let cmds = engine.dispatch(ScanEvent::scan_detected("555"), 1200);
    assert!(matches!(&cmds[..], [Command::AssignBarcode { .. }]));
}

// ============================================================================
// Absolute quantity
// ============================================================================

#[test]
fn set_qty_cancels_delta_waiting_to_retry() {
    let mut engine = engine_with(ScanSettings::new(COUNT).with_dedupe_ms(0), MILK);
    for t in [0, 10, 20] {
        engine.dispatch(ScanEvent::scan_detected("111"), t);
    }
    let cmds = engine.poll_timers(400);
    let (request, _, delta) = writes(&cmds)[0].clone();
    assert_eq!(delta, 3);
    engine.complete(request, Err(lost()), 450);

    let cmds = engine.dispatch(ScanEvent::set_qty(25), 500);
    let set = cmds
        .iter()
        .find(|c| matches!(c, Command::SetAbsolute { .. }))
        .and_then(Command::request)
        .unwrap();
    engine.complete(set, Ok(()), 550);
    assert_eq!(engine.displayed_total(), Some(25));

    assert!(writes(&engine.poll_timers(5000)).is_empty());
    assert!(!engine.is_persisting());
    assert_eq!(engine.displayed_total(), Some(25));
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn reset_discards_unwritten_state() {
    let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
    engine.dispatch(ScanEvent::scan_detected("111"), 0);
    engine.dispatch(ScanEvent::item_selected(OATS), 10);
    engine.reset();

    assert!(engine.pending_flushes().is_empty());
    assert_eq!(engine.next_deadline(), None);
    assert!(!engine.snapshot().has_unsaved());
    assert!(engine.poll_timers(60_000).is_empty());
}

// ============================================================================
// Property-based tests
// ============================================================================

proptest! {
    #[test]
    fn prop_accepted_scans_accumulate(
        scans in 1usize..40,
        qty in 1i64..12,
        gap in 601u64..2000,
    ) {
        let mut engine = engine_with(ScanSettings::new(COUNT).with_qty_per_scan(qty), MILK);
        for i in 0..scans {
            engine.dispatch(ScanEvent::scan_detected("111"), 1 + i as u64 * gap);
        }
        prop_assert_eq!(engine.session_increments(), scans as i64 * qty);
        prop_assert_eq!(engine.displayed_total(), Some(10 + scans as i64 * qty));
    }

    #[test]
    fn prop_repeats_inside_window_are_dropped(
        offsets in prop::collection::vec(0u64..600, 1..20),
    ) {
        let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
        engine.dispatch(ScanEvent::scan_detected("111"), 1000);
        let mut sorted = offsets;
        sorted.sort_unstable();
        for offset in sorted {
            let cmds = engine.dispatch(ScanEvent::scan_detected("111"), 1000 + offset);
            prop_assert!(cmds.is_empty());
        }
        prop_assert_eq!(engine.session_increments(), 1);
    }

    #[test]
    fn prop_same_inputs_same_commands(times in prop::collection::vec(0u64..5000, 1..30)) {
        let mut sorted = times;
        sorted.sort_unstable();

        let run = |times: &[u64]| {
            let mut engine = engine_with(ScanSettings::new(COUNT), MILK);
            let mut out = Vec::new();
            for &t in times {
                out.extend(engine.poll_timers(t));
                out.extend(engine.dispatch(ScanEvent::scan_detected("111"), t));
            }
            out.extend(engine.poll_timers(10_000));
            out
        };
        prop_assert_eq!(run(&sorted), run(&sorted));
    }
}
