//! Run-once gate, close discipline, reopen/done and cancellation of the
//! operator lifecycle.

mod test_data_gen;

use std::sync::Arc;
use std::thread;

use quarry_core::annotated::AnnotatedValue;
use quarry_core::value::Value;
use quarry_operators::{Action, OpState, Phase};
use test_data_gen::*;

#[test]
fn dummy_scan_without_parent_emits_one_empty_object_then_closes() {
    init_tracing();
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    let out = sink(&ctx, 4);
    op.wire(None, Some(Arc::clone(&out)));
    op.run(&ctx, None);

    let rows = drain(&out);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value(), &Value::empty_object());
    assert!(rows[0].parent().is_none());
    assert!(out.is_closed());
    assert_eq!(out.close_count(), 1);
    assert_eq!(op.state(), OpState::Stopped);
}

#[test]
fn dummy_scan_row_is_scoped_onto_the_parent() {
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    let parent = Arc::new(AnnotatedValue::new(Value::from(serde_json::json!({"p": 7}))));
    let rows = run_stage(&op, &ctx, None, Some(parent), 4);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field("p"), Value::Int(7));
}

#[test]
fn concurrent_runs_execute_the_body_once() {
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    let out = sink(&ctx, 16);
    op.wire(None, Some(Arc::clone(&out)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (op, ctx) = (Arc::clone(&op), ctx.clone());
            thread::spawn(move || op.run(&ctx, None))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    op.run(&ctx, None);

    assert_eq!(drain(&out).len(), 1);
    assert_eq!(out.close_count(), 1);
    assert_eq!(op.stats().items_out, 1);
}

#[test]
fn done_on_a_never_run_operator_closes_its_output_once() {
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    let out = sink(&ctx, 4);
    op.wire(None, Some(Arc::clone(&out)));

    op.done();
    op.done();
    assert_eq!(op.state(), OpState::Done);
    assert!(out.is_closed());
    assert_eq!(out.close_count(), 1);
    assert!(op.base().is_notified());

    // After done the body never runs and reopen is refused.
    op.run(&ctx, None);
    assert!(drain(&out).is_empty());
    assert!(!op.reopen());
}

#[test]
fn parallel_copies_each_close_their_handle_once() {
    let ctx = ctx();
    let op = build(quarry_core::plan::PlanNode::parallel(dummy_scan(), 3), &ctx);
    assert_eq!(op.children().len(), 3);
    let rows = run_stage(&op, &ctx, None, None, 16);

    assert_eq!(rows.len(), 3);
    for child in op.children() {
        assert_eq!(child.state(), OpState::Stopped);
    }
}

#[test]
fn copy_keeps_the_wiring_with_fresh_state() {
    let ctx = ctx();
    let op = build(alias("a", false), &ctx);
    let input = filled_exchange(&ctx, vec![AnnotatedValue::new(Value::Int(1))]);
    let out = sink(&ctx, 4);
    op.wire(Some(Arc::clone(&input)), Some(Arc::clone(&out)));
    op.run(&ctx, None);
    assert_eq!(op.state(), OpState::Stopped);

    let sibling = op.copy();
    assert_eq!(sibling.state(), OpState::NotStarted);
    assert_eq!(sibling.stats().items_in, 0);
    assert!(Arc::ptr_eq(&sibling.base().input().unwrap(), &input));
    assert!(Arc::ptr_eq(&sibling.base().output().unwrap(), &out));
    assert_ne!(sibling.id(), op.id());
}

#[test]
fn sequence_output_is_closed_by_the_last_child_only() {
    let ctx = ctx();
    let plan = quarry_core::plan::PlanNode::sequence(vec![
        scan_values("x", ints(&[Some(1), Some(2), Some(3)])),
        alias("a", false),
    ]);
    let op = build(plan, &ctx);
    let out = sink(&ctx, 16);
    op.wire(None, Some(Arc::clone(&out)));
    op.run(&ctx, None);

    let rows = drain(&out);
    assert_eq!(rows.len(), 3);
    assert_eq!(out.close_count(), 1);
    assert_eq!(rows[0].value().field("a").field("x"), Value::Int(1));
}

#[test]
fn reopen_resets_a_stopped_operator() {
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    assert_eq!(run_stage(&op, &ctx, None, None, 4).len(), 1);
    assert!(op.reopen());
    assert_eq!(op.state(), OpState::NotStarted);
    assert_eq!(run_stage(&op, &ctx, None, None, 4).len(), 1);
}

#[test]
fn stop_before_run_produces_nothing_but_still_closes() {
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    let out = sink(&ctx, 4);
    op.wire(None, Some(Arc::clone(&out)));
    op.send_action(Action::Stop);
    op.run(&ctx, None);

    assert!(drain(&out).is_empty());
    assert!(out.is_closed());
    assert!(!op.base().is_active());
}

#[test]
fn pause_is_reported_through_the_tree() {
    let ctx = ctx();
    let plan = quarry_core::plan::PlanNode::sequence(vec![dummy_scan(), alias("a", false)]);
    let op = build(plan, &ctx);
    op.send_action(Action::Pause);
    assert!(op.base().is_paused());
    for child in op.children() {
        assert!(child.base().is_paused());
        assert!(!child.base().is_active());
    }
}

#[test]
fn blocked_producer_is_released_by_stop() {
    let ctx = ctx();
    let values: Vec<Value> = (0..1_000).map(Value::Int).collect();
    let op = build(scan_values("x", values), &ctx);
    let out = sink(&ctx, 2);
    op.wire(None, Some(Arc::clone(&out)));

    let runner = {
        let (op, ctx) = (Arc::clone(&op), ctx.clone());
        thread::spawn(move || op.run(&ctx, None))
    };
    let stop = std::sync::atomic::AtomicBool::new(false);
    assert!(out.recv(&stop).is_some());
    op.send_action(Action::Stop);
    runner.join().unwrap();

    assert!(out.is_closed());
    assert!(op.stats().items_out < 1_000);
    assert!(ctx.errors().is_empty());
}

#[test]
fn phases_are_counted_once_per_operator() {
    let ctx = ctx();
    let op = build(dummy_scan(), &ctx);
    run_stage(&op, &ctx, None, None, 4);
    assert_eq!(ctx.phase_operators(Phase::Exec), 1);
    assert_eq!(ctx.phase_operators(Phase::Idle), 0);
}
