//! Expression scan and alias: value shapes, filters, caching, correlation and scoping.

mod test_data_gen;

use std::sync::Arc;

use serde_json::json;

use quarry_core::annotated::AnnotatedValue;
use quarry_core::expr::{CompareOp, Expr};
use quarry_core::value::Value;
use test_data_gen::*;

fn bound(rows: &[AnnotatedValue], alias: &str) -> Vec<Value> {
    rows.iter().map(|r| r.field(alias)).collect()
}

#[test]
fn arrays_yield_elements_null_yields_one_missing_yields_none() {
    let ctx = ctx();
    let cases = [
        (Value::from(json!([1, 2, 3])), 3),
        (Value::Null, 1),
        (Value::Missing, 0),
        (Value::from(json!({"a": 1})), 1),
        (Value::Int(42), 1),
    ];
    for (value, expected) in cases {
        let op = build(scan_expr("x", Expr::lit(value.clone()), None, false), &ctx);
        let rows = run_stage(&op, &ctx, None, None, 8);
        assert_eq!(rows.len(), expected, "scan over {value}");
    }
}

#[test]
fn filter_keeps_matching_rows() {
    let ctx = ctx();
    let filter = Expr::ident("x").compare(CompareOp::Gt, Expr::lit(Value::Int(2)));
    let op = build(
        scan_expr("x", Expr::lit(Value::from(json!([1, 2, 3, 4, 5]))), Some(filter), false),
        &ctx,
    );
    let rows = run_stage(&op, &ctx, None, None, 8);
    assert_eq!(bound(&rows, "x"), ints(&[Some(3), Some(4), Some(5)]));
}

#[test]
fn cached_replay_matches_first_enumeration() {
    let ctx = ctx();
    let op = build(scan_values("x", ints(&[Some(3), None, Some(1)])), &ctx);
    let first = run_stage(&op, &ctx, None, None, 8);
    assert!(op.reopen());
    let second = run_stage(&op, &ctx, None, None, 8);

    assert_eq!(first.len(), 3);
    assert_eq!(bound(&first, "x"), bound(&second, "x"));
    assert_eq!(first, second);
}

#[test]
fn cache_is_complete_even_when_the_consumer_stops_early() {
    let ctx = ctx();
    let values: Vec<Value> = (0..50).map(Value::Int).collect();
    let op = build(scan_values("x", values), &ctx);

    // First run: the consumer is gone from the start.
    let out = sink(&ctx, 4);
    out.abandon();
    op.wire(None, Some(Arc::clone(&out)));
    op.run(&ctx, None);

    assert!(op.reopen());
    let replay = run_stage(&op, &ctx, None, None, 64);
    assert_eq!(replay.len(), 50);
}

#[test]
fn correlated_scan_reevaluates_against_each_parent() {
    let ctx = ctx();
    let op = build(scan_expr("x", Expr::ident("p").field("xs"), None, true), &ctx);

    let parent = |xs: serde_json::Value| {
        Some(Arc::new(AnnotatedValue::new(Value::from(json!({"p": {"xs": xs}})))))
    };
    let first = run_stage(&op, &ctx, None, parent(json!([1, 2])), 8);
    assert!(op.reopen());
    let second = run_stage(&op, &ctx, None, parent(json!([7, 8, 9])), 8);

    assert_eq!(bound(&first, "x"), ints(&[Some(1), Some(2)]));
    assert_eq!(bound(&second, "x"), ints(&[Some(7), Some(8), Some(9)]));
    // Rows see the parent's fields through their scope.
    assert_eq!(second[0].field("p").field("xs"), Value::from(json!([7, 8, 9])));
}

#[test]
fn evaluation_error_is_reported_and_produces_nothing() {
    let ctx = ctx();
    let expr = Expr::lit(Value::Int(1)).arith(quarry_core::expr::ArithOp::Div, Expr::lit(Value::Int(0)));
    let op = build(scan_expr("x", expr, None, false), &ctx);
    let rows = run_stage(&op, &ctx, None, None, 8);
    assert!(rows.is_empty());
    assert_eq!(ctx.error_count(), 1);
    assert!(!ctx.is_fatal());
}

fn outer_scope() -> Option<quarry_core::annotated::ScopeRef> {
    Some(Arc::new(AnnotatedValue::new(Value::from(json!({ "w": 5 })))))
}

fn docs() -> Vec<AnnotatedValue> {
    [json!({ "a": 1 }), json!({ "a": 2 })]
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let mut row = AnnotatedValue::new(Value::from(v));
            row.set_id(Some(format!("doc{i}")));
            row
        })
        .collect()
}

#[test]
fn alias_wraps_each_row_under_its_name() {
    let ctx = ctx();
    let op = build(alias("d", false), &ctx);
    let rows = run_stage(&op, &ctx, Some(filled_exchange(&ctx, docs())), None, 8);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value(), &Value::from(json!({ "d": { "a": 1 } })));
    assert_eq!(rows[1].value(), &Value::from(json!({ "d": { "a": 2 } })));
    assert_eq!(rows[1].id(), Some("doc1"));
}

#[test]
fn primary_alias_sees_the_enclosing_scope() {
    let ctx = ctx();
    let op = build(alias("d", true), &ctx);
    let rows = run_stage(&op, &ctx, Some(filled_exchange(&ctx, docs())), outer_scope(), 8);

    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.field("w"), Value::Int(5));
        assert!(row.parent().is_some());
    }
    assert_eq!(rows[0].field("d"), Value::from(json!({ "a": 1 })));
}

#[test]
fn non_primary_alias_does_not_see_the_enclosing_scope() {
    let ctx = ctx();
    let op = build(alias("d", false), &ctx);
    let rows = run_stage(&op, &ctx, Some(filled_exchange(&ctx, docs())), outer_scope(), 8);

    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.field("w"), Value::Missing);
        assert!(row.parent().is_none());
    }
}
