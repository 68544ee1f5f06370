use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use quarry::core::aggregate::Aggregate;
use quarry::core::expr::Expr;
use quarry::core::plan::{ExpressionScanSpec, GroupSpec, OrderSpec, PlanNode, PlanOp, SortTerm};
use quarry::{Engine, ExecConfig, RequestOptions, Value};

fn make_rows(rows: usize) -> Value {
    Value::Array(
        (0..rows)
            .map(|i| {
                let mut row = Value::empty_object();
                row.set_field("group", Value::String(format!("group-{}", i % 16)));
                row.set_field("order", Value::Int(((i * 7919) % rows) as i64));
                row.set_field("value", Value::Float((i % 10) as f64));
                row
            })
            .collect(),
    )
}

fn scan(rows: usize) -> PlanNode {
    PlanNode::new(PlanOp::ExpressionScan(Arc::new(ExpressionScanSpec {
        expr: Expr::lit(make_rows(rows)),
        alias: "r".into(),
        filter: None,
        correlated: false,
    })))
}

fn bench_group(c: &mut Criterion) {
    let spec = Arc::new(GroupSpec {
        keys: vec![Expr::ident("r").field("group")],
        aggregates: vec![
            Aggregate::CountStar,
            Aggregate::Sum(Expr::ident("r").field("value")),
            Aggregate::Avg(Expr::ident("r").field("value")),
        ],
    });
    let plan = Arc::new(PlanNode::sequence(vec![
        scan(10_000),
        PlanNode::parallel(PlanNode::new(PlanOp::InitialGroup(Arc::clone(&spec))), 4),
        PlanNode::new(PlanOp::IntermediateGroup(Arc::clone(&spec))),
        PlanNode::new(PlanOp::FinalGroup(spec)),
    ]));
    let engine = Engine::new(ExecConfig::default());
    c.bench_function("group_10k", |b| {
        b.iter(|| {
            let (rows, _) =
                quarry::run_to_completion(&engine, &plan, RequestOptions::default()).unwrap();
            assert_eq!(rows.len(), 16);
        })
    });
}

fn bench_order(c: &mut Criterion) {
    let plan = Arc::new(PlanNode::sequence(vec![
        scan(10_000),
        PlanNode::new(PlanOp::Order(Arc::new(OrderSpec {
            terms: vec![
                SortTerm::asc(Expr::ident("r").field("group")),
                SortTerm::desc(Expr::ident("r").field("order")),
            ],
        }))),
    ]));
    let engine = Engine::new(ExecConfig::default());
    c.bench_function("order_10k", |b| {
        b.iter(|| {
            let (rows, _) =
                quarry::run_to_completion(&engine, &plan, RequestOptions::default()).unwrap();
            assert_eq!(rows.len(), 10_000);
        })
    });
}

criterion_group!(operators, bench_group, bench_order);
criterion_main!(operators);
