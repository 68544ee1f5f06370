//! Shared fixtures: plan builders, hand-driven operators and an in-memory
//! datastore.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use quarry_core::aggregate::Aggregate;
use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::config::ExecConfig;
use quarry_core::expr::Expr;
use quarry_core::plan::{
    AliasSpec, ExpressionScanSpec, GroupSpec, IndexPartition, OrderSpec, PlanNode, PlanOp,
    SortTerm,
};
use quarry_core::value::Value;
use quarry_mem::Pools;
use quarry_operators::{Context, Datastore, IndexError, Indexer, Operator, ValueExchange};

/// Install a test subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn ctx() -> Context {
    Context::builder(ExecConfig::default()).build()
}

/// Context on a dedicated pool set sized from `config`.
pub fn ctx_with(config: ExecConfig) -> Context {
    let pools = Pools::new(&config).expect("valid pool config");
    Context::builder(config).pools(Arc::new(pools)).build()
}

// ----- plan builders -----

pub fn dummy_scan() -> PlanNode {
    PlanNode::new(PlanOp::DummyScan)
}

/// Scan over a literal array; each element is bound to `alias`.
pub fn scan_values(alias: &str, values: Vec<Value>) -> PlanNode {
    scan_expr(alias, Expr::lit(Value::Array(values)), None, false)
}

pub fn scan_expr(alias: &str, expr: Expr, filter: Option<Expr>, correlated: bool) -> PlanNode {
    PlanNode::new(PlanOp::ExpressionScan(Arc::new(ExpressionScanSpec {
        expr,
        alias: alias.to_string(),
        filter,
        correlated,
    })))
}

pub fn alias(name: &str, primary: bool) -> PlanNode {
    PlanNode::new(PlanOp::Alias(Arc::new(AliasSpec {
        alias: name.to_string(),
        primary,
    })))
}

pub fn group_spec(keys: Vec<Expr>, aggregates: Vec<Aggregate>) -> Arc<GroupSpec> {
    Arc::new(GroupSpec { keys, aggregates })
}

pub fn initial_group(spec: &Arc<GroupSpec>) -> PlanNode {
    PlanNode::new(PlanOp::InitialGroup(Arc::clone(spec)))
}

pub fn intermediate_group(spec: &Arc<GroupSpec>) -> PlanNode {
    PlanNode::new(PlanOp::IntermediateGroup(Arc::clone(spec)))
}

pub fn final_group(spec: &Arc<GroupSpec>) -> PlanNode {
    PlanNode::new(PlanOp::FinalGroup(Arc::clone(spec)))
}

pub fn order(terms: Vec<SortTerm>) -> PlanNode {
    PlanNode::new(PlanOp::Order(Arc::new(OrderSpec { terms })))
}

pub fn ints(xs: &[Option<i64>]) -> Vec<Value> {
    xs.iter()
        .map(|x| x.map(Value::Int).unwrap_or(Value::Null))
        .collect()
}

/// `count` rows `{k, v}` cycling through `keys`, with `v = 1..=count`.
pub fn keyed_rows(keys: &[&str], count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| Value::from(json!({ "k": keys[i % keys.len()], "v": (i + 1) as i64 })))
        .collect()
}

// ----- hand-driven operators -----

/// An exchange that already holds `rows` and is closed.
pub fn filled_exchange(ctx: &Context, rows: Vec<AnnotatedValue>) -> Arc<ValueExchange> {
    let x = ValueExchange::new(rows.len().max(1), Arc::clone(ctx.pools()));
    let stop = AtomicBool::new(false);
    for row in rows {
        assert!(x.send(row, &stop));
    }
    x.close_producer();
    x
}

pub fn sink(ctx: &Context, cap: usize) -> Arc<ValueExchange> {
    ValueExchange::new(cap, Arc::clone(ctx.pools()))
}

pub fn drain(x: &ValueExchange) -> Vec<AnnotatedValue> {
    let stop = AtomicBool::new(false);
    std::iter::from_fn(|| x.recv(&stop)).collect()
}

pub fn build(plan: PlanNode, ctx: &Context) -> Arc<Operator> {
    Operator::from_plan(&Arc::new(plan), ctx).expect("plan instantiates")
}

/// Run a single stage on the calling thread over `input`; the sink must be
/// large enough for the whole output.
pub fn run_stage(
    op: &Arc<Operator>,
    ctx: &Context,
    input: Option<Arc<ValueExchange>>,
    parent: Option<ScopeRef>,
    cap: usize,
) -> Vec<AnnotatedValue> {
    let out = sink(ctx, cap);
    op.wire(input, Some(Arc::clone(&out)));
    op.run(ctx, parent);
    drain(&out)
}

// ----- in-memory datastore -----

#[derive(Default)]
pub struct MemoryIndexer {
    pub name: String,
    pub partitions: bool,
    pub created: Mutex<HashSet<String>>,
    pub requests: Mutex<Vec<String>>,
}

impl MemoryIndexer {
    pub fn new(name: &str, partitions: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            partitions,
            ..Default::default()
        })
    }

    pub fn has(&self, index: &str) -> bool {
        self.created.lock().contains(index)
    }
}

impl Indexer for MemoryIndexer {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_partitions(&self) -> bool {
        self.partitions
    }

    fn create_primary_index(
        &self,
        request_id: &str,
        name: &str,
        _partition: Option<&IndexPartition>,
        _with: Option<&Value>,
    ) -> Result<(), IndexError> {
        self.requests.lock().push(request_id.to_string());
        if !self.created.lock().insert(name.to_string()) {
            return Err(IndexError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDatastore {
    indexers: HashMap<(String, String), Arc<MemoryIndexer>>,
}

impl MemoryDatastore {
    pub fn with_indexer(mut self, keyspace: &str, indexer: Arc<MemoryIndexer>) -> Self {
        self.indexers
            .insert((keyspace.to_string(), indexer.name.clone()), indexer);
        self
    }
}

impl Datastore for MemoryDatastore {
    fn indexer(&self, keyspace: &str, using: &str) -> Result<Arc<dyn Indexer>, IndexError> {
        match self.indexers.get(&(keyspace.to_string(), using.to_string())) {
            Some(i) => Ok(Arc::clone(i) as Arc<dyn Indexer>),
            None if self.indexers.keys().any(|(k, _)| k == keyspace) => {
                Err(IndexError::IndexerNotFound(using.to_string()))
            }
            None => Err(IndexError::KeyspaceNotFound(keyspace.to_string())),
        }
    }
}
