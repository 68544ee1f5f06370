//! Immutable, serializable plan tree handed over by the planner.
//!
//! Stage parameters sit behind `Arc` so every parallel copy of an operator
//! shares one plan description. Composition is explicit: a `Sequence` chains
//! its children producer-to-consumer, a `Parallel` fans one child out into
//! sibling copies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    #[serde(flatten)]
    pub op: PlanOp,
    /// Optimizer estimates, echoed on the profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "#operator")]
pub enum PlanOp {
    DummyScan,
    ExpressionScan(Arc<ExpressionScanSpec>),
    Alias(Arc<AliasSpec>),
    InitialGroup(Arc<GroupSpec>),
    IntermediateGroup(Arc<GroupSpec>),
    FinalGroup(Arc<GroupSpec>),
    Order(Arc<OrderSpec>),
    CreatePrimaryIndex(Arc<PrimaryIndexSpec>),
    Sequence {
        #[serde(rename = "~children")]
        children: Vec<Arc<PlanNode>>,
    },
    Parallel {
        #[serde(rename = "~child")]
        child: Arc<PlanNode>,
        /// Number of sibling copies; 0 means "use the configured default".
        #[serde(default)]
        max_parallelism: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionScanSpec {
    pub expr: Expr,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    /// Correlated expressions depend on the parent row and are never cached.
    #[serde(default)]
    pub correlated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasSpec {
    pub alias: String,
    /// Primary term: the new row becomes a nested scope of the parent value.
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub keys: Vec<Expr>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortTerm {
    pub expr: Expr,
    #[serde(default)]
    pub descending: bool,
    /// `None` takes the default placement for the direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls_last: Option<bool>,
}

impl SortTerm {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_last: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            nulls_last: None,
        }
    }

    pub fn with_nulls_last(mut self, nulls_last: bool) -> Self {
        self.nulls_last = Some(nulls_last);
        self
    }

    /// NULLS FIRST for ascending, NULLS LAST for descending unless overridden.
    pub fn resolved_nulls_last(&self) -> bool {
        self.nulls_last.unwrap_or(self.descending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub terms: Vec<SortTerm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPartition {
    pub strategy: String,
    pub exprs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryIndexSpec {
    pub keyspace: String,
    pub name: String,
    #[serde(default = "default_using")]
    pub using: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<IndexPartition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Value>,
    #[serde(default)]
    pub fail_if_exists: bool,
}

fn default_using() -> String {
    "gsi".to_string()
}

impl PlanNode {
    pub fn new(op: PlanOp) -> Self {
        Self {
            op,
            cost: None,
            cardinality: None,
        }
    }

    pub fn with_estimates(mut self, cost: f64, cardinality: f64) -> Self {
        self.cost = Some(cost);
        self.cardinality = Some(cardinality);
        self
    }

    pub fn sequence(children: Vec<PlanNode>) -> Self {
        Self::new(PlanOp::Sequence {
            children: children.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn parallel(child: PlanNode, max_parallelism: usize) -> Self {
        Self::new(PlanOp::Parallel {
            child: Arc::new(child),
            max_parallelism,
        })
    }

    /// Operator name as rendered under `#operator`.
    pub fn kind_name(&self) -> &'static str {
        match &self.op {
            PlanOp::DummyScan => "DummyScan",
            PlanOp::ExpressionScan(_) => "ExpressionScan",
            PlanOp::Alias(_) => "Alias",
            PlanOp::InitialGroup(_) => "InitialGroup",
            PlanOp::IntermediateGroup(_) => "IntermediateGroup",
            PlanOp::FinalGroup(_) => "FinalGroup",
            PlanOp::Order(_) => "Order",
            PlanOp::CreatePrimaryIndex(_) => "CreatePrimaryIndex",
            PlanOp::Sequence { .. } => "Sequence",
            PlanOp::Parallel { .. } => "Parallel",
        }
    }

    pub fn children(&self) -> Vec<&Arc<PlanNode>> {
        match &self.op {
            PlanOp::Sequence { children } => children.iter().collect(),
            PlanOp::Parallel { child, .. } => vec![child],
            _ => Vec::new(),
        }
    }

    /// Structural checks the operator builder relies on.
    pub fn validate(&self) -> Result<()> {
        match &self.op {
            PlanOp::Sequence { children } => {
                if children.is_empty() {
                    return Err(Error::Plan("Sequence without children".into()));
                }
                children.iter().try_for_each(|c| c.validate())
            }
            PlanOp::Parallel { child, .. } => {
                if matches!(child.op, PlanOp::Sequence { .. } | PlanOp::Parallel { .. }) {
                    return Err(Error::Plan(format!(
                        "Parallel must wrap a single stage, got {}",
                        child.kind_name()
                    )));
                }
                child.validate()
            }
            PlanOp::Order(spec) if spec.terms.is_empty() => {
                Err(Error::Plan("Order without sort terms".into()))
            }
            PlanOp::ExpressionScan(spec) if spec.alias.is_empty() => {
                Err(Error::Plan("ExpressionScan without alias".into()))
            }
            PlanOp::Alias(spec) if spec.alias.is_empty() => {
                Err(Error::Plan("Alias without a name".into()))
            }
            _ => Ok(()),
        }
    }
}
