//! Convenient re-exports for downstream crates.

pub use crate::aggregate::Aggregate;
pub use crate::annotated::{AnnotatedValue, Annotations, Attachment, ScopeRef, AGGREGATES};
pub use crate::budget::MemoryQuota;
pub use crate::config::ExecConfig;
pub use crate::error::{Error, Result};
pub use crate::expr::{ArithOp, CompareOp, Expr};
pub use crate::id::{OpId, RequestId};
pub use crate::plan::{
    AliasSpec, ExpressionScanSpec, GroupSpec, IndexPartition, OrderSpec, PlanNode, PlanOp,
    PrimaryIndexSpec, SortTerm,
};
pub use crate::value::{Value, ValueType};
