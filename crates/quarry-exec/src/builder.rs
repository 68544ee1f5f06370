//! Plan validation and live-tree instantiation.

use std::sync::Arc;

use tracing::debug;

use quarry_core::plan::PlanNode;
use quarry_operators::{Context, Operator};

use crate::runtime::EngineError;

/// Check `plan` and build its operator tree against `ctx`.
pub fn build(plan: &Arc<PlanNode>, ctx: &Context) -> Result<Arc<Operator>, EngineError> {
    plan.validate()?;
    let root = Operator::from_plan(plan, ctx)?;
    debug!(request = %ctx.request_id(), root = root.name(), operators = count(&root), "operator tree built");
    Ok(root)
}

/// Number of live instances in the tree, parallel copies included.
pub fn count(op: &Operator) -> usize {
    1 + op.children().iter().map(|c| count(c)).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::config::ExecConfig;
    use quarry_core::plan::{AliasSpec, PlanOp};

    #[test]
    fn parallel_nodes_expand_to_copies() {
        let ctx = Context::builder(ExecConfig::default()).build();
        let alias = PlanNode::new(PlanOp::Alias(Arc::new(AliasSpec {
            alias: "a".into(),
            primary: false,
        })));
        let plan = Arc::new(PlanNode::sequence(vec![
            PlanNode::new(PlanOp::DummyScan),
            PlanNode::parallel(alias, 3),
        ]));
        let root = build(&plan, &ctx).unwrap();
        // sequence + scan + parallel + 3 copies
        assert_eq!(count(&root), 6);
    }

    #[test]
    fn invalid_plans_are_rejected_before_instantiation() {
        let ctx = Context::builder(ExecConfig::default()).build();
        let plan = Arc::new(PlanNode::sequence(vec![]));
        assert!(matches!(build(&plan, &ctx), Err(EngineError::Plan(_))));
    }
}
