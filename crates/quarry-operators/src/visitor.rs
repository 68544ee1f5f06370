//! Extension point for walkers over the live operator tree (profiling,
//! plan-debug dumps). Every per-kind hook defaults to `visit_operator`.

use crate::operator::Operator;

pub trait Visitor {
    type Output;

    fn visit_operator(&mut self, op: &Operator) -> Self::Output;

    fn visit_dummy_scan(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_expression_scan(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_alias(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_initial_group(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_intermediate_group(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_final_group(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_order(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_create_primary_index(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_sequence(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }

    fn visit_parallel(&mut self, op: &Operator) -> Self::Output {
        self.visit_operator(op)
    }
}
