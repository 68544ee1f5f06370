//! Profile rendering: a JSON view of the live operator tree.
//!
//! Node shape: `#operator` (plan kind), `#stats` (items and phase times),
//! optimizer estimates when the planner supplied them, and `~children` for
//! composites.

use serde_json::{json, Map, Value as Json};

use quarry_core::hash::Hash256;
use quarry_operators::base::OpStats;
use quarry_operators::{Context, Operator, Visitor};

#[derive(Debug, Default)]
pub struct ProfileVisitor {
    nodes: usize,
}

impl ProfileVisitor {
    /// Number of operator instances rendered so far.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Wrap a rendered tree with the request-level fields.
    pub fn request_profile(&self, ctx: &Context, plan_hash: Hash256, plan: Json) -> Json {
        let mut out = Map::new();
        out.insert("requestID".into(), json!(ctx.request_id().to_string()));
        out.insert("planHash".into(), json!(plan_hash.to_hex()));
        out.insert("version".into(), json!(quarry_core::VERSION));
        if let Some(counts) = ctx.fmt_phase_counts() {
            out.insert("phaseCounts".into(), counts);
        }
        if let Some(ops) = ctx.fmt_phase_operators() {
            out.insert("phaseOperators".into(), ops);
        }
        if ctx.sort_count() > 0 {
            out.insert("sortCount".into(), json!(ctx.sort_count()));
        }
        if ctx.mutation_count() > 0 {
            out.insert("mutationCount".into(), json!(ctx.mutation_count()));
        }
        out.insert("errorCount".into(), json!(ctx.error_count()));
        out.insert("plan".into(), plan);
        Json::Object(out)
    }
}

fn stats_json(op: &Operator, stats: &OpStats) -> Json {
    let mut s = Map::new();
    s.insert("#itemsIn".into(), json!(stats.items_in));
    s.insert("#itemsOut".into(), json!(stats.items_out));
    s.insert("state".into(), json!(format!("{:?}", op.state())));
    for (key, d) in [
        ("instantiateTime", stats.instantiate_time),
        ("execTime", stats.exec_time),
        ("servTime", stats.serv_time),
        ("sortTime", stats.sort_time),
    ] {
        if !d.is_zero() {
            s.insert(key.into(), json!(format!("{d:?}")));
        }
    }
    Json::Object(s)
}

impl Visitor for ProfileVisitor {
    type Output = Json;

    fn visit_operator(&mut self, op: &Operator) -> Json {
        self.nodes += 1;
        let mut node = Map::new();
        node.insert("#operator".into(), json!(op.name()));
        node.insert("#stats".into(), stats_json(op, &op.stats()));
        let plan = op.plan();
        if let Some(cost) = plan.cost {
            node.insert("cost".into(), json!(cost));
        }
        if let Some(card) = plan.cardinality {
            node.insert("cardinality".into(), json!(card));
        }
        let children: Vec<Json> = op.children().iter().map(|c| c.accept(&mut *self)).collect();
        if !children.is_empty() {
            node.insert("~children".into(), Json::Array(children));
        }
        Json::Object(node)
    }
}
