//! CREATE PRIMARY INDEX: single-shot DDL against the datastore indexer.

use std::sync::Arc;

use tracing::debug;

use quarry_core::plan::PrimaryIndexSpec;

use crate::context::Context;
use crate::datastore::IndexError;
use crate::error::ExecError;
use crate::operator::Operator;
use crate::phase::Phase;

pub struct CreatePrimaryIndex {
    spec: Arc<PrimaryIndexSpec>,
}

impl CreatePrimaryIndex {
    pub(crate) fn new(spec: &Arc<PrimaryIndexSpec>) -> Self {
        Self {
            spec: Arc::clone(spec),
        }
    }

    pub(crate) fn run(&mut self, op: &Arc<Operator>, ctx: &Context) {
        if ctx.readonly() {
            return;
        }
        crate::fail_point!("create_primary_index.run");

        op.base().switch_phase(ctx, Phase::Serv);
        let spec = &self.spec;
        let Some(datastore) = ctx.datastore() else {
            ctx.error(ExecError::Datastore("no datastore attached to the request".into()));
            return;
        };
        let indexer = match datastore.indexer(&spec.keyspace, &spec.using) {
            Ok(i) => i,
            Err(e) => {
                ctx.error(ExecError::Datastore(e.to_string()));
                return;
            }
        };

        if spec.partition.is_some() && !indexer.supports_partitions() {
            ctx.error(ExecError::PartitionIndexNotSupported(indexer.name().to_string()));
            return;
        }

        let request_id = ctx.request_id().to_string();
        match indexer.create_primary_index(
            &request_id,
            &spec.name,
            spec.partition.as_ref(),
            spec.with.as_ref(),
        ) {
            Ok(()) => {
                ctx.add_mutation_count(1);
                debug!(keyspace = %spec.keyspace, index = %spec.name, "primary index created");
            }
            Err(IndexError::AlreadyExists(_)) if !spec.fail_if_exists => {
                debug!(index = %spec.name, "primary index already exists; ignored");
            }
            Err(IndexError::AlreadyExists(_)) => {
                ctx.error(ExecError::IndexAlreadyExists(spec.name.clone()));
            }
            Err(e) => ctx.error(ExecError::Datastore(e.to_string())),
        }
    }
}
