// Copyright 2023 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The closed, enumerated operator set. `OperatorKind` is the
//! compile-time dispatch table: adding an operator means adding a variant
//! and a match arm here, not registering a handler at runtime.

mod concat;
mod filter;
mod sort;
mod source;
mod sleep_op;
mod take;
mod vm;

use std::rc::Rc;

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_common::value::{EndpointId, KeyId};
use rankflow_plan::model::Node;
use rankflow_plan::LinkedNode;

use crate::context::ExecutionContext;
use crate::schema_delta::SchemaDelta;
use crate::shape::{validate_shape, OutputShape};

/// A node's execution result: its output view plus the schema delta it
/// produced.
pub struct NodeOutcome {
    pub view: RowView,
    pub delta: SchemaDelta,
}

/// The closed operator set this engine implements. Every
/// operator named in a plan's nodes must resolve to one of these; unknown
/// operator names are already rejected at plan-validation time, so reaching
/// `from_name` returning `None` here would mean the task manifest and this
/// table have drifted apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Source,
    FanOutSource,
    Vm,
    Filter,
    Take,
    Sort,
    Concat,
    Sleep,
}

impl OperatorKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "source" => OperatorKind::Source,
            "fan_out_source" => OperatorKind::FanOutSource,
            "vm" => OperatorKind::Vm,
            "filter" => OperatorKind::Filter,
            "take" => OperatorKind::Take,
            "sort" => OperatorKind::Sort,
            "concat" => OperatorKind::Concat,
            "sleep" => OperatorKind::Sleep,
            _ => return None,
        })
    }

    /// Operators with an async implementation run inline on the loop thread
    /// (they touch I/O or just sleep); all others run as a CPU-offloaded job
    /// on the worker pool.
    pub fn has_async_impl(self) -> bool {
        matches!(self, OperatorKind::Source | OperatorKind::FanOutSource | OperatorKind::Sleep)
    }
}

/// Everything a sync operator needs, assembled once per node and handed to
/// the worker-pool closure. Deliberately `Send + Sync`-only (no `Rc`), since
/// it crosses a real OS thread boundary.
pub struct SyncCtx {
    pub plan: std::sync::Arc<rankflow_plan::LinkedPlan>,
    pub registries: std::sync::Arc<rankflow_common::registry::Registries>,
    pub params: std::sync::Arc<std::collections::HashMap<rankflow_common::value::ParamId, rankflow_common::value::ParamValue>>,
}

/// Runs one of the synchronous operators. Called from
/// inside a worker-pool job; the regex dict-scan cache must already have
/// been cleared for this node by the caller.
pub fn run_sync(op: OperatorKind, ctx: &SyncCtx, linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<NodeOutcome> {
    let result = match op {
        OperatorKind::Vm => vm::run(ctx, linked, inputs),
        OperatorKind::Filter => filter::run(ctx, linked, inputs),
        OperatorKind::Take => take::run(linked, inputs),
        OperatorKind::Sort => sort::run(linked, inputs),
        OperatorKind::Concat => concat::run(ctx, linked, inputs),
        _ => unreachable!("run_sync called with an async operator"),
    }?;
    let manifest = ctx.registries.task_manifest.get(&linked.node.op)?;
    let shape = OutputShape::parse(&manifest.output_shape)?;
    validate_shape(shape, inputs, &result)?;
    let delta = SchemaDelta::compute(linked.node.node_id.clone(), inputs, &result);
    Ok(NodeOutcome { view: result, delta })
}

/// Runs one of the async operators inline on the loop thread.
pub async fn run_async(op: OperatorKind, ctx: Rc<ExecutionContext>, linked: LinkedNode, inputs: Vec<RowView>) -> EngineResult<NodeOutcome> {
    let result = match op {
        OperatorKind::Source => source::run_source_fetch(&ctx, &linked).await,
        OperatorKind::FanOutSource => source::run_fan_out_source(&ctx, &linked, &inputs).await,
        OperatorKind::Sleep => sleep_op::run(&linked.node, &inputs).await,
        _ => unreachable!("run_async called with a sync operator"),
    }?;
    let manifest = ctx.registries.task_manifest.get(&linked.node.op)?;
    let shape = OutputShape::parse(&manifest.output_shape)?;
    validate_shape(shape, &inputs, &result)?;
    let delta = SchemaDelta::compute(linked.node.node_id.clone(), &inputs, &result);
    Ok(NodeOutcome { view: result, delta })
}

pub(crate) fn param_u64(node: &Node, name: &str) -> EngineResult<u64> {
    node.params
        .get(name)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| EngineError::validation(format!("node `{}` param `{name}` must be a non-negative integer", node.node_id)))
}

pub(crate) fn param_str<'a>(node: &'a Node, name: &str) -> EngineResult<&'a str> {
    node.params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::validation(format!("node `{}` param `{name}` must be a string", node.node_id)))
}

pub(crate) fn param_str_opt<'a>(node: &'a Node, name: &str) -> Option<&'a str> {
    node.params.get(name).and_then(|v| v.as_str())
}

pub(crate) fn param_bool(node: &Node, name: &str, default: bool) -> bool {
    node.params.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub(crate) fn param_key_id(node: &Node, name: &str, registries: &rankflow_common::registry::Registries) -> EngineResult<KeyId> {
    let key_name = param_str(node, name)?;
    registries
        .keys
        .by_name(key_name)
        .map(|(id, _)| id)
        .ok_or_else(|| EngineError::validation(format!("node `{}` param `{name}` references unknown key `{key_name}`", node.node_id)))
}

pub(crate) fn param_endpoint(node: &Node, name: &str) -> EngineResult<EndpointId> {
    Ok(EndpointId(param_str(node, name)?.to_string()))
}
