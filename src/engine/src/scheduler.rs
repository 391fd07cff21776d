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

//! The single-threaded coroutine DAG scheduler: drives one
//! linked plan to completion, spawning each node onto the event loop's
//! `LocalSet` as soon as its dependencies are satisfied, failing fast on the
//! first node error while letting in-flight nodes run to completion.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_plan::NodeId;

use crate::context::ExecutionContext;
use crate::operators::{run_async, run_sync, OperatorKind, SyncCtx};
use crate::schema_delta::SchemaDelta;

pub use crate::operators::NodeOutcome;

/// The result of running a whole plan to completion:
/// every node's output view, plus the per-node schema deltas in topological
/// order, plus how many late (post-timeout) completions were observed.
pub struct ExecutionOutcome {
    pub results: HashMap<NodeId, RowView>,
    pub schema_deltas: Vec<SchemaDelta>,
    pub late_completions: u64,
}

/// Must be called from inside a `tokio::task::LocalSet::run_until(...)` — it
/// uses `spawn_local` throughout, since node execution touches loop-thread-
/// confined state (`KvClient`s, the regex dict-scan cache).
pub async fn execute(ctx: Rc<ExecutionContext>) -> EngineResult<ExecutionOutcome> {
    let order = ctx.plan.order.clone();

    let mut deps_remaining: HashMap<NodeId, usize> = HashMap::new();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for id in &order {
        let linked = ctx.plan.node(id);
        deps_remaining.insert(id.clone(), linked.node.inputs.len());
        for input in &linked.node.inputs {
            successors.entry(input.clone()).or_default().push(id.clone());
        }
    }

    let mut ready: VecDeque<NodeId> = order.iter().filter(|id| deps_remaining[*id] == 0).cloned().collect();
    let mut results: HashMap<NodeId, RowView> = HashMap::new();
    let mut deltas: HashMap<NodeId, SchemaDelta> = HashMap::new();
    let mut first_error: Option<EngineError> = None;

    type Joined = (NodeId, EngineResult<NodeOutcome>);
    let mut inflight: FuturesUnordered<tokio::task::JoinHandle<Joined>> = FuturesUnordered::new();

    loop {
        if first_error.is_none() {
            while let Some(node_id) = ready.pop_front() {
                if let Some(deadline) = ctx.request_deadline {
                    if Instant::now() >= deadline {
                        first_error = Some(EngineError::timeout(format!(
                            "request deadline exceeded before node `{node_id}` could be spawned"
                        )));
                        break;
                    }
                }

                let inputs: Vec<RowView> = ctx
                    .plan
                    .node(&node_id)
                    .node
                    .inputs
                    .iter()
                    .map(|input_id| results[input_id].clone())
                    .collect();

                let handle = tokio::task::spawn_local(spawn_node(Rc::clone(&ctx), node_id.clone(), inputs));
                inflight.push(handle);
            }
        }

        let Some(joined) = inflight.next().await else { break };
        let (node_id, outcome) = joined.map_err(|e| EngineError::evaluation(format!("node task panicked: {e}")))?;

        match outcome {
            Ok(node_outcome) => {
                if first_error.is_none() {
                    if let Some(succs) = successors.get(&node_id) {
                        for succ in succs {
                            let remaining = deps_remaining.get_mut(succ).expect("successor present in deps_remaining");
                            *remaining -= 1;
                            if *remaining == 0 {
                                ready.push_back(succ.clone());
                            }
                        }
                    }
                }
                results.insert(node_id.clone(), node_outcome.view);
                deltas.insert(node_id, node_outcome.delta);
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    let schema_deltas = order.iter().filter_map(|id| deltas.remove(id)).collect();
    Ok(ExecutionOutcome { results, schema_deltas, late_completions: ctx.late_completions.get() })
}

/// Runs one node: dispatches to the sync (worker-pool) or async (loop-
/// thread) path per its `OperatorKind`, racing against the node's effective
/// deadline either way.
async fn spawn_node(ctx: Rc<ExecutionContext>, node_id: NodeId, inputs: Vec<RowView>) -> (NodeId, EngineResult<NodeOutcome>) {
    let result = run_node(&ctx, &node_id, inputs).await;
    (node_id, result)
}

async fn run_node(ctx: &Rc<ExecutionContext>, node_id: &str, inputs: Vec<RowView>) -> EngineResult<NodeOutcome> {
    let linked = ctx.plan.node(node_id).clone();
    let op = OperatorKind::from_name(&linked.node.op).ok_or_else(|| {
        EngineError::validation(format!("node `{node_id}` uses operator `{}` with no built-in implementation", linked.node.op))
    })?;

    let deadline = ctx.effective_deadline();

    if op.has_async_impl() {
        let inner_ctx = Rc::clone(ctx);
        let late = ctx.late_completions.clone();
        rankflow_runtime::async_with_timeout(deadline, &late, async move { run_async(op, inner_ctx, linked, inputs).await })
            .await?
    } else {
        let sync_ctx = SyncCtx {
            plan: std::sync::Arc::clone(&ctx.plan),
            registries: std::sync::Arc::clone(&ctx.registries),
            params: std::sync::Arc::clone(&ctx.params),
        };
        let late = ctx.late_completions.clone();
        let worker_pool = std::sync::Arc::clone(&ctx.worker_pool);

        rankflow_runtime::cpu_offload_with_timeout(&worker_pool, deadline, &late, move || {
            rankflow_expr::regex_cache::clear_for_node();
            run_sync(op, &sync_ctx, &linked, &inputs)
        })
        .await?
    }
}
