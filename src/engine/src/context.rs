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

//! Everything one request's execution needs that is not carried on the plan
//! itself: resolved params, attached key-value clients, the worker pool, and
//! the request's deadlines.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::registry::Registries;
use rankflow_common::value::{EndpointId, ParamId, ParamValue};
use rankflow_io::KvClient;
use rankflow_plan::LinkedPlan;
use rankflow_runtime::{LateCompletionCounter, WorkerPool};

/// Attached once per process per endpoint; not `Send`,
/// since `KvClient` is confined to the loop thread.
pub type KvClientMap = HashMap<EndpointId, Rc<dyn KvClient>>;

/// Per-request execution state, built fresh for each `execute` call and
/// dropped once it returns. Holds an `Rc`-keyed client map, so the whole
/// context is loop-thread-confined; the scheduler only ever runs it inside
/// a `LocalSet`.
pub struct ExecutionContext {
    pub plan: Arc<LinkedPlan>,
    pub registries: Arc<Registries>,
    pub params: Arc<HashMap<ParamId, ParamValue>>,
    pub kv_clients: Rc<KvClientMap>,
    pub worker_pool: Arc<WorkerPool>,
    pub late_completions: Arc<LateCompletionCounter>,
    pub request_deadline: Option<Instant>,
    pub node_timeout: Option<Duration>,
    pub user_id: u64,
}

impl ExecutionContext {
    pub fn kv_client(&self, endpoint: &EndpointId) -> EngineResult<Rc<dyn KvClient>> {
        self.kv_clients
            .get(endpoint)
            .cloned()
            .ok_or_else(|| EngineError::resource(format!("no client attached for endpoint `{endpoint}`")))
    }

    /// The deadline a single node's awaitable races against: the tighter of
    /// the request-wide deadline and `now + node_timeout`.
    pub fn effective_deadline(&self) -> Instant {
        let from_node_timeout = self.node_timeout.map(|d| Instant::now() + d);
        match (self.request_deadline, from_node_timeout) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => Instant::now() + Duration::from_secs(3600),
        }
    }
}
