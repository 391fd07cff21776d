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

//! Wires the registries, plan store, worker pool and attached `KvClient`s
//! into one request-execution path, shared by the one-shot, `--stdin` and
//! `--serve` modes. Exit codes: 1 invalid request, 2
//! invalid plan/registry, 3 execution failure, 4 timeout.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rankflow_common::error::{EngineError, EngineResult, ErrorKind};
use rankflow_common::registry::Registries;
use rankflow_common::request::{Candidate, ExecuteRequest, ExecuteResponse};
use rankflow_common::value::{EndpointKind, KeyId, ParamId, ParamValue};
use rankflow_engine::context::KvClientMap;
use rankflow_engine::{execute, ExecutionContext, ExecutionOutcome};
use rankflow_io::{KvClient, MockKvClient, RedisKvClient};
use rankflow_plan::{load_plan_file, validate_and_link, validate_param_overrides, Plan, PlanStore};
use rankflow_runtime::{LateCompletionCounter, WorkerPool};

use crate::cli::{Cli, Env};

/// Everything loaded once at startup and reused across every request this
/// process serves. Not `Send`: the attached `KvClient`s are loop-thread
/// confined, so an `App` only ever lives inside one `LocalSet`.
pub struct App {
    pub registries: Arc<Registries>,
    pub plan_store: Option<PlanStore>,
    pub single_plan: Option<Plan>,
    pub worker_pool: Arc<WorkerPool>,
    pub kv_clients: Rc<KvClientMap>,
    pub default_deadline_ms: Option<u64>,
    pub default_node_timeout_ms: Option<u64>,
    pub dump_run_trace: bool,
}

impl App {
    /// Loads registries, the plan store/single plan, and connects every
    /// registered endpoint's `KvClient`. Must run inside a `LocalSet`.
    pub async fn new(cli: &Cli) -> EngineResult<App> {
        let registries = Arc::new(Registries::load_from_dir(&cli.artifacts_dir)?);

        let plan_store = match &cli.plan_dir {
            Some(dir) => Some(PlanStore::load(dir)?),
            None => None,
        };
        let single_plan = match &cli.plan {
            Some(path) => Some(load_plan_file(path)?),
            None => None,
        };

        let worker_pool = Arc::new(match cli.cpu_threads {
            Some(n) => WorkerPool::new(n),
            None => WorkerPool::with_default_size(),
        });

        let mut kv_clients: KvClientMap = HashMap::new();
        for (id, entry) in &registries.endpoints.endpoints {
            let client: Rc<dyn KvClient> = if cli.env == Env::Prod && entry.kind == EndpointKind::Redis {
                Rc::new(
                    RedisKvClient::connect(id.clone(), &entry.host, entry.port, entry.policy.max_inflight, entry.policy.request_timeout_ms)
                        .await?,
                )
            } else {
                Rc::new(MockKvClient::new(entry.policy.max_inflight))
            };
            kv_clients.insert(id.clone(), client);
        }

        Ok(App {
            registries,
            plan_store,
            single_plan,
            worker_pool,
            kv_clients: Rc::new(kv_clients),
            default_deadline_ms: cli.deadline_ms,
            default_node_timeout_ms: cli.node_timeout_ms,
            dump_run_trace: cli.dump_run_trace,
        })
    }

    /// Runs one request end to end, never failing: any error along the way
    /// is converted into a `Failure` response paired with the exit code its
    /// phase maps to.
    pub async fn handle_request(&self, req: ExecuteRequest) -> (ExecuteResponse, i32) {
        let request_id = req.request_id.clone().unwrap_or_else(|| "unknown".to_string());
        match self.handle_request_inner(req).await {
            Ok(response) => (response, 0),
            Err((code, error)) => {
                tracing::warn!(kind = %error.kind(), request_id, "request failed");
                (ExecuteResponse::failure(request_id, error.to_structured()), code)
            }
        }
    }

    async fn handle_request_inner(&self, req: ExecuteRequest) -> Result<ExecuteResponse, (i32, EngineError)> {
        let request_id = req.request_id.clone().unwrap_or_else(|| "unknown".to_string());

        let plan = self.resolve_plan(&req).map_err(|e| (1, e))?;
        let linked = validate_and_link(plan, &self.registries).map_err(|e| (2, e))?;
        validate_param_overrides(&req.param_overrides, &self.registries).map_err(|e| (1, e))?;

        let mut params: HashMap<ParamId, ParamValue> = HashMap::new();
        for (name, value) in &req.param_overrides {
            let (id, _) = self
                .registries
                .params
                .by_name(name)
                .expect("validate_param_overrides already confirmed this name resolves");
            params.insert(id, value.clone());
        }

        let deadline_ms = req.deadline_ms.or(self.default_deadline_ms);
        let request_deadline = deadline_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let node_timeout = req.node_timeout_ms.or(self.default_node_timeout_ms).map(Duration::from_millis);

        let ctx = Rc::new(ExecutionContext {
            plan: Arc::new(linked),
            registries: Arc::clone(&self.registries),
            params: Arc::new(params),
            kv_clients: Rc::clone(&self.kv_clients),
            worker_pool: Arc::clone(&self.worker_pool),
            late_completions: Arc::new(LateCompletionCounter::default()),
            request_deadline,
            node_timeout,
            user_id: req.user_id,
        });

        let outcome = execute(Rc::clone(&ctx)).await.map_err(|e| {
            let code = if e.kind() == ErrorKind::Timeout { 4 } else { 3 };
            (code, e)
        })?;

        if self.dump_run_trace {
            for delta in &outcome.schema_deltas {
                if let Ok(line) = serde_json::to_string(delta) {
                    eprintln!("{line}");
                }
            }
        }

        let candidates = self.build_candidates(&ctx, &outcome, &req.output_keys).map_err(|e| (3, e))?;
        Ok(ExecuteResponse::success(request_id, candidates))
    }

    fn resolve_plan(&self, req: &ExecuteRequest) -> EngineResult<Plan> {
        if let Some(name) = req.selected_plan() {
            return match &self.plan_store {
                Some(store) => store.load_plan_by_name(name),
                None => Err(EngineError::validation(format!(
                    "request selected plan `{name}` but no --plan_dir was configured"
                ))),
            };
        }
        self.single_plan
            .clone()
            .ok_or_else(|| EngineError::validation("request names no plan and no --plan was configured"))
    }

    fn build_candidates(&self, ctx: &ExecutionContext, outcome: &ExecutionOutcome, output_keys: &[String]) -> EngineResult<Vec<Candidate>> {
        let node_id = ctx
            .plan
            .outputs()
            .first()
            .ok_or_else(|| EngineError::validation("plan declares no output nodes"))?;
        let view = outcome
            .results
            .get(node_id)
            .ok_or_else(|| EngineError::evaluation(format!("output node `{node_id}` produced no result")))?;

        let mut key_ids: Vec<(String, KeyId)> = Vec::with_capacity(output_keys.len());
        for name in output_keys {
            let (id, _) = self
                .registries
                .keys
                .by_name(name)
                .ok_or_else(|| EngineError::validation(format!("output_keys references unknown key `{name}`")))?;
            key_ids.push((name.clone(), id));
        }

        let bundle = view.bundle();
        let mut candidates = Vec::with_capacity(view.logical_size());
        for row in view.active_indices() {
            let mut fields = HashMap::new();
            for (name, key) in &key_ids {
                let value = if key.is_row_id() {
                    Some(serde_json::json!(bundle.id_at(row)))
                } else if let Some(col) = bundle.float_column(*key) {
                    col.get(row).map(|v| serde_json::json!(v))
                } else {
                    bundle.string_column(*key).and_then(|col| col.get(row)).map(|v| serde_json::json!(v))
                };
                if let Some(value) = value {
                    fields.insert(name.clone(), value);
                }
            }
            candidates.push(Candidate { id: bundle.id_at(row), fields });
        }
        Ok(candidates)
    }

    /// `--print-registry`: the canonical-JSON digests of the capability and
    /// task-manifest registries.
    pub fn registry_digest_report(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::json!({
            "capability_registry_digest": self.registries.capability_registry_digest()?,
            "task_manifest_digest": self.registries.task_manifest_digest()?,
        }))
    }

    /// `--list-plans`: the names/digests registered in the plan store.
    pub fn list_plans_report(&self) -> EngineResult<serde_json::Value> {
        let store = self
            .plan_store
            .as_ref()
            .ok_or_else(|| EngineError::validation("--list-plans requires --plan_dir"))?;
        Ok(serde_json::to_value(store.list()).expect("IndexEntry is always representable as JSON"))
    }
}

thread_local! {
    /// The `App` for the loop thread currently running it, installed once at
    /// startup by whichever task calls `install`. `--serve` mode reaches
    /// this from the HTTP handler's posted job; the one-shot/`--stdin` modes
    /// don't need it, since they hold their own `App` directly.
    static APP: RefCell<Option<Rc<App>>> = RefCell::new(None);
}

/// Installs `app` as this thread's current `App`. Must be called on the
/// loop thread, inside its `LocalSet`.
pub fn install(app: App) {
    APP.with(|cell| *cell.borrow_mut() = Some(Rc::new(app)));
}

/// Fetches the current thread's installed `App`.
///
/// # Panics
/// Panics if `install` was never called on this thread.
pub fn current() -> Rc<App> {
    APP.with(|cell| cell.borrow().clone()).expect("App not installed on this thread; call exec::install first")
}
