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

//! End-to-end scenarios driving a hand-built plan through
//! `validate_and_link` and `execute` directly, plus a few operator-level
//! checks that construct a bundle by hand rather than routing through a
//! `source` fetch.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rankflow_common::column::{ColumnBundle, Dictionary, FloatColumn, StringColumn, Validity};
use rankflow_common::error::ErrorKind;
use rankflow_common::registry::{
    CapabilityRegistry, EndpointEntry, EndpointPolicy, EndpointRegistry, KeyEntry, KeyRegistry, Registries, TaskManifest, TaskManifestEntry,
};
use rankflow_common::row_view::RowView;
use rankflow_common::value::{EndpointId, EndpointKind, KeyId, KeyType, Lifecycle, ParamId, ParamValue};
use rankflow_engine::context::{ExecutionContext, KvClientMap};
use rankflow_engine::operators::{run_sync, OperatorKind, SyncCtx};
use rankflow_engine::scheduler::execute;
use rankflow_expr::ir::{CmpOp, Expr, InLhs, InList, Pred};
use rankflow_io::mock_client::MockKvClient;
use rankflow_plan::model::{BuiltBy, Node, Plan};
use rankflow_plan::validate::{validate_and_link, LinkedNode};
use rankflow_runtime::{LateCompletionCounter, WorkerPool};

const SCORE: KeyId = KeyId(10);
const NAME: KeyId = KeyId(11);

fn base_registries() -> Registries {
    let mut keys = KeyRegistry::default();
    keys.keys.insert(
        KeyId::ROW_ID,
        KeyEntry { name: "id".into(), ty: KeyType::Id, lifecycle: Lifecycle::Active, nullable: false, writable: false },
    );
    keys.keys.insert(
        SCORE,
        KeyEntry { name: "score".into(), ty: KeyType::Float, lifecycle: Lifecycle::Active, nullable: true, writable: true },
    );
    keys.keys.insert(
        NAME,
        KeyEntry { name: "name".into(), ty: KeyType::String, lifecycle: Lifecycle::Active, nullable: true, writable: true },
    );

    let mut ops = TaskManifest::default();
    ops.ops.insert(
        "source".to_string(),
        TaskManifestEntry {
            op: "source".into(),
            required_params: vec!["fanout".into(), "endpoint".into()],
            optional_params: vec!["key_template".into()],
            reads: vec![],
            static_writes: vec![SCORE, NAME],
            output_shape: "source_fanout_dense".into(),
            has_async_impl: true,
            writes_effect: None,
        },
    );
    ops.ops.insert(
        "vm".to_string(),
        TaskManifestEntry {
            op: "vm".into(),
            required_params: vec!["out_key".into(), "expr".into()],
            optional_params: vec![],
            reads: vec![],
            static_writes: vec![],
            output_shape: "unary_preserve_view".into(),
            has_async_impl: false,
            writes_effect: Some(serde_json::json!({"kind": "from_param", "name": "out_key"})),
        },
    );
    ops.ops.insert(
        "filter".to_string(),
        TaskManifestEntry {
            op: "filter".into(),
            required_params: vec!["pred".into()],
            optional_params: vec![],
            reads: vec![],
            static_writes: vec![],
            output_shape: "unary_subset_view".into(),
            has_async_impl: false,
            writes_effect: None,
        },
    );
    ops.ops.insert(
        "take".to_string(),
        TaskManifestEntry {
            op: "take".into(),
            required_params: vec!["count".into()],
            optional_params: vec![],
            reads: vec![],
            static_writes: vec![],
            output_shape: "prefix_of_input".into(),
            has_async_impl: false,
            writes_effect: None,
        },
    );
    ops.ops.insert(
        "concat".to_string(),
        TaskManifestEntry {
            op: "concat".into(),
            required_params: vec![],
            optional_params: vec!["output_keys".into()],
            reads: vec![],
            static_writes: vec![],
            output_shape: "binary_concat_dense".into(),
            has_async_impl: false,
            writes_effect: None,
        },
    );
    ops.ops.insert(
        "sleep".to_string(),
        TaskManifestEntry {
            op: "sleep".into(),
            required_params: vec!["duration_ms".into()],
            optional_params: vec![],
            reads: vec![],
            static_writes: vec![],
            output_shape: "unary_preserve_view".into(),
            has_async_impl: true,
            writes_effect: None,
        },
    );

    let mut endpoints = EndpointRegistry::default();
    endpoints.endpoints.insert(
        EndpointId("ep1".into()),
        EndpointEntry { name: "ep1".into(), kind: EndpointKind::Http, host: "localhost".into(), port: 80, policy: EndpointPolicy::default() },
    );
    endpoints.endpoints.insert(
        EndpointId("ep2".into()),
        EndpointEntry { name: "ep2".into(), kind: EndpointKind::Http, host: "localhost".into(), port: 81, policy: EndpointPolicy::default() },
    );

    Registries { keys, task_manifest: ops, endpoints, capabilities: CapabilityRegistry::default(), ..Default::default() }
}

fn plan_with_nodes(nodes: Vec<Node>, outputs: Vec<&str>) -> Plan {
    Plan {
        schema_version: 1,
        plan_name: "scenario".into(),
        nodes,
        outputs: outputs.into_iter().map(String::from).collect(),
        expr_table: HashMap::new(),
        pred_table: HashMap::new(),
        capabilities_required: vec![],
        extensions: HashMap::new(),
        built_by: BuiltBy { backend: "test".into(), tool: "test".into(), tool_version: "0".into() },
    }
}

fn source_node(id: &str, fanout: u64, endpoint: &str) -> Node {
    Node {
        node_id: id.into(),
        op: "source".into(),
        inputs: vec![],
        params: HashMap::from([
            ("fanout".to_string(), serde_json::json!(fanout)),
            ("endpoint".to_string(), serde_json::json!(endpoint)),
        ]),
        extensions: HashMap::new(),
    }
}

fn context(
    plan: Arc<rankflow_plan::LinkedPlan>,
    registries: Arc<Registries>,
    params: HashMap<ParamId, ParamValue>,
    kv_clients: KvClientMap,
    deadline: Option<Instant>,
    node_timeout: Option<Duration>,
) -> Rc<ExecutionContext> {
    Rc::new(ExecutionContext {
        plan,
        registries,
        params: Arc::new(params),
        kv_clients: Rc::new(kv_clients),
        worker_pool: Arc::new(WorkerPool::new(4)),
        late_completions: Arc::new(LateCompletionCounter::default()),
        request_deadline: deadline,
        node_timeout,
        user_id: 1,
    })
}

fn current_thread_local_run<F: std::future::Future>(fut: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, fut)
}

/// S1: `source(fanout=5)` then `take(count=3)` preserves the physical row
/// count while truncating the active sequence to a prefix.
#[test]
fn s1_identity_fanout_then_take() {
    let nodes = vec![
        source_node("src", 5, "ep1"),
        Node {
            node_id: "t".into(),
            op: "take".into(),
            inputs: vec!["src".into()],
            params: HashMap::from([("count".to_string(), serde_json::json!(3))]),
            extensions: HashMap::new(),
        },
    ];
    let plan = plan_with_nodes(nodes, vec!["t"]);
    let registries = base_registries();
    let linked = validate_and_link(plan, &registries).unwrap();

    let mut kv_clients: KvClientMap = HashMap::new();
    kv_clients.insert(EndpointId("ep1".into()), Rc::new(MockKvClient::new(8)) as Rc<dyn rankflow_io::KvClient>);

    let ctx = context(Arc::new(linked), Arc::new(registries), HashMap::new(), kv_clients, None, None);

    let outcome = current_thread_local_run(execute(ctx)).unwrap();
    let take_output = &outcome.results["t"];
    assert_eq!(take_output.bundle().len(), 5);
    assert_eq!(take_output.active_sequence(), vec![0, 1, 2]);
    assert_eq!(outcome.late_completions, 0);
}

/// S2: `vm` evaluates `coalesce(score, p1)` where `score` was never written
/// by the upstream `source` (record not seeded), so every row falls through
/// to the bound parameter.
#[test]
fn s2_arithmetic_coalesce_with_null_param() {
    let mut plan = plan_with_nodes(
        vec![
            source_node("src", 3, "ep1"),
            Node {
                node_id: "vm".into(),
                op: "vm".into(),
                inputs: vec!["src".into()],
                params: HashMap::from([
                    ("out_key".to_string(), serde_json::json!("score")),
                    ("expr".to_string(), serde_json::json!("e1")),
                ]),
                extensions: HashMap::new(),
            },
        ],
        vec!["vm"],
    );
    plan.expr_table.insert(
        "e1".to_string(),
        Expr::Coalesce { a: Box::new(Expr::KeyRef { key: SCORE }), b: Box::new(Expr::ParamRef { param: ParamId(1) }) },
    );
    let registries = base_registries();
    let linked = validate_and_link(plan, &registries).unwrap();

    let mut kv_clients: KvClientMap = HashMap::new();
    kv_clients.insert(EndpointId("ep1".into()), Rc::new(MockKvClient::new(8)) as Rc<dyn rankflow_io::KvClient>);

    let params = HashMap::from([(ParamId(1), ParamValue::Float(7.5))]);
    let ctx = context(Arc::new(linked), Arc::new(registries), params, kv_clients, None, None);

    let outcome = current_thread_local_run(execute(ctx)).unwrap();
    let view = &outcome.results["vm"];
    let column = view.bundle().float_column(SCORE).unwrap();
    for row in view.active_indices() {
        assert_eq!(column.get(row), Some(7.5));
    }
}

fn sync_ctx(registries: &Registries, plan: &rankflow_plan::LinkedPlan) -> SyncCtx {
    SyncCtx {
        plan: Arc::new(plan.clone()),
        registries: Arc::new(registries.clone()),
        params: Arc::new(HashMap::new()),
    }
}

fn linked_filter_node(pred_id: &str, plan: &rankflow_plan::LinkedPlan) -> LinkedNode {
    LinkedNode {
        node: Node {
            node_id: "f".into(),
            op: "filter".into(),
            inputs: vec!["src".into()],
            params: HashMap::from([("pred".to_string(), serde_json::json!(pred_id))]),
            extensions: HashMap::new(),
        },
        topo_index: plan.order.len(),
        effective_writes: vec![],
        writes_effect_drifted: false,
    }
}

/// Trivial one-node linked plan carrying only a `pred_table`/`expr_table`,
/// used by the filter-semantics scenarios below which drive `run_sync`
/// directly instead of the full scheduler.
fn pred_only_plan(pred_id: &str, pred: Pred) -> rankflow_plan::LinkedPlan {
    let mut plan = plan_with_nodes(vec![], vec![]);
    plan.pred_table.insert(pred_id.to_string(), pred);
    rankflow_plan::LinkedPlan { plan, order: vec![], linked: HashMap::new() }
}

fn bundle_with_mixed_null_score(ids: Vec<i64>, values: Vec<f64>, valid: Vec<bool>) -> ColumnBundle {
    ColumnBundle::from_ids(ids).with_float_column(SCORE, FloatColumn::new(values, Validity::from_bits(valid)))
}

/// S3: `score == const_null` is IR-literal null comparison, equivalent to
/// `is_null(score)` — rows with a null score are kept, valid rows dropped.
#[test]
fn s3_filter_literal_null_keeps_null_rows() {
    let pred = Pred::Cmp { cmp: CmpOp::Eq, a: Expr::KeyRef { key: SCORE }, b: Expr::ConstNull };
    let plan = pred_only_plan("p1", pred);
    let registries = base_registries();
    let ctx = sync_ctx(&registries, &plan);
    let linked = linked_filter_node("p1", &plan);

    let bundle = bundle_with_mixed_null_score(vec![1, 2, 3, 4], vec![0.0, 9.0, 0.0, 4.0], vec![false, true, false, true]);
    let input = RowView::full(bundle);

    let outcome = run_sync(OperatorKind::Filter, &ctx, &linked, std::slice::from_ref(&input)).unwrap();
    assert_eq!(outcome.view.active_sequence(), vec![0, 2]);
}

/// S4: `score == 0.0` / `score != 0.0` against a *runtime* null both yield
/// `false` — a null row is excluded from both the predicate and its
/// negation, unlike SQL-style three-valued logic surfaced to a boolean
/// filter.
#[test]
fn s4_filter_runtime_null_always_excluded() {
    let bundle = bundle_with_mixed_null_score(vec![1, 2, 3], vec![0.0, 0.0, 5.0], vec![false, true, true]);
    let registries = base_registries();

    for (pred_id, cmp) in [("eq", CmpOp::Eq), ("ne", CmpOp::Ne)] {
        let pred = Pred::Cmp { cmp, a: Expr::KeyRef { key: SCORE }, b: Expr::ConstNumber { value: 0.0 } };
        let plan = pred_only_plan(pred_id, pred);
        let ctx = sync_ctx(&registries, &plan);
        let linked = linked_filter_node(pred_id, &plan);
        let input = RowView::full(bundle.clone());

        let outcome = run_sync(OperatorKind::Filter, &ctx, &linked, std::slice::from_ref(&input)).unwrap();
        assert!(!outcome.view.active_sequence().contains(&0), "row 0 is a runtime null and must never pass cmp={cmp:?}");
    }
}

/// S5: a `regex` predicate excludes rows whose decoded string doesn't match,
/// exercising the dict-scan cache end to end through the `filter` operator.
#[test]
fn s5_regex_dict_scan_filters_matching_rows() {
    let dict = Dictionary::new(vec!["alpha".into(), "beta".into(), "apple".into()]);
    let codes = vec![0, 1, 2];
    let string_col = StringColumn::new(dict, codes, Validity::all_valid(3));
    let bundle = ColumnBundle::from_ids(vec![1, 2, 3]).with_string_column(NAME, string_col);
    let input = RowView::full(bundle);

    let pred = Pred::Regex { key: NAME, pattern: rankflow_expr::ir::PatternSource::Literal("^a".into()), flags: String::new() };
    let plan = pred_only_plan("p1", pred);
    let registries = base_registries();
    let ctx = sync_ctx(&registries, &plan);
    let linked = linked_filter_node("p1", &plan);

    let outcome = run_sync(OperatorKind::Filter, &ctx, &linked, std::slice::from_ref(&input)).unwrap();
    assert_eq!(outcome.view.active_sequence(), vec![0, 2]);
}

/// S6: a `node_timeout` shorter than the sleep node's own delay causes the
/// whole request to fail with a timeout error, fast, instead of hanging
/// until the sleep completes.
#[test]
fn s6_deadline_exceeded_fails_fast() {
    let nodes = vec![
        source_node("src", 1, "ep1"),
        Node {
            node_id: "slow".into(),
            op: "sleep".into(),
            inputs: vec!["src".into()],
            params: HashMap::from([("duration_ms".to_string(), serde_json::json!(200))]),
            extensions: HashMap::new(),
        },
    ];
    let plan = plan_with_nodes(nodes, vec!["slow"]);
    let registries = base_registries();
    let linked = validate_and_link(plan, &registries).unwrap();

    let mut kv_clients: KvClientMap = HashMap::new();
    kv_clients.insert(EndpointId("ep1".into()), Rc::new(MockKvClient::new(8)) as Rc<dyn rankflow_io::KvClient>);

    let ctx = context(
        Arc::new(linked),
        Arc::new(registries),
        HashMap::new(),
        kv_clients,
        None,
        Some(Duration::from_millis(10)),
    );
    let late_completions = Arc::clone(&ctx.late_completions);

    // Both the execution itself and the grace period for the detached loser
    // task must share one `LocalSet` — tearing the runtime down right after
    // `execute` returns would drop that still-running task before it gets a
    // chance to lose the race and increment the counter.
    let (elapsed, result) = current_thread_local_run(async move {
        let start = Instant::now();
        let result = execute(ctx).await;
        let elapsed = start.elapsed();
        tokio::time::sleep(Duration::from_millis(250)).await;
        (elapsed, result)
    });

    assert!(elapsed < Duration::from_millis(150), "fail-fast timeout must not wait out the full sleep");
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // Invariant #11: the detached sleep eventually finishes after losing the
    // race, and is counted as a late completion rather than surfacing anywhere.
    assert!(late_completions.get() >= 1);
}

/// S7: two independent `source -> sleep(40ms)` branches joined by `concat`
/// finish in roughly one sleep's worth of wall time, not the sum of both —
/// the scheduler runs unrelated branches concurrently.
#[test]
fn s7_parallel_independent_branches_run_concurrently() {
    let nodes = vec![
        source_node("src1", 2, "ep1"),
        Node {
            node_id: "d1".into(),
            op: "sleep".into(),
            inputs: vec!["src1".into()],
            params: HashMap::from([("duration_ms".to_string(), serde_json::json!(40))]),
            extensions: HashMap::new(),
        },
        source_node("src2", 2, "ep2"),
        Node {
            node_id: "d2".into(),
            op: "sleep".into(),
            inputs: vec!["src2".into()],
            params: HashMap::from([("duration_ms".to_string(), serde_json::json!(40))]),
            extensions: HashMap::new(),
        },
        Node {
            node_id: "concat".into(),
            op: "concat".into(),
            inputs: vec!["d1".into(), "d2".into()],
            params: HashMap::new(),
            extensions: HashMap::new(),
        },
    ];
    let plan = plan_with_nodes(nodes, vec!["concat"]);
    let registries = base_registries();
    let linked = validate_and_link(plan, &registries).unwrap();
    let order = linked.order.clone();

    let mut kv_clients: KvClientMap = HashMap::new();
    kv_clients.insert(EndpointId("ep1".into()), Rc::new(MockKvClient::new(8)) as Rc<dyn rankflow_io::KvClient>);
    kv_clients.insert(EndpointId("ep2".into()), Rc::new(MockKvClient::new(8)) as Rc<dyn rankflow_io::KvClient>);

    let ctx = context(Arc::new(linked), Arc::new(registries), HashMap::new(), kv_clients, None, None);

    let start = Instant::now();
    let outcome = current_thread_local_run(execute(ctx)).unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_millis(70), "two 40ms branches should overlap, took {elapsed:?}");

    let concat_view = &outcome.results["concat"];
    assert_eq!(concat_view.logical_size(), 4);

    // Invariant #2: schema deltas are reported in topological order
    // regardless of which branch's sleep happened to finish first.
    let delta_order: Vec<&str> = outcome.schema_deltas.iter().map(|d| d.node_id.as_str()).collect();
    let expected_order: Vec<&str> = order.iter().map(String::as_str).collect();
    assert_eq!(delta_order, expected_order);
}

/// Invariant #1: when one independent branch fails, the whole request fails
/// and no node downstream of the failure (or running concurrently) can ever
/// surface a partial `results` map — `execute` returns `Err`, not a partial
/// `Ok`.
#[test]
fn invariant_fail_fast_yields_no_partial_results() {
    let nodes = vec![
        source_node("ok", 1, "ep1"),
        // References an endpoint absent from `kv_clients`, so the fetch
        // fails with a resource error as soon as it is spawned.
        source_node("broken", 1, "ep2"),
        Node {
            node_id: "joined".into(),
            op: "concat".into(),
            inputs: vec!["ok".into(), "broken".into()],
            params: HashMap::new(),
            extensions: HashMap::new(),
        },
    ];
    let plan = plan_with_nodes(nodes, vec!["joined"]);
    let registries = base_registries();
    let linked = validate_and_link(plan, &registries).unwrap();

    let mut kv_clients: KvClientMap = HashMap::new();
    kv_clients.insert(EndpointId("ep1".into()), Rc::new(MockKvClient::new(8)) as Rc<dyn rankflow_io::KvClient>);
    // "ep2" deliberately left unattached.

    let ctx = context(Arc::new(linked), Arc::new(registries), HashMap::new(), kv_clients, None, None);
    let result = current_thread_local_run(execute(ctx));

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);
}

/// `in` over a numeric expression selects only the listed values, a basic
/// sanity check on `run_sync`'s shape validation for `filter` alongside the
/// null-semantics scenarios above.
#[test]
fn filter_in_predicate_selects_listed_values() {
    let bundle = ColumnBundle::from_ids(vec![10, 20, 30]).with_float_column(
        SCORE,
        FloatColumn::all_valid(vec![1.0, 2.0, 3.0]),
    );
    let input = RowView::full(bundle);

    let pred = Pred::In { lhs: InLhs::Expr(Expr::KeyRef { key: SCORE }), list: InList::Numeric(vec![1.0, 3.0]) };
    let plan = pred_only_plan("p1", pred);
    let registries = base_registries();
    let ctx = sync_ctx(&registries, &plan);
    let linked = linked_filter_node("p1", &plan);

    let outcome = run_sync(OperatorKind::Filter, &ctx, &linked, std::slice::from_ref(&input)).unwrap();
    assert_eq!(outcome.view.active_sequence(), vec![0, 2]);
}
