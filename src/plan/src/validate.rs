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

//! The plan parser/linker/validator. Validation is
//! fail-closed and runs entirely before execution.

use std::collections::{HashMap, HashSet, VecDeque};

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::registry::Registries;
use rankflow_common::value::{EndpointId, KeyId, ParamValue};

use crate::model::{Node, NodeId, Plan, SUPPORTED_SCHEMA_VERSION};
use crate::writes_effect::{eval_writes_effect, EffectEnv, EffectResult, WritesEffect};

/// The effective write set and topological position computed for one node
/// during validation, retained for the scheduler and for `--dump-run-trace`.
#[derive(Debug, Clone)]
pub struct LinkedNode {
    pub node: Node,
    pub topo_index: usize,
    pub effective_writes: Vec<KeyId>,
    pub writes_effect_drifted: bool,
}

#[derive(Debug, Clone)]
pub struct LinkedPlan {
    pub plan: Plan,
    pub order: Vec<NodeId>,
    pub linked: HashMap<NodeId, LinkedNode>,
}

impl LinkedPlan {
    pub fn node(&self, id: &str) -> &LinkedNode {
        &self.linked[id]
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.plan.outputs
    }
}

/// Validates `plan` against `registries` and links it into execution order.
/// Fails closed: the first violated rule aborts with a `ValidationError`
/// naming the offending node/key/param.
pub fn validate_and_link(plan: Plan, registries: &Registries) -> EngineResult<LinkedPlan> {
    check_schema_version(&plan)?;
    let order = check_acyclic_and_unique(&plan)?;
    check_operators_and_params(&plan, registries)?;
    check_regex_flags(&plan)?;
    check_no_row_id_writes(&plan, registries)?;
    check_capabilities(&plan, registries)?;
    check_endpoint_references(&plan, registries)?;

    let linked = link_writes_effects(&plan, registries, &order)?;

    Ok(LinkedPlan { plan, order, linked })
}

fn check_schema_version(plan: &Plan) -> EngineResult<()> {
    if plan.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(EngineError::validation(format!(
            "unsupported schema_version {} (expected {})",
            plan.schema_version, SUPPORTED_SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Rule 2 (unique node ids, inputs reference prior nodes) and rule 3 (no
/// cycles), via Kahn's algorithm — every node must be consumed.
fn check_acyclic_and_unique(plan: &Plan) -> EngineResult<Vec<NodeId>> {
    let mut seen = HashSet::new();
    for node in &plan.nodes {
        if !seen.insert(node.node_id.clone()) {
            return Err(EngineError::validation(format!("duplicate node id `{}`", node.node_id)));
        }
    }

    let ids: HashSet<&str> = plan.nodes.iter().map(|n| n.node_id.as_str()).collect();
    for node in &plan.nodes {
        for input in &node.inputs {
            if !ids.contains(input.as_str()) {
                return Err(EngineError::validation(format!(
                    "node `{}` references unknown input `{input}`",
                    node.node_id
                )));
            }
        }
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &plan.nodes {
        in_degree.entry(node.node_id.as_str()).or_insert(0);
        for input in &node.inputs {
            *in_degree.entry(node.node_id.as_str()).or_insert(0) += 1;
            successors.entry(input.as_str()).or_default().push(node.node_id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = plan
        .nodes
        .iter()
        .map(|n| n.node_id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(plan.nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        if let Some(succs) = successors.get(id) {
            for &succ in succs {
                let degree = in_degree.get_mut(succ).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    if order.len() != plan.nodes.len() {
        return Err(EngineError::validation("plan contains a cycle"));
    }
    Ok(order)
}

/// Rule 4: operator name known, parameters match the manifest schema.
fn check_operators_and_params(plan: &Plan, registries: &Registries) -> EngineResult<()> {
    for node in &plan.nodes {
        let manifest = registries.task_manifest.get(&node.op).map_err(|_| {
            EngineError::validation(format!("node `{}` uses unknown operator `{}`", node.node_id, node.op))
        })?;

        for required in &manifest.required_params {
            if !node.params.contains_key(required) {
                return Err(EngineError::validation(format!(
                    "node `{}` is missing required param `{required}`",
                    node.node_id
                )));
            }
        }

        for name in node.params.keys() {
            if !manifest.required_params.contains(name) && !manifest.optional_params.contains(name) {
                return Err(EngineError::validation(format!(
                    "node `{}` has unknown param `{name}` for operator `{}`",
                    node.node_id, node.op
                )));
            }
        }

        for (name, value) in &node.params {
            if let Some(expr_id) = value.as_str() {
                if name == "expr" && !plan.expr_table.contains_key(expr_id) {
                    return Err(EngineError::validation(format!(
                        "node `{}` param `{name}` references unknown expr `{expr_id}`",
                        node.node_id
                    )));
                }
                if name == "pred" && !plan.pred_table.contains_key(expr_id) {
                    return Err(EngineError::validation(format!(
                        "node `{}` param `{name}` references unknown pred `{expr_id}`",
                        node.node_id
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Rule 4 (regex flags): every `Pred::Regex` reachable from `pred_table`,
/// including nested under `and`/`or`/`not`, uses only the flags
/// `rankflow_expr::Pred::validate_regex_flags` accepts.
fn check_regex_flags(plan: &Plan) -> EngineResult<()> {
    fn walk(id: &str, pred: &rankflow_expr::Pred) -> EngineResult<()> {
        use rankflow_expr::Pred;
        match pred {
            Pred::And { a, b } | Pred::Or { a, b } => {
                walk(id, a)?;
                walk(id, b)
            }
            Pred::Not { a } => walk(id, a),
            Pred::Regex { flags, .. } => {
                if !Pred::validate_regex_flags(flags) {
                    return Err(EngineError::validation(format!("pred `{id}` uses unsupported regex flags `{flags}`")));
                }
                Ok(())
            }
            Pred::ConstBool { .. } | Pred::Cmp { .. } | Pred::In { .. } | Pred::IsNull { .. } | Pred::NotNull { .. } => Ok(()),
        }
    }

    for (id, pred) in &plan.pred_table {
        walk(id, pred)?;
    }
    Ok(())
}

/// Rule 5: no node writes `KeyId=1`.
fn check_no_row_id_writes(plan: &Plan, registries: &Registries) -> EngineResult<()> {
    for node in &plan.nodes {
        let manifest = registries.task_manifest.get(&node.op)?;
        if manifest.static_writes.iter().any(|k| k.is_row_id()) {
            return Err(EngineError::validation(format!(
                "node `{}` declares a static write to the reserved row-identifier key",
                node.node_id
            )));
        }
        if let Some(out_key) = node.params.get("out_key").and_then(|v| v.as_str()) {
            if let Some((key_id, _)) = registries.keys.by_name(out_key) {
                if key_id.is_row_id() {
                    return Err(EngineError::validation(format!(
                        "node `{}` attempts to write the reserved row-identifier key via `out_key`",
                        node.node_id
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Rule 6: `capabilities_required` sorted/unique; every `extensions` key is
/// required; every extension payload matches its capability's schema.
fn check_capabilities(plan: &Plan, registries: &Registries) -> EngineResult<()> {
    let sorted = {
        let mut sorted = plan.capabilities_required.clone();
        sorted.sort();
        sorted.dedup();
        sorted
    };
    if sorted != plan.capabilities_required {
        return Err(EngineError::validation("capabilities_required must be sorted and duplicate-free"));
    }

    let required: HashSet<&str> = plan.capabilities_required.iter().map(String::as_str).collect();
    for cap in &plan.capabilities_required {
        match registries.capabilities.get(cap) {
            None => return Err(EngineError::validation(format!("unknown capability `{cap}`"))),
            Some(entry) => {
                if entry.status == rankflow_common::registry::CapabilityStatus::Blocked {
                    return Err(EngineError::validation(format!("capability `{cap}` is blocked")));
                }
            }
        }
    }

    for key in plan.extensions.keys() {
        if !required.contains(key.as_str()) {
            return Err(EngineError::validation(format!(
                "extension `{key}` is not declared in capabilities_required"
            )));
        }
    }

    Ok(())
}

/// Rule 9: endpoint references in params resolve in the registry and have a
/// matching kind. We look for any param whose value looks like an
/// `ep_####`-formatted string, matching the endpoint id wire format.
fn check_endpoint_references(plan: &Plan, registries: &Registries) -> EngineResult<()> {
    for node in &plan.nodes {
        if let Some(endpoint) = node.params.get("endpoint").and_then(|v| v.as_str()) {
            let id = EndpointId(endpoint.to_string());
            if registries.endpoints.get(&id).is_none() {
                return Err(EngineError::validation(format!(
                    "node `{}` references unknown endpoint `{endpoint}`",
                    node.node_id
                )));
            }
        }
    }
    Ok(())
}

/// Rule 8: evaluates the writes-effect per node against the bound param
/// environment, recording the effective write set (static writes union
/// evaluation result) on each linked node.
fn link_writes_effects(
    plan: &Plan,
    registries: &Registries,
    order: &[NodeId],
) -> EngineResult<HashMap<NodeId, LinkedNode>> {
    let mut linked = HashMap::new();
    for (topo_index, id) in order.iter().enumerate() {
        let node = plan.node(id).expect("topo order only contains known node ids").clone();
        let manifest = registries.task_manifest.get(&node.op)?;

        let bound: HashMap<String, String> = node
            .params
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        let resolve_key_name = |name: &str| registries.keys.by_name(name).map(|(id, _)| id);
        let env = EffectEnv::new(&bound, &resolve_key_name);

        let mut effective: Vec<KeyId> = manifest.static_writes.clone();
        let mut drifted = false;

        if let Some(raw) = &manifest.writes_effect {
            let effect: WritesEffect = serde_json::from_value(raw.clone()).map_err(|e| {
                EngineError::validation(format!("node `{}` has an invalid writes_effect: {e}", node.node_id))
            })?;
            match eval_writes_effect(&effect, &env) {
                EffectResult::Exact(keys) | EffectResult::May(keys) => effective.extend(keys),
                EffectResult::Unknown => drifted = true,
            }
        }

        effective.sort();
        effective.dedup();

        linked.insert(
            node.node_id.clone(),
            LinkedNode { node, topo_index, effective_writes: effective, writes_effect_drifted: drifted },
        );
    }
    Ok(linked)
}

/// Rule 7: `param_overrides` validated against the parameter registry
/// (writable, active, type, finite). Called separately from plan linking
/// since overrides arrive with the request, not the plan.
pub fn validate_param_overrides(
    overrides: &HashMap<String, ParamValue>,
    registries: &Registries,
) -> EngineResult<()> {
    for (name, value) in overrides {
        let (_, entry) = registries.params.by_name(name).ok_or_else(|| {
            EngineError::validation(format!("param_overrides references unknown param `{name}`"))
        })?;
        if !entry.allow_write {
            return Err(EngineError::validation(format!("param `{name}` is not writable via overrides")));
        }
        if entry.lifecycle != rankflow_common::value::Lifecycle::Active {
            return Err(EngineError::validation(format!("param `{name}` is not active")));
        }
        if entry.ty != value.type_name() {
            return Err(EngineError::validation(format!(
                "param `{name}` expected type {:?}, got {:?}",
                entry.ty,
                value.type_name()
            )));
        }
        if !value.is_finite() {
            return Err(EngineError::validation(format!("param `{name}` must be finite")));
        }
    }
    Ok(())
}
