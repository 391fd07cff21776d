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

//! `concat`: stacks two materialized views into one dense bundle, keeping
//! only the keys present on both sides.

use rankflow_common::column::ColumnBundle;
use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_common::value::KeyId;
use rankflow_plan::LinkedNode;

use super::SyncCtx;

pub fn run(ctx: &SyncCtx, linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<RowView> {
    let node = &linked.node;
    if inputs.len() != 2 {
        return Err(EngineError::validation(format!("node `{}` (concat) requires exactly two inputs", node.node_id)));
    }

    let lhs = inputs[0].materialize();
    let rhs = inputs[1].materialize();
    let mut keys: Vec<KeyId> = lhs.schema_keys().intersection(&rhs.schema_keys()).copied().collect();
    keys.sort();

    if let Some(declared) = node.params.get("output_keys") {
        let declared_names: Vec<String> = serde_json::from_value(declared.clone()).map_err(|e| {
            EngineError::validation(format!("node `{}` param `output_keys` must be a list of key names: {e}", node.node_id))
        })?;
        let mut declared_ids: Vec<KeyId> = declared_names
            .iter()
            .map(|name| {
                ctx.registries.keys.by_name(name).map(|(id, _)| id).ok_or_else(|| {
                    EngineError::validation(format!(
                        "node `{}` param `output_keys` references unknown key `{name}`",
                        node.node_id
                    ))
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        declared_ids.sort();
        if declared_ids != keys {
            return Err(EngineError::validation(format!(
                "node `{}` (concat) declared output_keys do not match the inputs' schema intersection",
                node.node_id
            )));
        }
    }

    let bundle = ColumnBundle::concat_dense(&lhs, &rhs, &keys);
    Ok(RowView::full(bundle))
}
