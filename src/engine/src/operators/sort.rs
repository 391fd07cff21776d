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

//! `sort`: reorders the active sequence by a float key, nulls last
//!.

use std::cmp::Ordering;

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_plan::LinkedNode;

use super::{param_bool, param_key_id, SyncCtx};

pub fn run(ctx: &SyncCtx, linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<RowView> {
    let node = &linked.node;
    let input = inputs
        .first()
        .ok_or_else(|| EngineError::validation(format!("node `{}` (sort) requires one input", node.node_id)))?;

    let key_id = param_key_id(node, "key", &ctx.registries)?;
    let descending = param_bool(node, "descending", false);
    let column = input.bundle().float_column(key_id);

    let mut active: Vec<usize> = input.active_indices().collect();
    active.sort_by(|&a, &b| {
        let va = column.and_then(|c| c.get(a));
        let vb = column.and_then(|c| c.get(b));
        match (va, vb) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            // Nulls sort last regardless of direction.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });

    Ok(input.reorder(active))
}
