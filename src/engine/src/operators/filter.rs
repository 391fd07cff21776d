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

//! `filter`: narrows the active selection by a three-valued predicate
//!. Null/unknown rows are excluded.

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_expr::eval::{eval_pred, EvalContext};
use rankflow_plan::LinkedNode;

use super::{param_str, SyncCtx};

pub fn run(ctx: &SyncCtx, linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<RowView> {
    let node = &linked.node;
    let input = inputs
        .first()
        .ok_or_else(|| EngineError::validation(format!("node `{}` (filter) requires one input", node.node_id)))?;

    let pred_id = param_str(node, "pred")?;
    let pred = ctx.plan.plan.pred_table.get(pred_id).ok_or_else(|| {
        EngineError::validation(format!("node `{}` param `pred` references unknown pred `{pred_id}`", node.node_id))
    })?;

    let eval_ctx = EvalContext::new(input.bundle(), &ctx.params);
    let mut first_error = None;
    let view = input.select(|row| match eval_pred(pred, &eval_ctx, row) {
        Ok(result) => result.as_filter_bool(),
        Err(e) => {
            if first_error.is_none() {
                first_error = Some(e);
            }
            false
        }
    });

    if let Some(e) = first_error {
        return Err(e);
    }
    Ok(view)
}
