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

//! `vm`: evaluates an arithmetic expression per active row, writing one
//! float column.

use rankflow_common::column::{FloatColumn, Validity};
use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_expr::eval::{eval_expr, EvalContext};
use rankflow_plan::LinkedNode;

use super::{param_key_id, param_str, SyncCtx};

pub fn run(ctx: &SyncCtx, linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<RowView> {
    let node = &linked.node;
    let input = inputs
        .first()
        .ok_or_else(|| EngineError::validation(format!("node `{}` (vm) requires one input", node.node_id)))?;

    let out_key = param_key_id(node, "out_key", &ctx.registries)?;
    if !ctx.registries.keys.is_writable(out_key) {
        return Err(EngineError::validation(format!(
            "node `{}` writes to non-writable key `{out_key}`",
            node.node_id
        )));
    }

    let expr_id = param_str(node, "expr")?;
    let expr = ctx.plan.plan.expr_table.get(expr_id).ok_or_else(|| {
        EngineError::validation(format!("node `{}` param `expr` references unknown expr `{expr_id}`", node.node_id))
    })?;

    let len = input.bundle().len();
    let mut values = vec![0.0; len];
    let mut valid = vec![false; len];
    let eval_ctx = EvalContext::new(input.bundle(), &ctx.params);
    for row in input.active_indices() {
        if let Some(v) = eval_expr(expr, &eval_ctx, row)? {
            values[row] = v;
            valid[row] = true;
        }
    }

    let new_bundle = input.bundle().with_float_column(out_key, FloatColumn::new(values, Validity::from_bits(valid)));
    Ok(input.with_bundle(new_bundle))
}
