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

//! `source` and `fan_out_source`: the two operators that reach outside the
//! process through a `KvClient`.
//!
//! `source` fetches one shared viewer record and broadcasts its declared
//! writes across `fanout` freshly-numbered candidate rows. `fan_out_source`
//! instead issues one fetch per candidate already produced upstream, each
//! individually gated by the endpoint's inflight limiter inside the client.

use futures::stream::{FuturesUnordered, StreamExt};

use rankflow_common::column::{ColumnBundle, Dictionary, FloatColumn, StringColumn, Validity};
use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_common::value::KeyType;
use rankflow_plan::LinkedNode;

use crate::context::ExecutionContext;

use super::{param_endpoint, param_key_id, param_str, param_str_opt, param_u64};

pub async fn run_source_fetch(ctx: &ExecutionContext, linked: &LinkedNode) -> EngineResult<RowView> {
    let node = &linked.node;
    let fanout = param_u64(node, "fanout")? as usize;
    let endpoint = param_endpoint(node, "endpoint")?;
    let key_template = param_str_opt(node, "key_template").unwrap_or("user:{user_id}");
    let key = key_template.replace("{user_id}", &ctx.user_id.to_string());

    let client = ctx.kv_client(&endpoint)?;
    let record = client.get(&key).await?;

    let ids: Vec<i64> = (1..=fanout as i64).collect();
    let mut bundle = ColumnBundle::from_ids(ids);

    if let Some(record) = &record {
        for &key_id in &linked.effective_writes {
            let Some(entry) = ctx.registries.keys.get(key_id) else { continue };
            match entry.ty {
                KeyType::Float => {
                    if let Some(v) = record.fields.get(&entry.name).and_then(|v| v.as_f64()) {
                        bundle = bundle.with_float_column(key_id, FloatColumn::all_valid(vec![v; fanout]));
                    }
                }
                KeyType::String => {
                    if let Some(v) = record.fields.get(&entry.name).and_then(|v| v.as_str()) {
                        let dict = Dictionary::new(vec![v.to_string()]);
                        bundle = bundle.with_string_column(
                            key_id,
                            StringColumn::new(dict, vec![0; fanout], Validity::all_valid(fanout)),
                        );
                    }
                }
                KeyType::Id => {}
            }
        }
    }

    Ok(RowView::full(bundle))
}

pub async fn run_fan_out_source(ctx: &ExecutionContext, linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<RowView> {
    let node = &linked.node;
    let input = inputs
        .first()
        .ok_or_else(|| EngineError::validation(format!("node `{}` (fan_out_source) requires one input", node.node_id)))?;

    let endpoint = param_endpoint(node, "endpoint")?;
    let key_template = param_str(node, "key_template")?;
    let out_key = param_key_id(node, "out_key", &ctx.registries)?;
    if !ctx.registries.keys.is_writable(out_key) {
        return Err(EngineError::validation(format!(
            "node `{}` writes to non-writable key `{out_key}`",
            node.node_id
        )));
    }

    let client = ctx.kv_client(&endpoint)?;
    let len = input.bundle().len();
    let mut values = vec![0.0; len];
    let mut valid = vec![false; len];

    // One remote read per candidate, issued concurrently and gated only by
    // the endpoint's own inflight limiter inside `client.get` — a sequential loop here would serialize fetches and make
    // the limiter's FIFO-fair queueing moot.
    let mut pending: FuturesUnordered<_> = input
        .active_indices()
        .map(|row| {
            let id = input.bundle().id_at(row);
            let key = key_template.replace("{id}", &id.to_string());
            let client = &client;
            async move { (row, client.get(&key).await) }
        })
        .collect();

    while let Some((row, result)) = pending.next().await {
        if let Some(record) = result? {
            if let Some(v) = record.fields.get("value").and_then(|v| v.as_f64()) {
                values[row] = v;
                valid[row] = true;
            }
        }
    }

    let bundle = input.bundle().with_float_column(out_key, FloatColumn::new(values, Validity::from_bits(valid)));
    // `source-fanout-dense` shaped: a fresh dense view over the new bundle,
    // not `input`'s own selection/permutation carried forward.
    Ok(RowView::full(bundle))
}
