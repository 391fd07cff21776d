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

//! `sleep`: a pure delay, passing its input through unchanged. Used by
//! scenario tests to manufacture observable concurrency between branches.

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_plan::model::Node;

use super::param_u64;

pub async fn run(node: &Node, inputs: &[RowView]) -> EngineResult<RowView> {
    let input = inputs
        .first()
        .ok_or_else(|| EngineError::validation(format!("node `{}` (sleep) requires one input", node.node_id)))?;
    let duration_ms = param_u64(node, "duration_ms")?;
    rankflow_runtime::sleep(duration_ms).await;
    Ok(input.clone())
}
