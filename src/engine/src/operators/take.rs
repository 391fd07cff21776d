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

//! `take`: truncates the active sequence to its first `count` rows
//!.

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;
use rankflow_plan::LinkedNode;

use super::param_u64;

pub fn run(linked: &LinkedNode, inputs: &[RowView]) -> EngineResult<RowView> {
    let node = &linked.node;
    let input = inputs
        .first()
        .ok_or_else(|| EngineError::validation(format!("node `{}` (take) requires one input", node.node_id)))?;

    let count = param_u64(node, "count")? as usize;
    Ok(input.truncate(count))
}
