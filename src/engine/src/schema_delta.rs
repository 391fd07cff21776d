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

//! One node's schema delta: the input key union, the output keys, and what was added and
//! removed, computed after the node finishes and reported in topological
//! order regardless of completion order.

use std::collections::BTreeSet;

use rankflow_common::row_view::RowView;
use rankflow_common::value::KeyId;
use rankflow_plan::NodeId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SchemaDelta {
    pub node_id: NodeId,
    pub input_keys: Vec<KeyId>,
    pub output_keys: Vec<KeyId>,
    pub added: Vec<KeyId>,
    pub removed: Vec<KeyId>,
}

impl SchemaDelta {
    pub fn compute(node_id: impl Into<String>, inputs: &[RowView], output: &RowView) -> Self {
        let mut input_keys: BTreeSet<KeyId> = BTreeSet::new();
        for view in inputs {
            input_keys.extend(view.bundle().schema_keys());
        }
        let output_keys: BTreeSet<KeyId> = output.bundle().schema_keys();

        let added: Vec<KeyId> = output_keys.difference(&input_keys).copied().collect();
        let removed: Vec<KeyId> = input_keys.difference(&output_keys).copied().collect();

        SchemaDelta {
            node_id: node_id.into(),
            input_keys: input_keys.into_iter().collect(),
            output_keys: output_keys.into_iter().collect(),
            added,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use rankflow_common::column::{ColumnBundle, FloatColumn};

    use super::*;

    #[test]
    fn reports_added_key() {
        let input_bundle = ColumnBundle::from_ids(vec![1, 2]);
        let input = RowView::full(input_bundle.clone());
        let output_bundle = input_bundle.with_float_column(KeyId(10), FloatColumn::all_valid(vec![1.0, 2.0]));
        let output = RowView::full(output_bundle);

        let delta = SchemaDelta::compute("n1", &[input], &output);
        assert_eq!(delta.added, vec![KeyId(10)]);
        assert!(delta.removed.is_empty());
    }
}
