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

//! The plan artifact model: a bit-stable JSON
//! document describing a DAG of named operators.

use std::collections::HashMap;

use rankflow_expr::{Expr, Pred};
use serde::{Deserialize, Serialize};

pub type NodeId = String;
pub type ExprId = String;
pub type PredId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<NodeId>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltBy {
    pub backend: String,
    pub tool: String,
    pub tool_version: String,
}

/// Canonical form (keys sorted, no insignificant whitespace)
/// is produced by `rankflow_common::digest`, not by this struct's own
/// `Serialize` impl — `serde_json::Value` round-tripping is what normalizes
/// key order before digesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub schema_version: u32,
    pub plan_name: String,
    pub nodes: Vec<Node>,
    pub outputs: Vec<NodeId>,
    #[serde(default)]
    pub expr_table: HashMap<ExprId, Expr>,
    #[serde(default)]
    pub pred_table: HashMap<PredId, Pred>,
    #[serde(default)]
    pub capabilities_required: Vec<String>,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
    pub built_by: BuiltBy,
}

impl Plan {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == id)
    }
}

/// The current plan schema version this engine understands.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;
