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

//! The plan store: a directory containing one JSON file
//! per plan plus an `index.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rankflow_common::digest::canonical_digest_of;
use rankflow_common::error::{EngineError, EngineResult};

use crate::model::{BuiltBy, Plan};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub path: String,
    pub digest: String,
    pub capabilities_digest: String,
    pub built_by: BuiltBy,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Index {
    pub schema_version: u32,
    pub plans: Vec<IndexEntry>,
}

/// Plan names must match `[A-Za-z0-9_]+` — no path traversal.
fn is_valid_plan_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct PlanStore {
    dir: PathBuf,
    index: Index,
    plans_by_name: HashMap<String, IndexEntry>,
}

impl PlanStore {
    /// Loads `index.json` from `dir` and validates every entry's name.
    pub fn load(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let index_path = dir.join("index.json");
        let bytes = std::fs::read(&index_path)
            .map_err(|e| EngineError::validation(format!("cannot read plan store index {index_path:?}: {e}")))?;
        let index: Index = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::validation(format!("invalid plan store index: {e}")))?;

        let mut plans_by_name = HashMap::new();
        for entry in &index.plans {
            if !is_valid_plan_name(&entry.name) {
                return Err(EngineError::validation(format!("invalid plan name `{}` in index", entry.name)));
            }
            plans_by_name.insert(entry.name.clone(), entry.clone());
        }

        Ok(PlanStore { dir, index, plans_by_name })
    }

    pub fn list(&self) -> &[IndexEntry] {
        &self.index.plans
    }

    /// Loads and parses a plan by its registered name, rejecting any
    /// artifact whose `plan_name` differs from its source-file stem.
    pub fn load_plan_by_name(&self, name: &str) -> EngineResult<Plan> {
        let entry = self
            .plans_by_name
            .get(name)
            .ok_or_else(|| EngineError::validation(format!("no plan named `{name}` in store")))?;
        self.load_plan_from_path(&entry.path)
    }

    pub fn load_plan_from_path(&self, relative_or_absolute: &str) -> EngineResult<Plan> {
        let path = Path::new(relative_or_absolute);
        let path = if path.is_absolute() { path.to_path_buf() } else { self.dir.join(path) };
        load_plan_file(&path)
    }
}

/// Loads and validates a single plan artifact file, independent of any
/// store/index (used by `--plan <path>`).
pub fn load_plan_file(path: &Path) -> EngineResult<Plan> {
    let bytes = std::fs::read(path).map_err(|e| EngineError::validation(format!("cannot read plan file {path:?}: {e}")))?;
    let plan: Plan = serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::validation(format!("invalid plan artifact {path:?}: {e}")))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| EngineError::validation(format!("plan file {path:?} has no valid file stem")))?;
    if plan.plan_name != stem {
        return Err(EngineError::validation(format!(
            "plan_name `{}` does not match source file stem `{stem}`",
            plan.plan_name
        )));
    }
    Ok(plan)
}

/// The plan artifact's canonical-JSON digest.
pub fn plan_digest(plan: &Plan) -> EngineResult<String> {
    canonical_digest_of(plan)
}
