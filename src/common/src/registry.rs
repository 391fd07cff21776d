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

//! The four process-wide immutable registries. Each is
//! loaded once from a JSON artifact at startup and never mutated afterwards,
//! matching `risingwave_common::catalog`'s read-only-after-build tables.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::digest::canonical_digest;
use crate::error::{EngineError, EngineResult};
use crate::value::{EndpointId, EndpointKind, KeyId, KeyType, Lifecycle, ParamId, ParamType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: KeyType,
    pub lifecycle: Lifecycle,
    pub nullable: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRegistry {
    pub keys: HashMap<KeyId, KeyEntry>,
}

impl KeyRegistry {
    pub fn get(&self, id: KeyId) -> Option<&KeyEntry> {
        self.keys.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<(KeyId, &KeyEntry)> {
        self.keys.iter().find(|(_, e)| e.name == name).map(|(id, e)| (*id, e))
    }

    /// `KeyId=1` is reserved for the row identifier and is
    /// never writable.
    pub fn is_writable(&self, id: KeyId) -> bool {
        if id.is_row_id() {
            return false;
        }
        self.keys.get(&id).map(|e| e.writable).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub allow_write: bool,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamRegistry {
    pub params: HashMap<ParamId, ParamEntry>,
}

impl ParamRegistry {
    pub fn get(&self, id: ParamId) -> Option<&ParamEntry> {
        self.params.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<(ParamId, &ParamEntry)> {
        self.params.iter().find(|(_, e)| e.name == name).map(|(id, e)| (*id, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointPolicy {
    pub max_inflight: u32,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        // Limit defaults to 64 or is drawn from endpoint policy.
        EndpointPolicy {
            max_inflight: 64,
            connect_timeout_ms: 1000,
            request_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub name: String,
    pub kind: EndpointKind,
    pub host: String,
    pub port: u16,
    pub policy: EndpointPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointRegistry {
    pub endpoints: HashMap<EndpointId, EndpointEntry>,
}

impl EndpointRegistry {
    pub fn get(&self, id: &EndpointId) -> Option<&EndpointEntry> {
        self.endpoints.get(id)
    }
}

/// The parameter schema, read set, static write set, output-shape pattern,
/// and optional writes-effect expression for one operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskManifestEntry {
    pub op: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub reads: Vec<KeyId>,
    pub static_writes: Vec<KeyId>,
    pub output_shape: String,
    pub has_async_impl: bool,
    /// Opaque `WritesEffect` tree, parsed and evaluated by
    /// `rankflow_plan` — kept untyped here to avoid a dependency cycle.
    #[serde(default)]
    pub writes_effect: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskManifest {
    pub ops: HashMap<String, TaskManifestEntry>,
}

impl TaskManifest {
    pub fn get(&self, op: &str) -> EngineResult<&TaskManifestEntry> {
        self.ops
            .get(op)
            .ok_or_else(|| EngineError::validation(format!("unknown operator `{op}`")))
    }
}

/// Load-time status of a capability:
/// unknown capabilities reject the plan outright; `blocked` capabilities are
/// known but not yet implemented and also reject at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    Active,
    Blocked,
}

/// One entry of the capability registry: a capability id plus the JSON
/// schema its `extensions` payload must satisfy (most payloads are empty
/// objects).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub status: CapabilityStatus,
    #[serde(default = "default_payload_schema")]
    pub payload_schema: serde_json::Value,
}

fn default_payload_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "additionalProperties": false})
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityRegistry {
    pub capabilities: HashMap<String, CapabilityEntry>,
}

impl CapabilityRegistry {
    pub fn get(&self, id: &str) -> Option<&CapabilityEntry> {
        self.capabilities.get(id)
    }
}

/// The registries bundled together, as loaded once at process start
///.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    pub keys: KeyRegistry,
    pub params: ParamRegistry,
    pub endpoints: EndpointRegistry,
    pub task_manifest: TaskManifest,
    pub capabilities: CapabilityRegistry,
}

impl Registries {
    /// Canonical-JSON SHA-256 digest, used for the `capability_registry_digest`
    /// printed by `--print-registry`.
    pub fn capability_registry_digest(&self) -> EngineResult<String> {
        let value = serde_json::json!({
            "keys": &self.keys,
            "params": &self.params,
            "endpoints": &self.endpoints,
            "capabilities": &self.capabilities,
        });
        canonical_digest(&value)
    }

    pub fn task_manifest_digest(&self) -> EngineResult<String> {
        canonical_digest(&serde_json::to_value(&self.task_manifest).map_err(|e| {
            EngineError::validation(format!("task manifest is not valid JSON: {e}"))
        })?)
    }

    /// Loads all five registries from JSON artifacts in `dir`: `keys.json`,
    /// `params.json`, `endpoints.json`, `task_manifest.json`,
    /// `capabilities.json`. Mirrors how `risingwave_common`'s catalog types
    /// round-trip through `serde` at startup rather than being built in code.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref();
        Ok(Registries {
            keys: read_artifact(dir, "keys.json")?,
            params: read_artifact(dir, "params.json")?,
            endpoints: read_artifact(dir, "endpoints.json")?,
            task_manifest: read_artifact(dir, "task_manifest.json")?,
            capabilities: read_artifact(dir, "capabilities.json")?,
        })
    }
}

fn read_artifact<T: for<'de> Deserialize<'de>>(dir: &Path, file_name: &str) -> EngineResult<T> {
    let path = dir.join(file_name);
    let bytes = std::fs::read(&path).map_err(|e| EngineError::validation(format!("cannot read registry artifact {path:?}: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::validation(format!("invalid registry artifact {path:?}: {e}")))
}

#[cfg(test)]
mod artifact_tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_from_dir_reads_all_five_artifacts() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("keys.json"), r#"{"keys":{}}"#).unwrap();
        std::fs::write(dir.path().join("params.json"), r#"{"params":{}}"#).unwrap();
        std::fs::write(dir.path().join("endpoints.json"), r#"{"endpoints":{}}"#).unwrap();
        std::fs::write(dir.path().join("task_manifest.json"), r#"{"ops":{}}"#).unwrap();
        std::fs::write(dir.path().join("capabilities.json"), r#"{"capabilities":{}}"#).unwrap();

        let registries = Registries::load_from_dir(dir.path()).unwrap();
        assert!(registries.keys.keys.is_empty());
        assert!(registries.task_manifest.ops.is_empty());
    }

    #[test]
    fn load_from_dir_rejects_missing_artifact() {
        let dir = tempdir().unwrap();
        assert!(Registries::load_from_dir(dir.path()).is_err());
    }
}
