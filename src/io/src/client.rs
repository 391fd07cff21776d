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

//! The async I/O client adapter's public contract: an
//! arbitrary callback-based key-value driver presented as a coroutine
//! awaitable used by source operators. Fail-fast, no reconnection.

use async_trait::async_trait;
use rankflow_common::error::EngineResult;

/// One record fetched from a key-value store: an opaque JSON blob keyed by
/// the record's own numeric identifier (the `id` the `source` operator's
/// row-identifier column is populated from).
#[derive(Debug, Clone)]
pub struct KvRecord {
    pub id: i64,
    pub fields: serde_json::Value,
}

/// A key-value store client, attached to the event loop and assumed to be
/// used only from the loop thread. Implementations must be
/// fail-fast: no automatic reconnection on failure.
#[async_trait(?Send)]
pub trait KvClient {
    /// Fetches a single record by key. Used by the `source fetch` operator.
    async fn get(&self, key: &str) -> EngineResult<Option<KvRecord>>;

    /// Fetches multiple records, one remote read per key, each individually
    /// co-acquiring the endpoint's inflight permit. Used by
    /// `fan-out-source`. The default implementation issues sequential
    /// `get`s; real drivers (e.g. the Redis client) should override this
    /// with a pipelined/batched request where the wire protocol supports it.
    async fn mget(&self, keys: &[String]) -> EngineResult<Vec<Option<KvRecord>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }
}
