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

//! An in-memory `KvClient` for tests and the `fan-out-source`/`source fetch`
//! operator test suite, standing in for a real endpoint without a Redis
//! server.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rankflow_common::error::{EngineError, EngineResult};
use rankflow_runtime::InflightLimiter;

use crate::client::{KvClient, KvRecord};

/// Keyed by the same string keys real operators issue to `KvClient::get`.
pub struct MockKvClient {
    records: Mutex<HashMap<String, serde_json::Value>>,
    limiter: InflightLimiter,
    artificial_delay: Duration,
}

impl MockKvClient {
    pub fn new(max_inflight: u32) -> Self {
        MockKvClient {
            records: Mutex::new(HashMap::new()),
            limiter: InflightLimiter::new(max_inflight),
            artificial_delay: Duration::ZERO,
        }
    }

    /// Used by scheduling tests to make fetches
    /// take a fixed, observable amount of wall time.
    pub fn with_artificial_delay(mut self, delay: Duration) -> Self {
        self.artificial_delay = delay;
        self
    }

    pub fn seed(&self, key: impl Into<String>, fields: serde_json::Value) {
        self.records.lock().unwrap().insert(key.into(), fields);
    }
}

#[async_trait(?Send)]
impl KvClient for MockKvClient {
    async fn get(&self, key: &str) -> EngineResult<Option<KvRecord>> {
        let _permit = self.limiter.acquire().await;
        if !self.artificial_delay.is_zero() {
            tokio::time::sleep(self.artificial_delay).await;
        }
        let fields = self.records.lock().unwrap().get(key).cloned();
        match fields {
            None => Ok(None),
            Some(fields) => {
                let id = fields
                    .get("id")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| EngineError::resource(format!("mock record `{key}` is missing its `id` field")))?;
                Ok(Some(KvRecord { id, fields }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_seeded_record() {
        let client = MockKvClient::new(8);
        client.seed("user:1", serde_json::json!({"id": 1, "name": "a"}));
        let record = client.get("user:1").await.unwrap().unwrap();
        assert_eq!(record.id, 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let client = MockKvClient::new(8);
        assert!(client.get("missing").await.unwrap().is_none());
    }
}
