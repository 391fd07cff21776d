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

//! A Redis-backed `KvClient`. Uses `redis`'s multiplexed async
//! connection, which is itself a callback/future bridge comparable to
//! a per-command state object; we add the inflight limiter and a
//! per-command timeout on top of it.

use std::time::Duration;

use async_trait::async_trait;
use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::value::EndpointId;
use rankflow_runtime::InflightLimiter;
use redis::AsyncCommands;

use crate::client::{KvClient, KvRecord};

pub struct RedisKvClient {
    endpoint: EndpointId,
    connection: redis::aio::ConnectionManager,
    limiter: InflightLimiter,
    request_timeout: Duration,
}

impl RedisKvClient {
    /// Connects lazily, once per endpoint per process, and is reused for the
    /// engine's lifetime.
    pub async fn connect(
        endpoint: EndpointId,
        host: &str,
        port: u16,
        max_inflight: u32,
        request_timeout_ms: u64,
    ) -> EngineResult<Self> {
        let url = format!("redis://{host}:{port}");
        let client = redis::Client::open(url)
            .map_err(|e| EngineError::resource(format!("invalid redis endpoint `{endpoint}`: {e}")))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| EngineError::resource(format!("failed to connect to redis endpoint `{endpoint}`: {e}")))?;

        Ok(RedisKvClient {
            endpoint,
            connection,
            limiter: InflightLimiter::new(max_inflight),
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    async fn get_raw(&self, key: &str) -> EngineResult<Option<String>> {
        let _permit = self.limiter.acquire().await;
        let mut conn = self.connection.clone();

        let fut = conn.get::<_, Option<String>>(key);
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EngineError::resource(format!(
                "redis command failed on endpoint `{}`: {e}",
                self.endpoint
            ))),
            Err(_) => Err(EngineError::timeout(format!(
                "redis command timed out on endpoint `{}` after {}ms",
                self.endpoint,
                self.request_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait(?Send)]
impl KvClient for RedisKvClient {
    async fn get(&self, key: &str) -> EngineResult<Option<KvRecord>> {
        let raw = self.get_raw(key).await?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let fields: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                    EngineError::resource(format!("malformed record for key `{key}` on endpoint `{}`: {e}", self.endpoint))
                })?;
                let id = fields.get("id").and_then(|v| v.as_i64()).ok_or_else(|| {
                    EngineError::resource(format!("record for key `{key}` is missing its `id` field"))
                })?;
                Ok(Some(KvRecord { id, fields }))
            }
        }
    }
}
