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

//! The per-endpoint inflight limiter: a FIFO-fair
//! counting semaphore. `tokio::sync::Semaphore` already grants permits to
//! waiters in acquisition order and releases directly to the head waiter
//! with no extra wake-up round-trip, matching "On release, if waiters
//! exist, the permit is granted directly to the head waiter."

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

#[derive(Clone)]
pub struct InflightLimiter {
    semaphore: Arc<Semaphore>,
}

impl InflightLimiter {
    pub fn new(max_inflight: u32) -> Self {
        InflightLimiter { semaphore: Arc::new(Semaphore::new(max_inflight as usize)) }
    }

    /// Co-acquires a permit before issuing a command; the returned guard
    /// releases it on drop (success, failure, or timeout all go through the
    /// same RAII path).
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        self.semaphore
            .acquire()
            .await
            .expect("inflight limiter semaphore is never closed while the endpoint client is alive")
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_past_capacity() {
        let limiter = InflightLimiter::new(1);
        let first = limiter.acquire().await;
        assert_eq!(limiter.available_permits(), 0);
        drop(first);
        assert_eq!(limiter.available_permits(), 1);
    }
}
