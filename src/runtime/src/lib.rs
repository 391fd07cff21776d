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

//! The single-threaded scheduling fabric: the
//! event loop, the CPU worker pool, timed suspension points, the first-wins
//! timeout race, and the per-endpoint inflight limiter.

pub mod awaitables;
pub mod event_loop;
pub mod inflight_limiter;
pub mod timeout_race;
pub mod worker_pool;

pub use awaitables::{async_with_timeout, cpu_offload_with_timeout, sleep};
pub use event_loop::{EventLoop, LoopState};
pub use inflight_limiter::InflightLimiter;
pub use timeout_race::{LateCompletionCounter, TimeoutRace};
pub use worker_pool::{WorkerPool, DEFAULT_WORKER_THREADS};
