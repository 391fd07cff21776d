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

//! The async I/O client adapter: a callback-based
//! key-value driver presented as coroutine awaitables, plus a
//! `redis`-backed implementation.

pub mod client;
pub mod mock_client;
pub mod redis_client;

pub use client::{KvClient, KvRecord};
pub use mock_client::MockKvClient;
pub use redis_client::RedisKvClient;
