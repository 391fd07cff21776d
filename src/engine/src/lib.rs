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

//! The DAG scheduler and operator table: the core
//! that drives one request's plan to completion on the event loop thread.

pub mod context;
pub mod operators;
pub mod schema_delta;
pub mod scheduler;
pub mod shape;

pub use context::ExecutionContext;
pub use schema_delta::SchemaDelta;
pub use scheduler::{execute, ExecutionOutcome, NodeOutcome};
