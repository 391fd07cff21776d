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

//! Plan artifact model, validation/linking, writes-effect algebra, and the
//! on-disk plan store.

pub mod model;
pub mod store;
pub mod validate;
pub mod writes_effect;

pub use model::{BuiltBy, Node, NodeId, Plan, SUPPORTED_SCHEMA_VERSION};
pub use store::{plan_digest, load_plan_file, Index, IndexEntry, PlanStore};
pub use validate::{validate_and_link, validate_param_overrides, LinkedNode, LinkedPlan};
pub use writes_effect::{eval_writes_effect, EffectEnv, EffectResult, WritesEffect};
