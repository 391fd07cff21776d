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

//! Core, dependency-free data model shared by every `rankflow` crate:
//! registries, the immutable column bundle, row views, canonical JSON
//! digesting, and the request/response wire types.

pub mod column;
pub mod digest;
pub mod error;
pub mod registry;
pub mod request;
pub mod row_view;
pub mod value;

pub use error::{EngineError, EngineResult};
