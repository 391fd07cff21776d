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

//! Request/response wire types.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StructuredError;
use crate::value::ParamValue;

/// Accepts `user_id` as a JSON number or a decimal string, matching how
/// loosely-typed frontend-facing JSON fields are handled elsewhere in the
/// catalog layer.
fn deserialize_user_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct UserIdVisitor;

    impl<'de> Visitor<'de> for UserIdVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a positive integer, as a number or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            u64::try_from(v).map_err(|_| de::Error::custom("user_id must be positive"))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
            if v.fract() == 0.0 && v >= 0.0 {
                Ok(v as u64)
            } else {
                Err(de::Error::custom("user_id must be a positive integer"))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse::<u64>().map_err(|_| de::Error::custom("user_id is not a valid integer"))
        }
    }

    deserializer.deserialize_any(UserIdVisitor)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(deserialize_with = "deserialize_user_id")]
    pub user_id: u64,

    #[serde(default)]
    pub request_id: Option<String>,

    #[serde(default)]
    pub plan: Option<String>,

    #[serde(default)]
    pub plan_name: Option<String>,

    #[serde(default)]
    pub param_overrides: HashMap<String, ParamValue>,

    #[serde(default)]
    pub output_keys: Vec<String>,

    #[serde(default)]
    pub deadline_ms: Option<u64>,

    #[serde(default)]
    pub node_timeout_ms: Option<u64>,

    #[serde(default)]
    pub fragment_versions: HashMap<String, u64>,
}

impl ExecuteRequest {
    /// The plan name selected by either `plan` or `plan_name`.
    pub fn selected_plan(&self) -> Option<&str> {
        self.plan.as_deref().or(self.plan_name.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub id: i64,
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Success {
        request_id: String,
        candidates: Vec<Candidate>,
    },
    Failure {
        request_id: String,
        error: StructuredError,
    },
}

impl ExecuteResponse {
    pub fn success(request_id: String, candidates: Vec<Candidate>) -> Self {
        ExecuteResponse::Success { request_id, candidates }
    }

    pub fn failure(request_id: String, error: StructuredError) -> Self {
        ExecuteResponse::Failure { request_id, error }
    }
}
