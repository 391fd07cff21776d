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

//! The writes-effect algebra: a small expression language
//! predicting which `KeyId`s a node may write at runtime, as a function of
//! its bound parameters.

use std::collections::{BTreeSet, HashMap};

use rankflow_common::value::KeyId;
use serde::{Deserialize, Serialize};

/// Deserialized straight out of a task manifest entry's
/// optional `writes_effect` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WritesEffect {
    Keys {
        keys: Vec<KeyId>,
    },
    FromParam {
        name: String,
    },
    SwitchEnum {
        name: String,
        cases: HashMap<String, WritesEffect>,
    },
    Union {
        effects: Vec<WritesEffect>,
    },
}

/// Evaluation result of a `WritesEffect` against a bound parameter
/// environment: `keys` is always sorted and duplicate-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectResult {
    Exact(Vec<KeyId>),
    May(Vec<KeyId>),
    Unknown,
}

impl EffectResult {
    fn keys(&self) -> Option<&[KeyId]> {
        match self {
            EffectResult::Exact(k) | EffectResult::May(k) => Some(k),
            EffectResult::Unknown => None,
        }
    }

    /// The node's effective write set for schema-delta purposes: exact or
    /// possible keys, or empty if entirely unknown (callers that need to
    /// distinguish "unknown" from "writes nothing" should match on the
    /// variant directly).
    pub fn keys_or_empty(&self) -> Vec<KeyId> {
        self.keys().map(|k| k.to_vec()).unwrap_or_default()
    }
}

fn sorted_dedup(mut keys: Vec<KeyId>) -> Vec<KeyId> {
    keys.sort();
    keys.dedup();
    keys
}

/// Environment the writes-effect is evaluated against: the node's bound
/// parameters, resolved to either a concrete scalar (string form, used for
/// `FromParam`/`SwitchEnum` case matching) or left unbound.
pub struct EffectEnv<'a> {
    bound: &'a HashMap<String, String>,
    /// For `FromParam(name)`, resolves the parameter's value to a `KeyId` by
    /// looking its name up in the key registry.
    resolve_key_name: &'a dyn Fn(&str) -> Option<KeyId>,
}

impl<'a> EffectEnv<'a> {
    pub fn new(bound: &'a HashMap<String, String>, resolve_key_name: &'a dyn Fn(&str) -> Option<KeyId>) -> Self {
        EffectEnv { bound, resolve_key_name }
    }
}

/// Evaluates a `WritesEffect` against `env`. This function
/// is pure: calling it twice with the same effect and environment returns
/// the same result.
pub fn eval_writes_effect(effect: &WritesEffect, env: &EffectEnv<'_>) -> EffectResult {
    match effect {
        WritesEffect::Keys { keys } => EffectResult::Exact(sorted_dedup(keys.clone())),
        WritesEffect::FromParam { name } => match env.bound.get(name) {
            Some(value) => match (env.resolve_key_name)(value) {
                Some(key) => EffectResult::Exact(sorted_dedup(vec![key])),
                None => EffectResult::Unknown,
            },
            None => EffectResult::Unknown,
        },
        WritesEffect::SwitchEnum { name, cases } => match env.bound.get(name) {
            Some(value) => match cases.get(value) {
                Some(chosen) => eval_writes_effect(chosen, env),
                None => {
                    // Bound to an unknown value with bounded alternatives:
                    // `May` over the union of every declared case.
                    let mut all = Vec::new();
                    let mut any_unknown = false;
                    for case in cases.values() {
                        match eval_writes_effect(case, env) {
                            EffectResult::Exact(k) | EffectResult::May(k) => all.extend(k),
                            EffectResult::Unknown => any_unknown = true,
                        }
                    }
                    if any_unknown {
                        EffectResult::Unknown
                    } else {
                        EffectResult::May(sorted_dedup(all))
                    }
                }
            },
            None => EffectResult::Unknown,
        },
        WritesEffect::Union { effects } => {
            let results: Vec<EffectResult> = effects.iter().map(|e| eval_writes_effect(e, env)).collect();
            union_results(results)
        }
    }
}

fn union_results(results: Vec<EffectResult>) -> EffectResult {
    if results.iter().any(|r| matches!(r, EffectResult::Unknown)) {
        return EffectResult::Unknown;
    }
    let all_exact = results.iter().all(|r| matches!(r, EffectResult::Exact(_)));
    let keys: BTreeSet<KeyId> = results.into_iter().flat_map(|r| r.keys_or_empty()).collect();
    let keys: Vec<KeyId> = keys.into_iter().collect();
    if all_exact {
        EffectResult::Exact(keys)
    } else {
        EffectResult::May(keys)
    }
}
