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

//! The expression and predicate IR. Plain recursive
//! trees, deserialized straight out of a plan artifact's `expr_table` /
//! `pred_table`.

use rankflow_common::value::{KeyId, ParamId};
use serde::{Deserialize, Serialize};

/// No division; evaluation yields `double | null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    ConstNumber { value: f64 },
    ConstNull,
    KeyRef { key: KeyId },
    ParamRef { param: ParamId },
    Add { a: Box<Expr>, b: Box<Expr> },
    Sub { a: Box<Expr>, b: Box<Expr> },
    Mul { a: Box<Expr>, b: Box<Expr> },
    Neg { a: Box<Expr> },
    Coalesce { a: Box<Expr>, b: Box<Expr> },
}

impl Expr {
    pub fn is_literal_null(&self) -> bool {
        matches!(self, Expr::ConstNull)
    }
}

/// `op ∈ {==,!=,<,<=,>,>=}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The right-hand side of an `in` predicate: a numeric list or a string
/// list. A numeric list compares against an `Expr`'s
/// evaluated value; a string list compares against a dictionary-encoded
/// string column's decoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InList {
    Numeric(Vec<f64>),
    String(Vec<String>),
}

/// The left-hand side of an `in` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InLhs {
    Expr(Expr),
    StringKey(KeyId),
}

/// A regex pattern source: a literal string or a parameter reference
///.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSource {
    Literal(String),
    Param { param: ParamId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Pred {
    ConstBool { value: bool },
    And { a: Box<Pred>, b: Box<Pred> },
    Or { a: Box<Pred>, b: Box<Pred> },
    Not { a: Box<Pred> },
    Cmp { cmp: CmpOp, a: Expr, b: Expr },
    In { lhs: InLhs, list: InList },
    IsNull { a: Expr },
    NotNull { a: Expr },
    Regex { key: KeyId, pattern: PatternSource, flags: String },
}

impl Pred {
    /// Flags beyond `""` and `"i"` are rejected at validation, before any
    /// row is ever evaluated against the pattern.
    pub fn validate_regex_flags(flags: &str) -> bool {
        matches!(flags, "" | "i")
    }
}
