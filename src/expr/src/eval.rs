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

//! Recursive, per-row evaluation of the expression and predicate IR
//!.

use std::collections::HashMap;

use rankflow_common::column::ColumnBundle;
use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::value::{KeyId, ParamId, ParamValue};

use crate::ir::{CmpOp, Expr, InLhs, InList, PatternSource, Pred};
use crate::regex_cache;

/// Everything an expression or predicate needs to resolve `key_ref` and
/// `param_ref` nodes.
pub struct EvalContext<'a> {
    pub bundle: &'a ColumnBundle,
    pub params: &'a HashMap<ParamId, ParamValue>,
}

impl<'a> EvalContext<'a> {
    pub fn new(bundle: &'a ColumnBundle, params: &'a HashMap<ParamId, ParamValue>) -> Self {
        EvalContext { bundle, params }
    }

    fn param_as_f64(&self, id: ParamId) -> Option<f64> {
        self.params.get(&id).and_then(ParamValue::as_f64)
    }

    fn param_as_str(&self, id: ParamId) -> Option<&str> {
        self.params.get(&id).and_then(ParamValue::as_str)
    }

    fn key_as_f64(&self, key: KeyId, row: usize) -> Option<f64> {
        if key.is_row_id() {
            Some(self.bundle.id_at(row) as f64)
        } else {
            self.bundle.float_column(key).and_then(|c| c.get(row))
        }
    }
}

/// Evaluates `expr` at `row`, propagating null through arithmetic per
/// and rejecting non-finite results.
pub fn eval_expr(expr: &Expr, ctx: &EvalContext<'_>, row: usize) -> EngineResult<Option<f64>> {
    let value = eval_expr_inner(expr, ctx, row)?;
    if let Some(v) = value {
        if !v.is_finite() {
            return Err(EngineError::evaluation(format!(
                "expression produced a non-finite value ({v}) at row {row}"
            )));
        }
    }
    Ok(value)
}

fn eval_expr_inner(expr: &Expr, ctx: &EvalContext<'_>, row: usize) -> EngineResult<Option<f64>> {
    Ok(match expr {
        Expr::ConstNumber { value } => Some(*value),
        Expr::ConstNull => None,
        Expr::KeyRef { key } => ctx.key_as_f64(*key, row),
        Expr::ParamRef { param } => ctx.param_as_f64(*param),
        Expr::Add { a, b } => lift2(eval_expr_inner(a, ctx, row)?, eval_expr_inner(b, ctx, row)?, |x, y| x + y),
        Expr::Sub { a, b } => lift2(eval_expr_inner(a, ctx, row)?, eval_expr_inner(b, ctx, row)?, |x, y| x - y),
        Expr::Mul { a, b } => lift2(eval_expr_inner(a, ctx, row)?, eval_expr_inner(b, ctx, row)?, |x, y| x * y),
        Expr::Neg { a } => eval_expr_inner(a, ctx, row)?.map(|x| -x),
        Expr::Coalesce { a, b } => match eval_expr_inner(a, ctx, row)? {
            Some(v) => Some(v),
            // Strict, lazy evaluation of `b`: only evaluated when `a` is
            // null.
            None => eval_expr_inner(b, ctx, row)?,
        },
    })
}

fn lift2(a: Option<f64>, b: Option<f64>, f: impl FnOnce(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        _ => None,
    }
}

/// Three-valued predicate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreeValued {
    True,
    False,
    Unknown,
}

impl ThreeValued {
    /// Coercion used by the `filter` operator: null/unknown rows are
    /// excluded.
    pub fn as_filter_bool(self) -> bool {
        matches!(self, ThreeValued::True)
    }

    fn not(self) -> ThreeValued {
        match self {
            ThreeValued::True => ThreeValued::False,
            ThreeValued::False => ThreeValued::True,
            ThreeValued::Unknown => ThreeValued::Unknown,
        }
    }

    fn and(self, other: ThreeValued) -> ThreeValued {
        use ThreeValued::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Unknown,
        }
    }

    fn or(self, other: ThreeValued) -> ThreeValued {
        use ThreeValued::*;
        match (self, other) {
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Unknown,
        }
    }
}

pub fn eval_pred(pred: &Pred, ctx: &EvalContext<'_>, row: usize) -> EngineResult<ThreeValued> {
    Ok(match pred {
        Pred::ConstBool { value } => {
            if *value {
                ThreeValued::True
            } else {
                ThreeValued::False
            }
        }
        Pred::And { a, b } => eval_pred(a, ctx, row)?.and(eval_pred(b, ctx, row)?),
        Pred::Or { a, b } => eval_pred(a, ctx, row)?.or(eval_pred(b, ctx, row)?),
        Pred::Not { a } => eval_pred(a, ctx, row)?.not(),
        Pred::Cmp { cmp, a, b } => eval_cmp(*cmp, a, b, ctx, row)?,
        Pred::In { lhs, list } => eval_in(lhs, list, ctx, row)?,
        Pred::IsNull { a } => {
            if eval_expr(a, ctx, row)?.is_none() {
                ThreeValued::True
            } else {
                ThreeValued::False
            }
        }
        Pred::NotNull { a } => {
            if eval_expr(a, ctx, row)?.is_some() {
                ThreeValued::True
            } else {
                ThreeValued::False
            }
        }
        Pred::Regex { key, pattern, flags } => eval_regex(*key, pattern, flags, ctx, row)?,
    })
}

/// `cmp` with an operand that is literally `const_null` in
/// the IR has explicit null semantics; `cmp` with a *runtime* null yields
/// false regardless of operator.
fn eval_cmp(op: CmpOp, a: &Expr, b: &Expr, ctx: &EvalContext<'_>, row: usize) -> EngineResult<ThreeValued> {
    if a.is_literal_null() || b.is_literal_null() {
        // The non-null side (or `ConstNull` itself if both sides are
        // literal) is `x == null ≡ is_null(x)`.
        let other = if a.is_literal_null() { b } else { a };
        let is_null = eval_expr(other, ctx, row)?.is_none();
        return Ok(match op {
            CmpOp::Eq => bool3(is_null),
            CmpOp::Ne => bool3(!is_null),
            _ => ThreeValued::False,
        });
    }

    let av = eval_expr(a, ctx, row)?;
    let bv = eval_expr(b, ctx, row)?;
    let (av, bv) = match (av, bv) {
        (Some(av), Some(bv)) => (av, bv),
        _ => return Ok(ThreeValued::False),
    };

    Ok(bool3(match op {
        CmpOp::Eq => av == bv,
        CmpOp::Ne => av != bv,
        CmpOp::Lt => av < bv,
        CmpOp::Le => av <= bv,
        CmpOp::Gt => av > bv,
        CmpOp::Ge => av >= bv,
    }))
}

fn bool3(b: bool) -> ThreeValued {
    if b {
        ThreeValued::True
    } else {
        ThreeValued::False
    }
}

fn eval_in(lhs: &InLhs, list: &InList, ctx: &EvalContext<'_>, row: usize) -> EngineResult<ThreeValued> {
    match (lhs, list) {
        (InLhs::Expr(expr), InList::Numeric(values)) => {
            let v = eval_expr(expr, ctx, row)?;
            match v {
                None => Ok(ThreeValued::False),
                Some(v) => Ok(bool3(values.iter().any(|candidate| *candidate == v))),
            }
        }
        (InLhs::StringKey(key), InList::String(values)) => {
            let col = ctx.bundle.string_column(*key);
            let value = col.and_then(|c| c.get(row));
            match value {
                None => Ok(ThreeValued::False),
                Some(v) => Ok(bool3(values.iter().any(|candidate| candidate == v))),
            }
        }
        _ => Err(EngineError::evaluation(
            "`in` predicate's lhs and list must both be numeric or both be string",
        )),
    }
}

fn eval_regex(
    key: KeyId,
    pattern: &PatternSource,
    flags: &str,
    ctx: &EvalContext<'_>,
    row: usize,
) -> EngineResult<ThreeValued> {
    let column = ctx
        .bundle
        .string_column(key)
        .ok_or_else(|| EngineError::evaluation(format!("regex: key {key} is not a string column")))?;

    let pattern_str: std::borrow::Cow<'_, str> = match pattern {
        PatternSource::Literal(p) => std::borrow::Cow::Borrowed(p.as_str()),
        PatternSource::Param { param } => {
            let p = ctx
                .param_as_str(*param)
                .ok_or_else(|| EngineError::evaluation(format!("regex: parameter {param} is null or unset")))?;
            std::borrow::Cow::Owned(p.to_string())
        }
    };

    let table = regex_cache::dict_scan(column.dictionary(), &pattern_str, flags)?;

    match column.code_at(row) {
        None => Ok(ThreeValued::False),
        Some(code) => Ok(bool3(table.get(code as usize).copied().unwrap_or(false))),
    }
}
