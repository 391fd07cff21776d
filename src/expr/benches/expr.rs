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

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, Criterion};
use rankflow_common::column::{ColumnBundle, Dictionary, FloatColumn, StringColumn, Validity};
use rankflow_common::value::KeyId;
use rankflow_expr::{eval_expr, eval_pred, CmpOp, EvalContext, Expr, Pred};

criterion_group!(benches, bench_expr, bench_pred, bench_regex);
criterion_main!(benches);

const ROWS: usize = 4096;
const X_KEY: KeyId = KeyId(1);
const Y_KEY: KeyId = KeyId(2);

fn bundle_with_two_float_columns() -> ColumnBundle {
    let ids: Vec<i64> = (0..ROWS as i64).collect();
    let bundle = ColumnBundle::from_ids(ids);
    let x = FloatColumn::new((0..ROWS).map(|i| i as f64).collect(), Validity::all_valid(ROWS));
    let y = FloatColumn::new((0..ROWS).map(|i| (i % 7) as f64).collect(), Validity::all_valid(ROWS));
    bundle.with_float_column(X_KEY, x).with_float_column(Y_KEY, y)
}

fn bench_expr(c: &mut Criterion) {
    let bundle = bundle_with_two_float_columns();
    let params = HashMap::new();
    let ctx = EvalContext::new(&bundle, &params);

    let expr = Expr::Add {
        a: Box::new(Expr::KeyRef { key: X_KEY }),
        b: Box::new(Expr::Mul {
            a: Box::new(Expr::KeyRef { key: Y_KEY }),
            b: Box::new(Expr::ConstNumber { value: 2.0 }),
        }),
    };

    c.bench_function("expr/add_mul/4096_rows", |bencher| {
        bencher.iter(|| {
            for row in 0..ROWS {
                eval_expr(&expr, &ctx, row).unwrap();
            }
        })
    });
}

fn bench_pred(c: &mut Criterion) {
    let bundle = bundle_with_two_float_columns();
    let params = HashMap::new();
    let ctx = EvalContext::new(&bundle, &params);

    let pred = Pred::And {
        a: Box::new(Pred::Cmp {
            cmp: CmpOp::Gt,
            a: Expr::KeyRef { key: X_KEY },
            b: Expr::ConstNumber { value: 1000.0 },
        }),
        b: Box::new(Pred::Cmp {
            cmp: CmpOp::Lt,
            a: Expr::KeyRef { key: Y_KEY },
            b: Expr::ConstNumber { value: 5.0 },
        }),
    };

    c.bench_function("pred/and_cmp/4096_rows", |bencher| {
        bencher.iter(|| {
            for row in 0..ROWS {
                eval_pred(&pred, &ctx, row).unwrap();
            }
        })
    });
}

fn bench_regex(c: &mut Criterion) {
    let ids: Vec<i64> = (0..ROWS as i64).collect();
    let bundle = ColumnBundle::from_ids(ids);

    let dict_entries: Vec<String> = (0..64).map(|i| format!("item-{i}")).collect();
    let dictionary = Dictionary::new(dict_entries);
    let codes: Vec<i32> = (0..ROWS as i32).map(|i| i % 64).collect();
    let string_column = StringColumn::new(dictionary, codes, Validity::all_valid(ROWS));
    let bundle = bundle.with_string_column(X_KEY, string_column);
    let params = HashMap::new();
    let ctx = EvalContext::new(&bundle, &params);

    let pred = Pred::Regex {
        key: X_KEY,
        pattern: rankflow_expr::PatternSource::Literal("^item-[0-3]".to_string()),
        flags: String::new(),
    };

    c.bench_function("pred/regex_dict_scan/4096_rows", |bencher| {
        bencher.iter(|| {
            rankflow_expr::regex_cache::clear_for_node();
            for row in 0..ROWS {
                eval_pred(&pred, &ctx, row).unwrap();
            }
        })
    });
}
