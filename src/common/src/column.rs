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

//! The immutable column bundle: a shared identifier column,
//! `KeyId -> float column` and `KeyId -> string column` maps, and a shared
//! debug counter block. Adding a column yields a new bundle that shares
//! every other column by `Arc` reference with the old one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::value::KeyId;

/// A validity bitmap, one bit per row, stored as one bool per row for
/// simplicity — nothing mandates a packed bitset, only that
/// validity is tracked per value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    bits: Arc<Vec<bool>>,
}

impl Validity {
    pub fn all_valid(len: usize) -> Self {
        Validity { bits: Arc::new(vec![true; len]) }
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Validity { bits: Arc::new(bits) }
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// `{values[N], valid[N]}` float column.
#[derive(Debug, Clone)]
pub struct FloatColumn {
    values: Arc<Vec<f64>>,
    valid: Validity,
}

impl FloatColumn {
    pub fn new(values: Vec<f64>, valid: Validity) -> Self {
        assert_eq!(values.len(), valid.len(), "float column length mismatch");
        FloatColumn { values: Arc::new(values), valid }
    }

    pub fn all_valid(values: Vec<f64>) -> Self {
        let valid = Validity::all_valid(values.len());
        FloatColumn::new(values, valid)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `None` if the value at `idx` is null.
    pub fn get(&self, idx: usize) -> Option<f64> {
        if self.valid.is_valid(idx) {
            Some(self.values[idx])
        } else {
            None
        }
    }
}

/// A string dictionary, shared by identity (`Arc` pointer equality is the
/// cache key for the regex match-table in `rankflow-expr`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    entries: Arc<Vec<String>>,
}

impl Dictionary {
    pub fn new(entries: Vec<String>) -> Self {
        Dictionary { entries: Arc::new(entries) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: i32) -> Option<&str> {
        self.entries.get(code as usize).map(|s| s.as_str())
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Stable identity of the backing allocation, used as the regex
    /// dict-scan cache key.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.entries) as usize
    }
}

/// Dictionary-encoded string column: `{dictionary[M], codes[N], valid[N]}`
///.
#[derive(Debug, Clone)]
pub struct StringColumn {
    dictionary: Dictionary,
    codes: Arc<Vec<i32>>,
    valid: Validity,
}

impl StringColumn {
    pub fn new(dictionary: Dictionary, codes: Vec<i32>, valid: Validity) -> Self {
        assert_eq!(codes.len(), valid.len(), "string column length mismatch");
        StringColumn { dictionary, codes: Arc::new(codes), valid }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn code_at(&self, idx: usize) -> Option<i32> {
        if self.valid.is_valid(idx) {
            Some(self.codes[idx])
        } else {
            None
        }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.code_at(idx).and_then(|code| self.dictionary.get(code))
    }
}

/// Counts materializations — copies that break zero-copy guarantees
///. Shared by every bundle derived from a common ancestor.
#[derive(Debug, Default)]
pub struct DebugCounters {
    materializations: AtomicU64,
}

impl DebugCounters {
    pub fn record_materialization(&self) {
        self.materializations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn materializations(&self) -> u64 {
        self.materializations.load(Ordering::Relaxed)
    }
}

/// An immutable, reference-counted set of columns of equal length
///. Column length `N` is fixed at construction; adding a
/// column yields a new bundle sharing all other columns by reference.
#[derive(Debug, Clone)]
pub struct ColumnBundle {
    inner: Arc<ColumnBundleInner>,
}

#[derive(Debug)]
struct ColumnBundleInner {
    len: usize,
    ids: Arc<Vec<i64>>,
    id_valid: Validity,
    floats: HashMap<KeyId, FloatColumn>,
    strings: HashMap<KeyId, StringColumn>,
    debug: Arc<DebugCounters>,
}

impl ColumnBundle {
    /// Constructs a fresh bundle from a dense identifier column (all rows
    /// valid by convention).
    pub fn from_ids(ids: Vec<i64>) -> Self {
        let len = ids.len();
        ColumnBundle {
            inner: Arc::new(ColumnBundleInner {
                len,
                ids: Arc::new(ids),
                id_valid: Validity::all_valid(len),
                floats: HashMap::new(),
                strings: HashMap::new(),
                debug: Arc::new(DebugCounters::default()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    pub fn id_at(&self, idx: usize) -> i64 {
        self.inner.ids[idx]
    }

    pub fn ids(&self) -> &[i64] {
        &self.inner.ids
    }

    pub fn debug_counters(&self) -> &Arc<DebugCounters> {
        &self.inner.debug
    }

    pub fn float_column(&self, key: KeyId) -> Option<&FloatColumn> {
        self.inner.floats.get(&key)
    }

    pub fn string_column(&self, key: KeyId) -> Option<&StringColumn> {
        self.inner.strings.get(&key)
    }

    pub fn float_keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.inner.floats.keys().copied()
    }

    pub fn string_keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.inner.strings.keys().copied()
    }

    /// All keys present on the bundle (float and string columns).
    pub fn schema_keys(&self) -> std::collections::BTreeSet<KeyId> {
        self.inner
            .floats
            .keys()
            .chain(self.inner.strings.keys())
            .copied()
            .collect()
    }

    /// Returns a new bundle sharing every existing column by reference plus
    /// one additional (or replaced) float column.
    pub fn with_float_column(&self, key: KeyId, column: FloatColumn) -> Self {
        assert_eq!(column.len(), self.inner.len, "column length must match bundle length");
        let mut floats = self.inner.floats.clone();
        floats.insert(key, column);
        ColumnBundle {
            inner: Arc::new(ColumnBundleInner {
                len: self.inner.len,
                ids: Arc::clone(&self.inner.ids),
                id_valid: self.inner.id_valid.clone(),
                floats,
                strings: self.inner.strings.clone(),
                debug: Arc::clone(&self.inner.debug),
            }),
        }
    }

    pub fn with_string_column(&self, key: KeyId, column: StringColumn) -> Self {
        assert_eq!(column.len(), self.inner.len, "column length must match bundle length");
        let mut strings = self.inner.strings.clone();
        strings.insert(key, column);
        ColumnBundle {
            inner: Arc::new(ColumnBundleInner {
                len: self.inner.len,
                ids: Arc::clone(&self.inner.ids),
                id_valid: self.inner.id_valid.clone(),
                floats: self.inner.floats.clone(),
                strings,
                debug: Arc::clone(&self.inner.debug),
            }),
        }
    }

    pub fn id_valid(&self, idx: usize) -> bool {
        self.inner.id_valid.is_valid(idx)
    }

    /// Concatenates two dense bundles into a fresh bundle (`concat`
    /// operator). Keys present on both
    /// sides are kept; the caller is responsible for having already
    /// validated schema compatibility.
    pub fn concat_dense(lhs: &ColumnBundle, rhs: &ColumnBundle, keys: &[KeyId]) -> Self {
        let mut ids = Vec::with_capacity(lhs.len() + rhs.len());
        ids.extend_from_slice(lhs.ids());
        ids.extend_from_slice(rhs.ids());
        let mut bundle = ColumnBundle::from_ids(ids);
        bundle.debug_counters().record_materialization();

        for &key in keys {
            match (lhs.float_column(key), rhs.float_column(key)) {
                (Some(l), Some(r)) => {
                    let mut values = Vec::with_capacity(l.len() + r.len());
                    let mut valid = Vec::with_capacity(l.len() + r.len());
                    for i in 0..l.len() {
                        values.push(l.get(i).unwrap_or(0.0));
                        valid.push(l.get(i).is_some());
                    }
                    for i in 0..r.len() {
                        values.push(r.get(i).unwrap_or(0.0));
                        valid.push(r.get(i).is_some());
                    }
                    bundle = bundle.with_float_column(key, FloatColumn::new(values, Validity::from_bits(valid)));
                }
                _ => {
                    if let (Some(l), Some(r)) = (lhs.string_column(key), rhs.string_column(key)) {
                        bundle = bundle.with_string_column(key, concat_string_columns(l, r));
                    }
                }
            }
        }
        bundle
    }
}

fn concat_string_columns(l: &StringColumn, r: &StringColumn) -> StringColumn {
    // Dictionaries may differ by identity; re-dictionary-encode into a fresh
    // shared dictionary so the result is a valid dictionary-encoded column.
    let mut entries: Vec<String> = Vec::new();
    let mut index: HashMap<String, i32> = HashMap::new();
    let mut codes = Vec::with_capacity(l.len() + r.len());
    let mut valid = Vec::with_capacity(l.len() + r.len());

    let mut push = |s: Option<&str>, codes: &mut Vec<i32>, valid: &mut Vec<bool>| match s {
        Some(s) => {
            let code = *index.entry(s.to_string()).or_insert_with(|| {
                entries.push(s.to_string());
                (entries.len() - 1) as i32
            });
            codes.push(code);
            valid.push(true);
        }
        None => {
            codes.push(0);
            valid.push(false);
        }
    };

    for i in 0..l.len() {
        push(l.get(i), &mut codes, &mut valid);
    }
    for i in 0..r.len() {
        push(r.get(i), &mut codes, &mut valid);
    }

    StringColumn::new(Dictionary::new(entries), codes, Validity::from_bits(valid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_float_column_shares_ids_by_reference() {
        let base = ColumnBundle::from_ids(vec![1, 2, 3]);
        let extended = base.with_float_column(
            KeyId(10),
            FloatColumn::all_valid(vec![1.0, 2.0, 3.0]),
        );
        assert_eq!(base.ids().as_ptr(), extended.ids().as_ptr());
        assert_eq!(extended.float_column(KeyId(10)).unwrap().get(1), Some(2.0));
        assert!(base.float_column(KeyId(10)).is_none());
    }

    #[test]
    fn concat_dense_sums_lengths() {
        let a = ColumnBundle::from_ids(vec![1, 2]);
        let b = ColumnBundle::from_ids(vec![3, 4, 5]);
        let out = ColumnBundle::concat_dense(&a, &b, &[]);
        assert_eq!(out.len(), 5);
        assert_eq!(out.ids(), &[1, 2, 3, 4, 5]);
    }
}
