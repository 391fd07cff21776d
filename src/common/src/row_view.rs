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

//! The row view: a column bundle layered with an optional
//! selection vector and an optional permutation vector. Value type, cheap
//! to copy; all sharing is at the bundle/column level.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::column::{ColumnBundle, FloatColumn, StringColumn, Validity};

#[derive(Debug, Clone)]
pub struct RowView {
    bundle: ColumnBundle,
    selection: Option<Arc<Vec<usize>>>,
    permutation: Option<Arc<Vec<usize>>>,
}

impl RowView {
    /// A view over the whole bundle with no selection or permutation.
    pub fn full(bundle: ColumnBundle) -> Self {
        RowView { bundle, selection: None, permutation: None }
    }

    pub fn with_selection(bundle: ColumnBundle, selection: Vec<usize>) -> Self {
        debug_assert!(selection.windows(2).all(|w| w[0] < w[1]), "selection must be ascending");
        RowView { bundle, selection: Some(Arc::new(selection)), permutation: None }
    }

    pub fn with_permutation(bundle: ColumnBundle, permutation: Vec<usize>) -> Self {
        RowView { bundle, selection: None, permutation: Some(Arc::new(permutation)) }
    }

    pub fn bundle(&self) -> &ColumnBundle {
        &self.bundle
    }

    /// Derives a new view over `bundle` keeping this view's selection and
    /// permutation as-is. Used by operators that add a column without
    /// changing which rows are active (`vm`, `fan_out_source`).
    pub fn with_bundle(&self, bundle: ColumnBundle) -> RowView {
        RowView { bundle, selection: self.selection.clone(), permutation: self.permutation.clone() }
    }

    pub fn selection(&self) -> Option<&[usize]> {
        self.selection.as_deref().map(|v| v.as_slice())
    }

    pub fn permutation(&self) -> Option<&[usize]> {
        self.permutation.as_deref().map(|v| v.as_slice())
    }

    /// Derives a new view sharing the same bundle but with a selection
    /// vector narrowed by `predicate` (used by the `filter` operator, whose
    /// output shape is an unary-subset-view of its input).
    pub fn select(&self, mut predicate: impl FnMut(usize) -> bool) -> RowView {
        let active: Vec<usize> = self.active_indices().filter(|&idx| predicate(idx)).collect();
        RowView { bundle: self.bundle.clone(), selection: Some(Arc::new(active)), permutation: None }
    }

    /// Derives a new view with the same physical rows and active sequence
    /// but reordered by `permutation` (used by the `sort` operator, which
    /// preserves its input's active set while reordering it).
    pub fn reorder(&self, permutation: Vec<usize>) -> RowView {
        RowView { bundle: self.bundle.clone(), selection: None, permutation: Some(Arc::new(permutation)) }
    }

    /// Iteration semantics: if both selection and
    /// permutation are present, iterate in permutation order filtering by
    /// selection membership; if only selection, iterate selection order; if
    /// only permutation, iterate permutation order; if neither, iterate
    /// `[0,N)`.
    pub fn active_indices(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match (&self.selection, &self.permutation) {
            (Some(sel), Some(perm)) => {
                let set: BTreeSet<usize> = sel.iter().copied().collect();
                Box::new(perm.iter().copied().filter(move |idx| set.contains(idx)))
            }
            (Some(sel), None) => Box::new(sel.iter().copied()),
            (None, Some(perm)) => Box::new(perm.iter().copied()),
            (None, None) => Box::new(0..self.bundle.len()),
        }
    }

    /// Logical size: the length of the active-indices sequence.
    pub fn logical_size(&self) -> usize {
        match (&self.selection, &self.permutation) {
            (Some(sel), Some(_)) => self.active_indices().count().min(sel.len()),
            (Some(sel), None) => sel.len(),
            (None, Some(perm)) => perm.len(),
            (None, None) => self.bundle.len(),
        }
    }

    /// Truncation to `k` rows: produces a
    /// new view with selection equal to the first `k` active indices and no
    /// permutation.
    pub fn truncate(&self, k: usize) -> RowView {
        let first_k: Vec<usize> = self.active_indices().take(k).collect();
        RowView { bundle: self.bundle.clone(), selection: Some(Arc::new(first_k)), permutation: None }
    }

    pub fn active_sequence(&self) -> Vec<usize> {
        self.active_indices().collect()
    }

    /// Copies the active rows into a fresh dense bundle, in active order.
    /// Used by the `concat` operator, whose binary-concat-dense contract
    /// requires both inputs be collapsed to dense active sequences before
    /// concatenation. Bumps the bundle's materialization
    /// counter since this breaks the zero-copy guarantee.
    pub fn materialize(&self) -> ColumnBundle {
        if self.selection.is_none() && self.permutation.is_none() {
            return self.bundle.clone();
        }

        let indices: Vec<usize> = self.active_indices().collect();
        let ids: Vec<i64> = indices.iter().map(|&i| self.bundle.id_at(i)).collect();
        let mut out = ColumnBundle::from_ids(ids);
        out.debug_counters().record_materialization();

        for key in self.bundle.float_keys().collect::<Vec<_>>() {
            let col = self.bundle.float_column(key).expect("key came from float_keys()");
            let values: Vec<f64> = indices.iter().map(|&i| col.get(i).unwrap_or(0.0)).collect();
            let valid: Vec<bool> = indices.iter().map(|&i| col.get(i).is_some()).collect();
            out = out.with_float_column(key, FloatColumn::new(values, Validity::from_bits(valid)));
        }

        for key in self.bundle.string_keys().collect::<Vec<_>>() {
            let col = self.bundle.string_column(key).expect("key came from string_keys()");
            let codes: Vec<i32> = indices.iter().map(|&i| col.code_at(i).unwrap_or(0)).collect();
            let valid: Vec<bool> = indices.iter().map(|&i| col.code_at(i).is_some()).collect();
            out = out.with_string_column(key, StringColumn::new(col.dictionary().clone(), codes, Validity::from_bits(valid)));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(n: usize) -> ColumnBundle {
        ColumnBundle::from_ids((0..n as i64).collect())
    }

    #[test]
    fn neither_iterates_0_to_n() {
        let view = RowView::full(bundle(5));
        assert_eq!(view.active_sequence(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn selection_only_iterates_selection_order() {
        let view = RowView::with_selection(bundle(5), vec![1, 3, 4]);
        assert_eq!(view.active_sequence(), vec![1, 3, 4]);
        assert_eq!(view.logical_size(), 3);
    }

    #[test]
    fn permutation_only_iterates_permutation_order() {
        let view = RowView::with_permutation(bundle(4), vec![3, 1, 0, 2]);
        assert_eq!(view.active_sequence(), vec![3, 1, 0, 2]);
    }

    #[test]
    fn both_filters_permutation_by_selection_membership() {
        let view = RowView {
            bundle: bundle(5),
            selection: Some(Arc::new(vec![0, 2, 4])),
            permutation: Some(Arc::new(vec![4, 3, 2, 1, 0])),
        };
        assert_eq!(view.active_sequence(), vec![4, 2, 0]);
    }

    #[test]
    fn truncate_keeps_first_k_active_rows() {
        let view = RowView::with_selection(bundle(6), vec![0, 2, 3, 5]);
        let truncated = view.truncate(2);
        assert_eq!(truncated.active_sequence(), vec![0, 2]);
        assert!(truncated.permutation().is_none());
    }

    #[test]
    fn truncate_beyond_logical_size_keeps_everything() {
        let view = RowView::with_selection(bundle(6), vec![0, 2, 3]);
        let truncated = view.truncate(10);
        assert_eq!(truncated.active_sequence(), vec![0, 2, 3]);
    }

    #[test]
    fn materialize_with_selection_collapses_to_dense_active_rows() {
        let view = RowView::with_selection(bundle(5), vec![1, 3, 4]);
        let materialized = view.materialize();
        assert_eq!(materialized.ids(), &[1, 3, 4]);
        assert_eq!(materialized.debug_counters().materializations(), 1);
    }

    #[test]
    fn materialize_with_no_view_shares_bundle() {
        let view = RowView::full(bundle(3));
        let materialized = view.materialize();
        assert_eq!(materialized.ids().as_ptr(), view.bundle().ids().as_ptr());
    }
}
