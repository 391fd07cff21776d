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

//! Output-shape contracts: the scheduler doesn't know what
//! an operator computes, only the structural shape its output must have
//! relative to its inputs. Checked once per node, right after the operator
//! returns, before the result is wired into any successor.

use rankflow_common::error::{EngineError, EngineResult};
use rankflow_common::row_view::RowView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    SourceFanoutDense,
    UnaryPreserveView,
    UnarySubsetView,
    PrefixOfInput,
    BinaryConcatDense,
}

impl OutputShape {
    pub fn parse(name: &str) -> EngineResult<Self> {
        Ok(match name {
            "source_fanout_dense" => OutputShape::SourceFanoutDense,
            "unary_preserve_view" => OutputShape::UnaryPreserveView,
            "unary_subset_view" => OutputShape::UnarySubsetView,
            "prefix_of_input" => OutputShape::PrefixOfInput,
            "binary_concat_dense" => OutputShape::BinaryConcatDense,
            other => return Err(EngineError::validation(format!("unknown output shape `{other}`"))),
        })
    }
}

/// Checks `output` against `shape` given the node's `inputs`. Fails closed:
/// any operator whose result doesn't match its declared contract is an
/// evaluation error, never a silently-wrong result.
pub fn validate_shape(shape: OutputShape, inputs: &[RowView], output: &RowView) -> EngineResult<()> {
    match shape {
        OutputShape::SourceFanoutDense => {
            if output.selection().is_some() || output.permutation().is_some() {
                return Err(EngineError::evaluation(
                    "source_fanout_dense output must have neither a selection nor a permutation",
                ));
            }
            Ok(())
        }
        OutputShape::UnaryPreserveView => {
            let input = single_input(inputs)?;
            if output.bundle().len() != input.bundle().len() {
                return Err(EngineError::evaluation("unary_preserve_view output must share the input's physical row count"));
            }
            if output.active_sequence() != input.active_sequence() {
                return Err(EngineError::evaluation("unary_preserve_view output must preserve the input's active sequence"));
            }
            Ok(())
        }
        OutputShape::UnarySubsetView => {
            let input = single_input(inputs)?;
            if output.bundle().len() != input.bundle().len() {
                return Err(EngineError::evaluation("unary_subset_view output must share the input's physical row count"));
            }
            if !is_subsequence(&output.active_sequence(), &input.active_sequence()) {
                return Err(EngineError::evaluation("unary_subset_view output must be an ordered subset of the input's active sequence"));
            }
            Ok(())
        }
        OutputShape::PrefixOfInput => {
            let input = single_input(inputs)?;
            let output_seq = output.active_sequence();
            let prefix: Vec<usize> = input.active_sequence().into_iter().take(output_seq.len()).collect();
            if output_seq != prefix {
                return Err(EngineError::evaluation("prefix_of_input output must be a prefix of the input's active sequence"));
            }
            Ok(())
        }
        OutputShape::BinaryConcatDense => {
            if inputs.len() != 2 {
                return Err(EngineError::evaluation("binary_concat_dense requires exactly two inputs"));
            }
            if output.selection().is_some() || output.permutation().is_some() {
                return Err(EngineError::evaluation(
                    "binary_concat_dense output must have neither a selection nor a permutation",
                ));
            }
            let expected = inputs[0].logical_size() + inputs[1].logical_size();
            if output.logical_size() != expected {
                return Err(EngineError::evaluation(format!(
                    "binary_concat_dense output has {} rows, expected {expected}",
                    output.logical_size()
                )));
            }
            Ok(())
        }
    }
}

fn single_input(inputs: &[RowView]) -> EngineResult<&RowView> {
    inputs.first().ok_or_else(|| EngineError::evaluation("operator expects exactly one input"))
}

/// Whether `sub` appears in `full` in order (not necessarily contiguous).
fn is_subsequence(sub: &[usize], full: &[usize]) -> bool {
    let mut it = full.iter();
    sub.iter().all(|x| it.any(|y| y == x))
}

#[cfg(test)]
mod tests {
    use rankflow_common::column::ColumnBundle;

    use super::*;

    #[test]
    fn subsequence_check_respects_order() {
        assert!(is_subsequence(&[1, 3], &[0, 1, 2, 3]));
        assert!(!is_subsequence(&[3, 1], &[0, 1, 2, 3]));
        assert!(!is_subsequence(&[5], &[0, 1, 2, 3]));
    }

    #[test]
    fn rejects_prefix_violation() {
        let input = RowView::with_selection(ColumnBundle::from_ids(vec![10, 11, 12]), vec![0, 1, 2]);
        let bad_output = RowView::with_selection(ColumnBundle::from_ids(vec![10, 11, 12]), vec![1, 2]);
        assert!(validate_shape(OutputShape::PrefixOfInput, &[input], &bad_output).is_err());
    }
}
