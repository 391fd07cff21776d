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

//! Property tests for the scheduler's universal invariants, run
//! against the row-view/column layer, the writes-effect algebra, the
//! canonical digester, and the scheduling primitives directly rather than
//! through a full plan, since each invariant is a property of one of those
//! building blocks in isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use rankflow_common::column::ColumnBundle;
use rankflow_common::digest::canonical_digest;
use rankflow_common::row_view::RowView;
use rankflow_common::value::KeyId;
use rankflow_plan::writes_effect::{eval_writes_effect, EffectEnv, WritesEffect};
use rankflow_runtime::{EventLoop, TimeoutRace};

fn bundle(n: usize) -> ColumnBundle {
    ColumnBundle::from_ids((0..n as i64).collect())
}

proptest! {
    /// (3) unary-preserve-view: `with_bundle` keeps the view's active
    /// sequence unchanged regardless of what selection/permutation it
    /// started with, since it only ever swaps the underlying bundle.
    #[test]
    fn unary_preserve_view_keeps_active_sequence(
        len in 1usize..20,
        selection in prop::collection::vec(0usize..20, 0..10),
    ) {
        let mut selection: Vec<usize> = selection.into_iter().filter(|&i| i < len).collect();
        selection.sort_unstable();
        selection.dedup();

        let view = if selection.is_empty() {
            RowView::full(bundle(len))
        } else {
            RowView::with_selection(bundle(len), selection)
        };
        let before = view.active_sequence();

        let replaced = view.with_bundle(bundle(len));
        let after = replaced.active_sequence();

        prop_assert_eq!(before, after);
    }

    /// (4) prefix-of-input: `truncate(k)` always yields the first
    /// `min(k, logical_size)` active rows of its input, for any active
    /// sequence and any `k`.
    #[test]
    fn truncate_is_prefix_of_input(
        len in 1usize..20,
        selection in prop::collection::vec(0usize..20, 0..15),
        k in 0usize..25,
    ) {
        let mut selection: Vec<usize> = selection.into_iter().filter(|&i| i < len).collect();
        selection.sort_unstable();
        selection.dedup();
        let view = RowView::with_selection(bundle(len), selection);

        let input_seq = view.active_sequence();
        let expected: Vec<usize> = input_seq.iter().copied().take(k).collect();

        let truncated = view.truncate(k);
        prop_assert_eq!(truncated.active_sequence(), expected);
    }

    /// (5) filter output is a subsequence of its input's active sequence,
    /// for any predicate over row indices.
    #[test]
    fn filter_output_is_subsequence(
        len in 1usize..20,
        keep in prop::collection::vec(any::<bool>(), 1..20),
    ) {
        let len = len.min(keep.len());
        let view = RowView::full(bundle(len));
        let input_seq = view.active_sequence();

        let filtered = view.select(|idx| keep[idx]);
        let output_seq = filtered.active_sequence();

        let mut it = input_seq.iter();
        prop_assert!(output_seq.iter().all(|x| it.any(|y| y == x)));
    }

    /// (6) concatenation: `output.logical_size == A.logical_size + B.logical_size`.
    #[test]
    fn concat_length_is_additive(a_len in 0usize..15, b_len in 0usize..15) {
        let a = bundle(a_len);
        let b = bundle(b_len);
        let out = ColumnBundle::concat_dense(&a, &b, &[]);
        prop_assert_eq!(out.len(), a_len + b_len);
    }

    /// (7) writes-effect idempotence: evaluating the same effect against the
    /// same (empty) environment twice returns the same result.
    #[test]
    fn writes_effect_is_idempotent_over_empty_env(raw_keys in prop::collection::vec(1u32..50, 0..5)) {
        let effect = WritesEffect::Keys { keys: raw_keys.into_iter().map(KeyId).collect() };
        let bound: HashMap<String, String> = HashMap::new();
        let resolve = |_: &str| -> Option<KeyId> { None };
        let env = EffectEnv::new(&bound, &resolve);

        let first = eval_writes_effect(&effect, &env);
        let second = eval_writes_effect(&effect, &env);
        prop_assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    /// (8) digest determinism: compiling (serializing) the same source value
    /// twice yields a byte-identical digest.
    #[test]
    fn digest_is_deterministic(a in any::<u32>(), b in ".{0,10}") {
        let value = serde_json::json!({"a": a, "b": b, "nested": {"x": a, "y": b}});
        let d1 = canonical_digest(&value).unwrap();
        let d2 = canonical_digest(&value).unwrap();
        prop_assert_eq!(d1, d2);
    }
}

/// (9) `post` safety: in every non-`Running` state, `post(f)` returns
/// `false` and `f` is never invoked. `EventLoop` starts in `Idle` and this
/// test never calls `start()`, so it stays there for the whole test.
#[test]
fn post_before_start_never_invokes_and_returns_false() {
    let event_loop = EventLoop::new();
    let invoked = Arc::new(AtomicUsize::new(0));
    let invoked2 = Arc::clone(&invoked);

    let posted = event_loop.post(move || {
        invoked2.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!posted);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

/// (9) continued: once stopped, a loop that was never started rejects
/// `post` in exactly the same way (state transitions straight from `Idle`
/// through `Stopping` without ever reaching `Running`).
#[test]
fn post_after_stop_never_invokes_and_returns_false() {
    let event_loop = EventLoop::new();
    event_loop.stop();

    let invoked = Arc::new(AtomicUsize::new(0));
    let invoked2 = Arc::clone(&invoked);
    let posted = event_loop.post(move || {
        invoked2.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!posted);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

/// (10) first-wins: racing many concurrent `complete()` calls against one
/// `TimeoutRace`, exactly one observes `true` (wins) and the race's final
/// value is whichever one won — never a mix of two.
#[test]
fn timeout_race_first_wins_under_concurrency() {
    let race: Arc<TimeoutRace<usize>> = Arc::new(TimeoutRace::new());
    let wins = Arc::new(Mutex::new(Vec::new()));

    std::thread::scope(|scope| {
        for i in 0..16 {
            let race = Arc::clone(&race);
            let wins = Arc::clone(&wins);
            scope.spawn(move || {
                if race.complete(i) {
                    wins.lock().unwrap().push(i);
                }
            });
        }
    });

    let wins = wins.lock().unwrap();
    assert_eq!(wins.len(), 1, "exactly one caller must win the race, got {wins:?}");
    assert_eq!(race.take_value(), Some(wins[0]));
}

/// (10) continued: a timer that claims the timeout before any worker
/// completes wins, and every subsequent `complete()` is rejected.
#[test]
fn timeout_claim_then_concurrent_completions_all_lose() {
    let race: Arc<TimeoutRace<usize>> = Arc::new(TimeoutRace::new());
    assert!(race.claim_timeout());

    std::thread::scope(|scope| {
        for i in 0..8 {
            let race = Arc::clone(&race);
            scope.spawn(move || {
                assert!(!race.complete(i));
            });
        }
    });

    assert_eq!(race.take_value(), None);
}
