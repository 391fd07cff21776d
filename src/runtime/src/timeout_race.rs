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

//! First-wins timeout race: shared state between a timer and a worker
//! (OS thread or detached task), where whichever observes `completed==false`
//! first claims the outcome and the other exits without mutating
//!.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

/// Counts results that arrived after their timeout already won the race
///. Shared per scheduler
/// instance (behind an `Arc`, so worker closures can observe it after the
/// awaiting side has moved on); exposed as a test hook.
#[derive(Debug, Default)]
pub struct LateCompletionCounter {
    count: AtomicU64,
}

impl LateCompletionCounter {
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Shared state for one timeout race, heap-allocated and reference-counted
/// so the worker closure can outlive the awaiting coroutine.
pub struct TimeoutRace<T> {
    completed: AtomicBool,
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Default for TimeoutRace<T> {
    fn default() -> Self {
        TimeoutRace { completed: AtomicBool::new(false), slot: Mutex::new(None), notify: Notify::new() }
    }
}

impl<T> TimeoutRace<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the worker/task side when its result is ready. Returns
    /// `true` if this call won the race (the timer had not yet claimed it).
    pub fn complete(&self, value: T) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.slot.lock().unwrap() = Some(value);
        self.notify.notify_one();
        true
    }

    /// Called on the awaiting side when the timer fires first. Returns
    /// `true` if the timer won the race.
    pub fn claim_timeout(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    /// Awaits the worker's result after losing the timer race to a prior
    /// `claim_timeout` call that turned out to be wrong (`complete` had
    /// already flipped `completed` just before `claim_timeout` observed it).
    /// `Notify` buffers one permit, so this resolves immediately once
    /// `complete` has been called.
    pub async fn wait_for_value(&self) -> T {
        loop {
            if let Some(v) = self.slot.lock().unwrap().take() {
                return v;
            }
            self.notify.notified().await;
        }
    }

    pub fn take_value(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn only_one_side_wins() {
        let race: Arc<TimeoutRace<i32>> = Arc::new(TimeoutRace::new());
        assert!(race.complete(1));
        assert!(!race.complete(2));
        assert_eq!(race.take_value(), Some(1));
    }

    #[test]
    fn timeout_claim_then_late_complete_is_rejected() {
        let race: TimeoutRace<i32> = TimeoutRace::new();
        assert!(race.claim_timeout());
        assert!(!race.complete(5));
    }

    #[tokio::test]
    async fn wait_for_value_resolves_after_complete() {
        let race: Arc<TimeoutRace<i32>> = Arc::new(TimeoutRace::new());
        let r2 = Arc::clone(&race);
        tokio::spawn(async move {
            r2.complete(42);
        });
        assert_eq!(race.wait_for_value().await, 42);
    }
}
