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

//! The timed suspension points of the scheduling fabric: sleep,
//! CPU-offload-with-timeout, and async-task-with-timeout.

use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rankflow_common::error::{EngineError, EngineResult};

use crate::timeout_race::{LateCompletionCounter, TimeoutRace};
use crate::worker_pool::WorkerPool;

/// Suspends for `ms` milliseconds, resuming on the loop thread. `N=0`
/// short-circuits to ready.
pub async fn sleep(ms: u64) {
    if ms == 0 {
        tokio::task::yield_now().await;
        return;
    }
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn remaining_budget(deadline: Instant) -> Result<Duration, ()> {
    let now = Instant::now();
    if now >= deadline {
        Err(())
    } else {
        // Arms a timer on the loop with the remaining budget, minimum 1 ms.
        Ok(deadline.saturating_duration_since(now).max(Duration::from_millis(1)))
    }
}

/// Races a worker-pool job against a timer. First-wins, enforced only on the awaiting
/// (loop-thread) side; a losing worker result is dropped and counted.
pub async fn cpu_offload_with_timeout<T: Send + 'static>(
    pool: &WorkerPool,
    deadline: Instant,
    late_completion_counter: &Arc<LateCompletionCounter>,
    job: impl FnOnce() -> T + Send + 'static,
) -> EngineResult<T> {
    let remaining = match remaining_budget(deadline) {
        Ok(d) => d,
        Err(()) => return Err(EngineError::timeout("node deadline already exceeded before dispatch")),
    };

    let race: Arc<TimeoutRace<T>> = Arc::new(TimeoutRace::new());
    let worker_race = Arc::clone(&race);
    let worker_counter = Arc::clone(late_completion_counter);
    pool.submit_raw(move || {
        let value = job();
        if !worker_race.complete(value) {
            worker_counter.increment();
        }
    });

    tokio::select! {
        _ = tokio::time::sleep(remaining) => {
            if race.claim_timeout() {
                Err(EngineError::timeout("node timed out during CPU-bound execution"))
            } else {
                Ok(race.wait_for_value().await)
            }
        }
        value = race.wait_for_value() => Ok(value),
    }
}

/// Races an inner async operation against a timer. Unlike the CPU-offload case there is no
/// separate OS thread — the inner future is detached onto the loop's
/// `LocalSet` so it runs to completion even if the timer wins, mirroring
/// "a reference-cycle between shared state and the runner is broken by RAII
/// scheduling self-destruction of the runner after final suspension": the
/// spawned task is the runner, and it drops its own `Rc` to the race as soon
/// as it completes.
///
/// `TimeoutRace` itself only requires `Send + Sync` internals (a `Mutex` and
/// a `Notify`); held behind an `Rc` here rather than an `Arc` because the
/// runner never leaves the loop thread's `LocalSet`, matching the
/// thread-confined regex cache's own use of `Rc`.
pub async fn async_with_timeout<T: 'static>(
    deadline: Instant,
    late_completion_counter: &Arc<LateCompletionCounter>,
    fut: impl Future<Output = T> + 'static,
) -> EngineResult<T> {
    let remaining = match remaining_budget(deadline) {
        Ok(d) => d,
        Err(()) => return Err(EngineError::timeout("node deadline already exceeded before dispatch")),
    };

    let race: Rc<TimeoutRace<T>> = Rc::new(TimeoutRace::new());
    let runner_race = Rc::clone(&race);
    let runner_counter = Arc::clone(late_completion_counter);
    tokio::task::spawn_local(async move {
        let value = fut.await;
        if !runner_race.complete(value) {
            runner_counter.increment();
        }
    });

    tokio::select! {
        _ = tokio::time::sleep(remaining) => {
            if race.claim_timeout() {
                Err(EngineError::timeout("node timed out during async execution"))
            } else {
                Ok(race.wait_for_value().await)
            }
        }
        value = race.wait_for_value() => Ok(value),
    }
}
