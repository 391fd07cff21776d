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

//! The single-threaded event loop: one dedicated OS thread
//! that drives a `LocalSet` of non-`Send` scheduler tasks, serving as the
//! serialization point for all scheduler and async-I/O state. Rust's async
//! runtime already gives us the "lazy task" contract for free — a
//! `Future` does nothing until polled — so there is no separate coroutine
//! primitive to build; this module supplies the loop thread itself plus the
//! cross-thread `post` contract.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

const IDLE: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const STOPPING: u8 = 3;
const STOPPED: u8 = 4;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Five-state atomic lifecycle: `Idle → Starting →
/// Running → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

fn decode(value: u8) -> LoopState {
    match value {
        IDLE => LoopState::Idle,
        STARTING => LoopState::Starting,
        RUNNING => LoopState::Running,
        STOPPING => LoopState::Stopping,
        _ => LoopState::Stopped,
    }
}

struct Shared {
    state: AtomicU8,
    queue: Mutex<Vec<Callback>>,
    wake: Notify,
    loop_thread_id: Mutex<Option<std::thread::ThreadId>>,
}

/// Owns a dedicated OS thread and serializes all scheduler mutation onto it
///. Callers elsewhere (worker pool jobs, I/O reply
/// callbacks) reach back onto the loop only through `post`.
pub struct EventLoop {
    shared: Arc<Shared>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    stopped: Arc<Notify>,
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop {
            shared: Arc::new(Shared {
                state: AtomicU8::new(IDLE),
                queue: Mutex::new(Vec::new()),
                wake: Notify::new(),
                loop_thread_id: Mutex::new(None),
            }),
            thread: Mutex::new(None),
            stopped: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> LoopState {
        decode(self.shared.state.load(Ordering::Acquire))
    }

    /// Spawns the worker thread and installs the wake-up handle. Idempotent
    /// only from `Idle`; calling twice is a programmer error.
    pub fn start(&self) {
        self.shared
            .state
            .compare_exchange(IDLE, STARTING, Ordering::AcqRel, Ordering::Acquire)
            .expect("EventLoop::start called more than once");

        let shared = Arc::clone(&self.shared);
        let stopped = Arc::clone(&self.stopped);
        let handle = std::thread::Builder::new()
            .name("rankflow-loop".to_string())
            .spawn(move || {
                *shared.loop_thread_id.lock() = Some(std::thread::current().id());
                // A concurrent `stop()` may already have swapped `STARTING`
                // to `STOPPING` before we get here; only move to `RUNNING`
                // if we're still the ones who own the `STARTING` state, so
                // we never clobber a racing stop back to running.
                let _ = shared.state.compare_exchange(STARTING, RUNNING, Ordering::AcqRel, Ordering::Acquire);

                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("failed to build loop-thread runtime");
                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, drain_loop(Arc::clone(&shared)));

                shared.state.store(STOPPED, Ordering::Release);
                stopped.notify_waiters();
            })
            .expect("failed to spawn loop thread");
        *self.thread.lock() = Some(handle);
    }

    /// `post(callback) -> bool`: enqueues a callback and
    /// wakes the loop; returns `false` and neither enqueues nor executes the
    /// callback if the loop is not `Running`. The double-check — a
    /// lock-free read, then a re-check under the queue lock — closes the
    /// race with a concurrent transition into `Stopping`
    ///.
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) -> bool {
        if self.shared.state.load(Ordering::Acquire) != RUNNING {
            return false;
        }
        let mut queue = self.shared.queue.lock();
        if self.shared.state.load(Ordering::Acquire) != RUNNING {
            return false;
        }
        queue.push(Box::new(callback));
        drop(queue);
        self.shared.wake.notify_one();
        true
    }

    /// Idempotent stop. Signals the loop to drain and exit; joins the
    /// thread unless called from the loop thread itself, in which case it
    /// detaches (the loop thread cannot join itself) and relies on
    /// `stopped` for observers.
    pub fn stop(&self) {
        let prev = self.shared.state.swap(STOPPING, Ordering::AcqRel);
        if prev == STOPPED || prev == STOPPING {
            self.shared.state.store(prev, Ordering::Release);
            return;
        }
        self.shared.wake.notify_one();

        let on_loop_thread = self.shared.loop_thread_id.lock().map(|id| id == std::thread::current().id()).unwrap_or(false);
        if on_loop_thread {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Async wait for the loop to reach `Stopped`, usable from the loop
    /// thread itself (where `stop` cannot join).
    pub async fn wait_stopped(&self) {
        while self.state() != LoopState::Stopped {
            self.stopped.notified().await;
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // The destructor asserts it is not running on its own loop thread.
        // A drop from the loop thread itself is a programming error — the
        // loop cannot join itself.
        let on_loop_thread = self.shared.loop_thread_id.lock().map(|id| id == std::thread::current().id()).unwrap_or(false);
        assert!(!on_loop_thread, "EventLoop dropped from its own loop thread");
        self.stop();
    }
}

/// Drains the post queue in FIFO order until the state leaves `Running`
///.
async fn drain_loop(shared: Arc<Shared>) {
    loop {
        if shared.state.load(Ordering::Acquire) != RUNNING {
            // One final drain so callbacks posted right before the
            // transition are not silently dropped if they raced `post`'s
            // first check and lost — `post` itself already rejects those,
            // so this is purely a courtesy flush of whatever is queued.
            drain_once(&shared);
            return;
        }
        shared.wake.notified().await;
        drain_once(&shared);
    }
}

fn drain_once(shared: &Shared) {
    let callbacks: Vec<Callback> = std::mem::take(&mut *shared.queue.lock());
    for callback in callbacks {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn starts_and_stops() {
        let event_loop = EventLoop::new();
        event_loop.start();
        // Give the thread a moment to flip into Running.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(event_loop.state(), LoopState::Running);
        event_loop.stop();
        assert_eq!(event_loop.state(), LoopState::Stopped);
    }

    #[test]
    fn post_runs_callback_on_loop_thread() {
        let event_loop = EventLoop::new();
        event_loop.start();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let ok = event_loop.post(move || ran2.store(true, Ordering::SeqCst));
        assert!(ok);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(ran.load(Ordering::SeqCst));
        event_loop.stop();
    }

    #[test]
    fn post_rejects_after_stop() {
        let event_loop = EventLoop::new();
        event_loop.start();
        std::thread::sleep(std::time::Duration::from_millis(20));
        event_loop.stop();

        let called = Arc::new(AtomicBool::new(false));
        let called2 = Arc::clone(&called);
        let ok = event_loop.post(move || called2.store(true, Ordering::SeqCst));
        assert!(!ok);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn post_before_start_is_rejected() {
        let event_loop = EventLoop::new();
        assert!(!event_loop.post(|| {}));
    }
}
