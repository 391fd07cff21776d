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

//! A fixed-size worker pool for CPU-bound
//! operator work. Workers never touch scheduler state directly; they write
//! into a shared awaitable's storage and post resumption back to the loop
//! thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub const DEFAULT_WORKER_THREADS: usize = 8;

/// Dispatches boxed closures to a fixed pool of OS threads and tracks the
/// number currently executing, so shutdown can drain to zero before the
/// event loop is torn down.
pub struct WorkerPool {
    sender: Option<mpsc::UnboundedSender<Job>>,
    inflight: Arc<AtomicUsize>,
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let inflight = Arc::new(AtomicUsize::new(0));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut threads = Vec::with_capacity(num_threads);
        for idx in 0..num_threads.max(1) {
            let receiver = Arc::clone(&receiver);
            let inflight = Arc::clone(&inflight);
            let handle = std::thread::Builder::new()
                .name(format!("rankflow-worker-{idx}"))
                .spawn(move || {
                    // Each worker thread runs its own tiny single-threaded
                    // runtime purely to drive the shared mpsc receiver; the
                    // jobs themselves are plain synchronous closures.
                    let rt = tokio::runtime::Builder::new_current_thread().build().expect("worker runtime");
                    rt.block_on(async {
                        loop {
                            let job = {
                                let mut guard = receiver.lock().await;
                                guard.recv().await
                            };
                            match job {
                                Some(job) => {
                                    inflight.fetch_add(1, Ordering::SeqCst);
                                    job();
                                    inflight.fetch_sub(1, Ordering::SeqCst);
                                }
                                None => break,
                            }
                        }
                    });
                })
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }

        WorkerPool { sender: Some(sender), inflight, threads: Mutex::new(threads) }
    }

    pub fn with_default_size() -> Self {
        Self::new(DEFAULT_WORKER_THREADS)
    }

    /// Submits a raw fire-and-forget job. Used by `cpu_offload_with_timeout`,
    /// which wires the job's completion into a `TimeoutRace` itself.
    pub fn submit_raw(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Submits `f` and returns a future resolving to its result, with no
    /// timeout race.
    pub fn submit<T: Send + 'static>(&self, f: impl FnOnce() -> T + Send + 'static) -> tokio::sync::oneshot::Receiver<T> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.submit_raw(move || {
            let _ = tx.send(f());
        });
        rx
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Blocks until every worker has drained its queue and finished its
    /// current job.
    pub async fn wait_idle(&self) {
        // The unbounded channel doesn't expose a length; callers are
        // expected to stop submitting new jobs before draining, so polling
        // `inflight` down to zero is sufficient.
        while self.inflight() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }

    /// Closes the submission channel and joins every worker thread. Must be
    /// called before the event loop that owns this pool is destroyed
    ///.
    pub fn shutdown(&mut self) {
        self.sender = None;
        if let Ok(mut threads) = self.threads.lock() {
            for handle in threads.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
