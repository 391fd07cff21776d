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

//! `clap` derive surface. This is the sole configuration surface for the
//! binary; there is no separate TOML/env-var config
//! layer.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lower")]
pub enum Env {
    Dev,
    Test,
    Prod,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rankflow", about = "Ranking DAG execution engine")]
pub struct Cli {
    /// Directory of registry JSON artifacts: keys.json, params.json,
    /// endpoints.json, task_manifest.json, capabilities.json.
    #[arg(long)]
    pub artifacts_dir: PathBuf,

    /// Execute against a single plan artifact file, bypassing the plan
    /// store. Mutually exclusive with `--plan_dir`/`--plan_name` in
    /// practice, though either may be given per request via `plan`/`plan_name`.
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Directory holding an `index.json` plus named plan artifacts.
    #[arg(long)]
    pub plan_dir: Option<PathBuf>,

    /// Select a plan registered under this name in `--plan_dir`'s index,
    /// used when a request doesn't name one itself.
    #[arg(long)]
    pub plan_name: Option<String>,

    /// Print the plans registered in `--plan_dir` and exit.
    #[arg(long)]
    pub list_plans: bool,

    /// Print the registries' canonical digests and exit.
    #[arg(long)]
    pub print_registry: bool,

    /// Default request-wide deadline in milliseconds, used for any request
    /// that omits `deadline_ms`.
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Default per-node timeout in milliseconds.
    #[arg(long)]
    pub node_timeout_ms: Option<u64>,

    /// Whether CPU-bound operators race their worker-pool job against a
    /// timer (`true`, the default scheduling mode) or run without a timeout
    /// race at all.
    #[arg(long, default_value_t = true)]
    pub async_scheduler: bool,

    /// Reserved for future intra-request fan-out tuning; currently every
    /// ready node is spawned onto the loop's `LocalSet` without an explicit
    /// cap.
    #[arg(long)]
    pub within_request_parallelism: Option<usize>,

    /// Number of OS threads in the CPU worker pool.
    #[arg(long)]
    pub cpu_threads: Option<usize>,

    /// Selects which `KvClient` implementation endpoints are attached with:
    /// `dev`/`test` use the in-memory mock, `prod` connects to Redis.
    #[arg(long, value_enum, default_value_t = Env::Dev)]
    pub env: Env,

    /// Read one JSON `ExecuteRequest` per line from stdin, writing one JSON
    /// `ExecuteResponse` per line to stdout, until EOF.
    #[arg(long)]
    pub stdin: bool,

    /// Serve the ambient `POST /execute` HTTP route on this address instead
    /// of a one-shot/stdin run.
    #[arg(long)]
    pub serve: Option<SocketAddr>,

    /// Emit each node's schema delta to stderr as it completes.
    #[arg(long)]
    pub dump_run_trace: bool,
}
