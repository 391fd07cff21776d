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

//! Entry point: parses `Cli`, then dispatches to a one-shot run, a
//! `--stdin` loop, or a `--serve` HTTP server.

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rankflow_cmd::cli::Cli;
use rankflow_cmd::exec::{self, App};
use rankflow_cmd::http;
use rankflow_common::request::ExecuteRequest;
use rankflow_runtime::{EventLoop, LoopState};

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let exit_code = match cli.serve {
        Some(addr) => run_serve(&cli, addr),
        None => run_local(&cli),
    };
    std::process::exit(exit_code);
}

/// One-shot / `--stdin` / `--list-plans` / `--print-registry` modes: a
/// single current-thread runtime and `LocalSet`, no cross-thread bridging
/// needed since there is exactly one caller (this process's stdin/stdout).
fn run_local(cli: &Cli) -> i32 {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");
    let local = tokio::task::LocalSet::new();

    local.block_on(&rt, async {
        let app = match App::new(cli).await {
            Ok(app) => app,
            Err(e) => return report_error(&e),
        };

        if cli.list_plans {
            return match app.list_plans_report() {
                Ok(report) => {
                    println!("{report}");
                    0
                }
                Err(e) => report_error(&e),
            };
        }
        if cli.print_registry {
            return match app.registry_digest_report() {
                Ok(report) => {
                    println!("{report}");
                    0
                }
                Err(e) => report_error(&e),
            };
        }

        if cli.stdin {
            run_stdin_loop(&app).await
        } else {
            run_single_shot(&app).await
        }
    })
}

fn report_error(e: &rankflow_common::error::EngineError) -> i32 {
    eprintln!("{}", serde_json::to_string(&e.to_structured()).unwrap_or_default());
    2
}

/// Reads one JSON `ExecuteRequest` from all of stdin, executes it, and
/// prints the `ExecuteResponse` to stdout.
async fn run_single_shot(app: &App) -> i32 {
    let mut buf = String::new();
    if std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf).is_err() {
        eprintln!("failed to read request from stdin");
        return 1;
    }
    let req: ExecuteRequest = match serde_json::from_str(&buf) {
        Ok(req) => req,
        Err(e) => {
            eprintln!("invalid request JSON: {e}");
            return 1;
        }
    };
    let (response, code) = app.handle_request(req).await;
    println!("{}", serde_json::to_string(&response).unwrap_or_default());
    code
}

/// `--stdin`: one JSON `ExecuteRequest` per line in, one JSON
/// `ExecuteResponse` per line out, until EOF. The process exit code is that
/// of the last request handled.
async fn run_stdin_loop(app: &App) -> i32 {
    let stdin = std::io::stdin();
    let mut last_code = 0;
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let req: ExecuteRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                eprintln!("invalid request JSON: {e}");
                last_code = 1;
                continue;
            }
        };
        let (response, code) = app.handle_request(req).await;
        println!("{}", serde_json::to_string(&response).unwrap_or_default());
        last_code = code;
    }
    last_code
}

/// `--serve`: runs the loop thread via `EventLoop`, installs the `App` onto
/// it, then drives the ambient `axum` HTTP surface on an ordinary
/// multi-threaded runtime that bridges into the loop thread through
/// `EventLoop::post` for every request.
fn run_serve(cli: &Cli, addr: SocketAddr) -> i32 {
    let event_loop = Arc::new(EventLoop::new());
    event_loop.start();
    while event_loop.state() != LoopState::Running {
        std::thread::sleep(Duration::from_millis(5));
    }

    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();
    let cli_for_loop = cli.clone();
    let posted = event_loop.post(move || {
        tokio::task::spawn_local(async move {
            match App::new(&cli_for_loop).await {
                Ok(app) => {
                    exec::install(app);
                    let _ = ready_tx.send(Ok(()));
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            }
        });
    });
    if !posted {
        eprintln!("failed to start the execution loop");
        return 2;
    }

    match ready_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("failed to initialize application: {e}");
            event_loop.stop();
            return 2;
        }
        Err(_) => {
            eprintln!("execution loop dropped during initialization");
            event_loop.stop();
            return 2;
        }
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build http runtime");
    let exit_code = rt.block_on(async {
        let router = http::router(Arc::clone(&event_loop));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                eprintln!("failed to bind {addr}: {e}");
                return 2;
            }
        };
        tracing::info!(%addr, "serving POST /execute");
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("http server error: {e}");
            return 3;
        }
        0
    });

    event_loop.stop();
    exit_code
}
