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

//! The ambient `POST /execute` HTTP surface. Runs on its own (ordinary,
//! `Send`) multi-threaded runtime, separate from the loop thread that owns
//! the non-`Send` `App`/`KvClient`s; every request crosses over via
//! `EventLoop::post`, exactly the "callers reach the loop only through
//! `post`" contract `rankflow_runtime::event_loop` documents.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use rankflow_common::error::EngineError;
use rankflow_common::request::{ExecuteRequest, ExecuteResponse};
use rankflow_runtime::EventLoop;
use tokio::sync::oneshot;

#[derive(Clone)]
struct HttpState {
    event_loop: Arc<EventLoop>,
}

pub fn router(event_loop: Arc<EventLoop>) -> Router {
    Router::new().route("/execute", post(execute_handler)).with_state(HttpState { event_loop })
}

async fn execute_handler(State(state): State<HttpState>, Json(req): Json<ExecuteRequest>) -> (StatusCode, Json<ExecuteResponse>) {
    let (tx, rx) = oneshot::channel::<(ExecuteResponse, i32)>();

    let posted = state.event_loop.post(move || {
        tokio::task::spawn_local(async move {
            let app = crate::exec::current();
            let outcome = app.handle_request(req).await;
            let _ = tx.send(outcome);
        });
    });

    if !posted {
        let error = EngineError::shutdown("the execution loop is not running").to_structured();
        return (StatusCode::SERVICE_UNAVAILABLE, Json(ExecuteResponse::failure("unknown".to_string(), error)));
    }

    match rx.await {
        Ok((response, code)) => (status_for_exit_code(code), Json(response)),
        Err(_) => {
            let error = EngineError::shutdown("the execution loop dropped the request before replying").to_structured();
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ExecuteResponse::failure("unknown".to_string(), error)))
        }
    }
}

/// Maps the CLI's process exit codes onto HTTP statuses for the
/// ambient route; the exit codes themselves remain the CLI's contract.
fn status_for_exit_code(code: i32) -> StatusCode {
    match code {
        0 => StatusCode::OK,
        1 => StatusCode::BAD_REQUEST,
        2 => StatusCode::UNPROCESSABLE_ENTITY,
        4 => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
