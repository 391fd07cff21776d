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

//! Error taxonomy shared across the engine. Every failure
//! surfaced to a caller is one `EngineError` carrying a `kind` and a message
//! naming the offending node/key/param; there is no partial-result path.

use std::fmt;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One of the five error kinds surfaced verbatim in the
/// response JSON's `error.kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Resource,
    Evaluation,
    Timeout,
    Shutdown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Resource => "resource_error",
            ErrorKind::Evaluation => "evaluation_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Shutdown => "shutdown_error",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource error: {0}")]
    Resource(
        String,
        #[source] Option<BoxedError>,
    ),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        EngineError::Resource(msg.into(), None)
    }

    pub fn resource_with_source(msg: impl Into<String>, source: BoxedError) -> Self {
        EngineError::Resource(msg.into(), Some(source))
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        EngineError::Evaluation(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        EngineError::Timeout(msg.into())
    }

    pub fn shutdown(msg: impl Into<String>) -> Self {
        EngineError::Shutdown(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Resource(..) => ErrorKind::Resource,
            EngineError::Evaluation(_) => ErrorKind::Evaluation,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Shutdown(_) => ErrorKind::Shutdown,
        }
    }

    /// Structured form for the response JSON's `error` object.
    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
}

