// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle function trait definitions.
//!
//! A lifecycle function receives the tenant payload, provisions or
//! deprovisions the tenant's database user, and answers with
//! `{"status": "OK" | "ERROR", ...}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from lifecycle function calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FunctionError {
    /// The call did not finish within its bound.
    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    /// The function process could not be started.
    #[error("Function start failed: {0}")]
    StartFailed(String),

    /// The function process exited with a non-zero code.
    #[error("Exit code {exit_code}: {stderr}")]
    ExitCode {
        /// Exit code from the process.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// The function ran and reported an error.
    #[error("Function reported error: {0}")]
    Backend(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for lifecycle function calls.
pub type Result<T> = std::result::Result<T, FunctionError>;

/// One call to a lifecycle function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Name of the deployed function.
    pub function_name: String,
    /// Tenant the call is for.
    pub tenant_id: String,
    /// Exact JSON payload.
    pub payload: String,
}

/// Outcome reported by the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    /// Work done.
    Ok,
    /// Work failed; see `message`.
    Error,
}

/// Function response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Reported outcome.
    pub status: ResponseStatus,
    /// Success detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    /// Error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InvokeResponse {
    /// Successful response with a detail message.
    pub fn ok(results: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            results: Some(results.into()),
            message: None,
        }
    }

    /// Error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            results: None,
            message: Some(message.into()),
        }
    }

    /// Parse a response body. An empty body counts as success.
    pub fn parse(body: &str) -> Result<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(Self {
                status: ResponseStatus::Ok,
                results: None,
                message: None,
            });
        }
        Ok(serde_json::from_str(body)?)
    }

    /// Turn an `ERROR` status into [`FunctionError::Backend`].
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            ResponseStatus::Ok => Ok(self),
            ResponseStatus::Error => Err(FunctionError::Backend(
                self.message
                    .unwrap_or_else(|| "function returned ERROR without a message".to_string()),
            )),
        }
    }
}

/// A backend function that provisions or deprovisions tenants.
///
/// Implementations make exactly one call per `invoke` and never retry. The
/// caller bounds the call with a timeout and drops the future when it fires,
/// so implementations must release their resources on drop.
#[async_trait]
pub trait LifecycleFunction: Send + Sync {
    /// Function backend identifier (e.g., "command", "mock")
    fn function_type(&self) -> &'static str;

    /// Make one call and return the parsed response.
    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse>;
}
