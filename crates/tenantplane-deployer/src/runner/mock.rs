// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock lifecycle function for testing.
//!
//! Records every request and answers with a configured behaviour instead of
//! touching a database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    RespondError(String),
    Fail(String),
    Hang,
}

/// Mock lifecycle function for testing.
#[derive(Clone)]
pub struct MockFunction {
    calls: Arc<Mutex<Vec<InvokeRequest>>>,
    behaviour: Behaviour,
    /// Optional delay before answering
    pub delay: Duration,
}

impl Default for MockFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFunction {
    /// Mock that answers `{"status":"OK"}`.
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::Succeed)
    }

    /// Mock that answers `{"status":"ERROR","message":..}`.
    pub fn responding_error(message: &str) -> Self {
        Self::with_behaviour(Behaviour::RespondError(message.to_string()))
    }

    /// Mock whose process exits non-zero.
    pub fn failing(stderr: &str) -> Self {
        Self::with_behaviour(Behaviour::Fail(stderr.to_string()))
    }

    /// Mock that never answers. Use it to exercise the invocation timeout.
    pub fn never_completing() -> Self {
        Self::with_behaviour(Behaviour::Hang)
    }

    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            behaviour,
            delay: Duration::ZERO,
        }
    }

    /// Requests received so far, including ones that failed.
    pub async fn calls(&self) -> Vec<InvokeRequest> {
        self.calls.lock().await.clone()
    }

    /// Number of requests received.
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl LifecycleFunction for MockFunction {
    fn function_type(&self) -> &'static str {
        "mock"
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<InvokeResponse> {
        self.calls.lock().await.push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behaviour {
            Behaviour::Succeed => Ok(InvokeResponse::ok("Tenant Initialized")),
            Behaviour::RespondError(message) => Ok(InvokeResponse::error(message.clone())),
            Behaviour::Fail(stderr) => Err(FunctionError::ExitCode {
                exit_code: 1,
                stderr: stderr.clone(),
            }),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}
