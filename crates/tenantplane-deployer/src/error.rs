// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tenantplane-deployer.

use thiserror::Error;

/// Deployment errors. Every variant halts the deployment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeployError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] tenantplane_core::ConfigError),

    /// Allocation, registry, export or persistence failure.
    #[error("{0}")]
    Core(#[from] tenantplane_core::CoreError),

    /// The lifecycle function failed or timed out.
    #[error("Lifecycle invocation failed: {0}")]
    Function(#[from] crate::runner::FunctionError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed onboarding event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl DeployError {
    /// Stable error code for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Core(err) => err.error_code(),
            Self::Function(crate::runner::FunctionError::Timeout(_)) => "INVOCATION_TIMEOUT",
            Self::Function(_) => "INVOCATION_FAILED",
            Self::Json(_) => "JSON_ERROR",
            Self::InvalidEvent(_) => "INVALID_EVENT",
        }
    }
}

/// Result type using DeployError.
pub type Result<T> = std::result::Result<T, DeployError>;
