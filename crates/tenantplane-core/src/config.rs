// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::routing::MAX_RULE_PRIORITY;

/// Default bound on a single backend lifecycle call.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(600);

/// Function version tag used when none is configured.
pub const DEFAULT_FUNCTION_VERSION: &str = "$LATEST";

/// tenantplane configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file holding reservations, the invocation ledger and exports
    pub database_path: PathBuf,
    /// First priority base handed out by the registry
    pub priority_floor: u32,
    /// Width of every reserved priority block
    pub priority_stride: u32,
    /// Upper bound on one backend lifecycle call
    pub invoke_timeout: Duration,
    /// Version tag of the backend function, part of every physical id
    pub function_version: String,
    /// Executable standing in for the backend lifecycle function
    pub lifecycle_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(".data/tenantplane.db"),
            priority_floor: 100,
            priority_stride: 10,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            function_version: DEFAULT_FUNCTION_VERSION.to_string(),
            lifecycle_command: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `TENANTPLANE_DATABASE_PATH`: SQLite state file (default: .data/tenantplane.db)
    /// - `TENANTPLANE_PRIORITY_FLOOR`: first block base (default: 100)
    /// - `TENANTPLANE_PRIORITY_STRIDE`: block width (default: 10)
    /// - `TENANTPLANE_INVOKE_TIMEOUT_SECS`: backend call bound (default: 600)
    /// - `TENANTPLANE_FUNCTION_VERSION`: version tag (default: $LATEST)
    /// - `TENANTPLANE_LIFECYCLE_COMMAND`: backend function executable (default: unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_path = std::env::var("TENANTPLANE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let priority_floor: u32 = std::env::var("TENANTPLANE_PRIORITY_FLOOR")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TENANTPLANE_PRIORITY_FLOOR", "must be a non-negative integer")
            })?;
        if priority_floor >= MAX_RULE_PRIORITY {
            return Err(ConfigError::Invalid(
                "TENANTPLANE_PRIORITY_FLOOR",
                "must be below the listener priority ceiling",
            ));
        }

        let priority_stride: u32 = std::env::var("TENANTPLANE_PRIORITY_STRIDE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .ok()
            .filter(|stride| *stride > 0)
            .ok_or(ConfigError::Invalid(
                "TENANTPLANE_PRIORITY_STRIDE",
                "must be a positive integer",
            ))?;

        let timeout_secs: u64 = std::env::var("TENANTPLANE_INVOKE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(ConfigError::Invalid(
                "TENANTPLANE_INVOKE_TIMEOUT_SECS",
                "must be a positive number of seconds",
            ))?;

        let function_version = std::env::var("TENANTPLANE_FUNCTION_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.function_version);

        let lifecycle_command = std::env::var("TENANTPLANE_LIFECYCLE_COMMAND")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_path,
            priority_floor,
            priority_stride,
            invoke_timeout: Duration::from_secs(timeout_secs),
            function_version,
            lifecycle_command,
        })
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required parameter is missing.
    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    /// A parameter has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
