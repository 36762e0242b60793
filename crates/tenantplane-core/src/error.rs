// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for tenantplane-core.
//!
//! Every failure carries a stable error code so the CLI and the deployment
//! driver can report the originating error without string matching.

use std::fmt;

use crate::config::ConfigError;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the allocator, registry, export store and persistence.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Tenant is in the wrong status for the requested transition.
    InvalidTenantState {
        /// The tenant ID.
        tenant_id: String,
        /// The status the transition needs.
        expected: String,
        /// The status on record.
        actual: String,
    },

    /// A priority (or priority block) is already held by another tenant.
    PriorityCollision {
        /// Tenant asking for the priority.
        tenant_id: String,
        /// Tenant currently holding it.
        holder: String,
        /// First colliding priority.
        priority: u32,
    },

    /// No free block is left below the listener ceiling.
    PriorityExhausted {
        /// Listener being allocated on.
        listener: String,
        /// Tenant asking for a block.
        tenant_id: String,
    },

    /// A cross-stack import names an export nobody published.
    ExportNotFound {
        /// The export name.
        name: String,
    },

    /// An export name is already published by a different stack.
    ExportAlreadyExists {
        /// The export name.
        name: String,
        /// Stack that owns it.
        owner: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTenantState { .. } => "INVALID_TENANT_STATE",
            Self::PriorityCollision { .. } => "PRIORITY_COLLISION",
            Self::PriorityExhausted { .. } => "PRIORITY_EXHAUSTED",
            Self::ExportNotFound { .. } => "EXPORT_NOT_FOUND",
            Self::ExportAlreadyExists { .. } => "EXPORT_ALREADY_EXISTS",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Shorthand for a [`CoreError::ValidationError`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTenantState {
                tenant_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Tenant '{}' is in invalid state: expected '{}', got '{}'",
                    tenant_id, expected, actual
                )
            }
            Self::PriorityCollision {
                tenant_id,
                holder,
                priority,
            } => {
                write!(
                    f,
                    "Priority {} requested by tenant '{}' is held by tenant '{}'",
                    priority, tenant_id, holder
                )
            }
            Self::PriorityExhausted {
                listener,
                tenant_id,
            } => {
                write!(
                    f,
                    "No free priority block on listener '{}' for tenant '{}'",
                    listener, tenant_id
                )
            }
            Self::ExportNotFound { name } => {
                write!(f, "Export '{}' not found", name)
            }
            Self::ExportAlreadyExists { name, owner } => {
                write!(f, "Export '{}' is already published by '{}'", name, owner)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        let field = match &err {
            ConfigError::Missing(name) | ConfigError::Invalid(name, _) => (*name).to_string(),
        };
        CoreError::ValidationError {
            field,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                CoreError::InvalidTenantState {
                    tenant_id: "acme".to_string(),
                    expected: "provisioned".to_string(),
                    actual: "unprovisioned".to_string(),
                },
                "INVALID_TENANT_STATE",
            ),
            (
                CoreError::PriorityCollision {
                    tenant_id: "globex".to_string(),
                    holder: "acme".to_string(),
                    priority: 103,
                },
                "PRIORITY_COLLISION",
            ),
            (
                CoreError::PriorityExhausted {
                    listener: "shared".to_string(),
                    tenant_id: "acme".to_string(),
                },
                "PRIORITY_EXHAUSTED",
            ),
            (
                CoreError::ExportNotFound {
                    name: "ApplicationPlaneListenerArn".to_string(),
                },
                "EXPORT_NOT_FOUND",
            ),
            (
                CoreError::ExportAlreadyExists {
                    name: "RDSClusterHost".to_string(),
                    owner: "ProductReviewStack".to_string(),
                },
                "EXPORT_ALREADY_EXISTS",
            ),
            (CoreError::validation("tenant_id", "empty"), "VALIDATION_ERROR"),
            (
                CoreError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "locked".to_string(),
                },
                "DATABASE_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(error.error_code(), expected_code, "wrong code for {:?}", error);
        }
    }

    #[test]
    fn test_display_messages() {
        let err = CoreError::PriorityCollision {
            tenant_id: "globex".to_string(),
            holder: "acme".to_string(),
            priority: 103,
        };
        assert_eq!(
            err.to_string(),
            "Priority 103 requested by tenant 'globex' is held by tenant 'acme'"
        );

        let err = CoreError::InvalidTenantState {
            tenant_id: "acme".to_string(),
            expected: "provisioned".to_string(),
            actual: "unprovisioned".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Tenant 'acme' is in invalid state: expected 'provisioned', got 'unprovisioned'"
        );

        let err = CoreError::ExportNotFound {
            name: "RDSClusterHost".to_string(),
        };
        assert_eq!(err.to_string(), "Export 'RDSClusterHost' not found");
    }

    #[test]
    fn test_from_config_error() {
        let err: CoreError = ConfigError::Missing("TENANT_ID").into();
        match err {
            CoreError::ValidationError { field, message } => {
                assert_eq!(field, "TENANT_ID");
                assert_eq!(message, "missing required parameter: TENANT_ID");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoreError = json_err.into();
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }
}
