// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Idempotent lifecycle invoker.
//!
//! Applies a [`LifecycleInvocation`] declared in a stack. The invocation's
//! physical id is compared with the last one applied for the same stack
//! resource:
//!
//! - same id, tenant already in the resulting status: nothing is called
//! - otherwise: the tenant status must allow the transition, then the
//!   function is called exactly once, bounded by the configured timeout
//!
//! Only a successful call is recorded. A timeout, a process failure or an
//! `ERROR` response leaves the ledger and tenant status untouched and fails
//! the deployment; there is no retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};

use tenantplane_core::lifecycle::LifecycleInvocation;
use tenantplane_core::persistence::{InvocationRecord, Persistence};
use tenantplane_core::{Config, CoreError, TenantStatus};

use crate::error::Result;
use crate::runner::{FunctionError, InvokeRequest, LifecycleFunction};

/// What [`LifecycleInvoker::apply`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// The function was called and succeeded.
    Invoked {
        /// Physical id now on record.
        physical_id: String,
        /// Detail returned by the function.
        results: Option<String>,
        /// Call duration in milliseconds.
        duration_ms: u64,
    },
    /// The physical id was already applied; nothing was called.
    Unchanged {
        /// Physical id on record.
        physical_id: String,
    },
}

impl InvokeOutcome {
    /// Physical id after the operation.
    pub fn physical_id(&self) -> &str {
        match self {
            Self::Invoked { physical_id, .. } | Self::Unchanged { physical_id } => physical_id,
        }
    }

    /// Whether the function was called.
    pub fn was_invoked(&self) -> bool {
        matches!(self, Self::Invoked { .. })
    }
}

/// Calls the lifecycle function at most once per distinct physical id.
pub struct LifecycleInvoker {
    persistence: Arc<dyn Persistence>,
    function: Arc<dyn LifecycleFunction>,
    timeout: Duration,
    function_version: String,
}

impl LifecycleInvoker {
    /// Invoker with an explicit timeout and function version tag.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        function: Arc<dyn LifecycleFunction>,
        timeout: Duration,
        function_version: impl Into<String>,
    ) -> Self {
        Self {
            persistence,
            function,
            timeout,
            function_version: function_version.into(),
        }
    }

    /// Invoker using the configured timeout and version tag.
    pub fn from_config(
        persistence: Arc<dyn Persistence>,
        function: Arc<dyn LifecycleFunction>,
        config: &Config,
    ) -> Self {
        Self::new(
            persistence,
            function,
            config.invoke_timeout,
            config.function_version.clone(),
        )
    }

    /// Function version tag embedded in physical ids.
    pub fn function_version(&self) -> &str {
        &self.function_version
    }

    /// Current status of a tenant; unknown tenants are unprovisioned.
    pub async fn tenant_status(&self, tenant_id: &str) -> Result<TenantStatus> {
        Ok(self
            .persistence
            .get_tenant_status(tenant_id)
            .await?
            .map(|record| record.status())
            .unwrap_or(TenantStatus::Unprovisioned))
    }

    /// Apply `invocation` as declared in `stack_id`, calling `function_name`.
    pub async fn apply(
        &self,
        stack_id: &str,
        function_name: &str,
        invocation: &LifecycleInvocation,
    ) -> Result<InvokeOutcome> {
        let tenant_id = invocation.tenant_id();
        let state = invocation.state();
        let resource = invocation.resource_name();
        let physical_id = invocation.physical_id(stack_id, &self.function_version);

        let status = self.tenant_status(tenant_id).await?;
        let last = self.persistence.last_invocation(stack_id, resource).await?;

        if let Some(last) = &last
            && last.physical_id == physical_id
            && status == state.resulting_status()
        {
            info!(
                stack = %stack_id,
                tenant_id = %tenant_id,
                physical_id = %physical_id,
                "Lifecycle invocation unchanged, skipping"
            );
            return Ok(InvokeOutcome::Unchanged { physical_id });
        }

        if !state.allowed_from(status) {
            return Err(CoreError::InvalidTenantState {
                tenant_id: tenant_id.to_string(),
                expected: TenantStatus::Provisioned.to_string(),
                actual: status.to_string(),
            }
            .into());
        }

        let request = InvokeRequest {
            function_name: function_name.to_string(),
            tenant_id: tenant_id.to_string(),
            payload: invocation.payload_json().to_string(),
        };

        info!(
            stack = %stack_id,
            tenant_id = %tenant_id,
            state = %state,
            function = %function_name,
            function_type = self.function.function_type(),
            physical_id = %physical_id,
            previous = ?last.as_ref().map(|r| r.physical_id.as_str()),
            "Invoking lifecycle function"
        );

        let start = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.function.invoke(&request)).await
        {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    tenant_id = %tenant_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Lifecycle invocation timed out"
                );
                Err(FunctionError::Timeout(self.timeout))
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(
                    tenant_id = %tenant_id,
                    state = %state,
                    physical_id = %physical_id,
                    error = %e,
                    "Lifecycle invocation failed"
                );
                return Err(e.into());
            }
        };

        let record = InvocationRecord {
            stack_id: stack_id.to_string(),
            resource: resource.to_string(),
            tenant_id: tenant_id.to_string(),
            tenant_state: state.as_str().to_string(),
            physical_id: physical_id.clone(),
            payload_hash: invocation.payload_hash_prefix().to_string(),
            applied_at: Utc::now(),
        };
        self.persistence
            .record_invocation(&record, state.resulting_status())
            .await?;

        info!(
            tenant_id = %tenant_id,
            state = %state,
            physical_id = %physical_id,
            duration_ms = duration_ms,
            "Lifecycle invocation applied"
        );

        Ok(InvokeOutcome::Invoked {
            physical_id,
            results: response.results,
            duration_ms,
        })
    }
}
