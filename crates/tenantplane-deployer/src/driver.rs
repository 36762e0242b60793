// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant deployment driver.
//!
//! `deploy` runs, in order and stopping at the first failure:
//!
//! 1. resolve the service's cross-stack imports
//! 2. reserve (or confirm) the tenant's priority block on the listener
//! 3. build the stack plan and check its rules against the listener
//! 4. apply the PROVISION invocation, if the service has one
//!
//! A block reserved by a failed deploy is released again; a block the tenant
//! already held is kept.
//!
//! Blocks are held per `(listener, tenant, service)`, so one tenant's media
//! and review stacks sharing a listener get separate blocks.
//!
//! `destroy` applies DE-PROVISION, releases the block, forgets the stack's
//! invocation ledger and withdraws the stack's exports. A tenant that was
//! never provisioned (onboarding failed before PROVISION succeeded) has
//! nothing to de-provision, so the call is skipped and teardown continues.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use tenantplane_core::lifecycle::{LifecycleInvocation, PROVISIONING_RESOURCE};
use tenantplane_core::model::{TenantStatus, validate_tenant_id};
use tenantplane_core::persistence::{Persistence, ReservationRecord};
use tenantplane_core::routing::{ListenerRuleTable, allocate_rules};
use tenantplane_core::{
    Config, ExportStore, PriorityRegistry, ServiceKind, TenantContext, TenantStackPlan, TenantState,
};

use crate::error::Result;
use crate::events::ControlPlaneEvent;
use crate::invoker::{InvokeOutcome, LifecycleInvoker};
use crate::runner::LifecycleFunction;

/// What to deploy.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Service to deploy for the tenant.
    pub service: ServiceKind,
    /// Tenant identifier.
    pub tenant_id: String,
    /// Explicit block base; reserved from the registry when `None`.
    pub priority_base: Option<u32>,
}

/// Result of a successful deploy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    /// Everything the stack declares.
    pub plan: TenantStackPlan,
    /// Whether the PROVISION call was made (`None` when the service has none).
    pub provision_invoked: Option<bool>,
}

/// Result of a successful destroy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyReport {
    /// Stack that was destroyed.
    pub stack_name: String,
    /// Whether the DE-PROVISION call was made (`None` when the service has
    /// none, `Some(false)` when the tenant was never provisioned).
    pub deprovision_invoked: Option<bool>,
    /// Whether a priority block was released.
    pub released: bool,
    /// Number of exports withdrawn.
    pub exports_removed: u64,
}

/// Deploys and destroys tenant stacks.
pub struct DeploymentDriver {
    persistence: Arc<dyn Persistence>,
    registry: PriorityRegistry,
    exports: ExportStore,
    invoker: LifecycleInvoker,
}

impl DeploymentDriver {
    /// Driver over `persistence`, calling `function` for lifecycle events.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        function: Arc<dyn LifecycleFunction>,
        config: &Config,
    ) -> Self {
        Self {
            registry: PriorityRegistry::from_config(persistence.clone(), config),
            exports: ExportStore::new(persistence.clone()),
            invoker: LifecycleInvoker::from_config(persistence.clone(), function, config),
            persistence,
        }
    }

    /// Priority registry used by this driver.
    pub fn registry(&self) -> &PriorityRegistry {
        &self.registry
    }

    /// Export store used by this driver.
    pub fn exports(&self) -> &ExportStore {
        &self.exports
    }

    /// Compute the plan without reserving or invoking anything.
    ///
    /// Uses `priority_base`, else the tenant's existing block, else the block
    /// a reservation would hand out now.
    pub async fn plan(&self, request: &DeployRequest) -> Result<TenantStackPlan> {
        let tenant_id = validate_tenant_id(request.tenant_id.clone())?;
        let imports = self.exports.import_all(request.service.imports()).await?;
        let listener = &imports[request.service.listener_import()];

        let base = match request.priority_base {
            Some(base) => base,
            None => match self
                .registry
                .lookup(listener, &tenant_id, request.service)
                .await?
            {
                Some(existing) => block_base(&existing)?,
                None => self.registry.next_free(listener).await?,
            },
        };

        let context = TenantContext::new(tenant_id, base)?;
        Ok(TenantStackPlan::build(
            request.service,
            &context,
            imports,
            self.invoker.function_version(),
        )?)
    }

    /// Deploy one tenant stack.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployReport> {
        let tenant_id = validate_tenant_id(request.tenant_id.clone())?;
        let service = request.service;

        let imports = self.exports.import_all(service.imports()).await?;
        let listener = imports[service.listener_import()].clone();

        let held_before = self
            .registry
            .lookup(&listener, &tenant_id, service)
            .await?
            .is_some();
        let reservation = match request.priority_base {
            Some(base) => {
                self.registry
                    .reserve_explicit(&listener, &tenant_id, service, base)
                    .await?
            }
            None => self.registry.reserve(&listener, &tenant_id, service).await?,
        };

        let result = self
            .apply_stack(service, &tenant_id, &listener, &reservation, imports)
            .await;

        if result.is_err() && !held_before {
            warn!(
                tenant_id = %tenant_id,
                listener = %listener,
                "Deploy failed, releasing new priority block"
            );
            if let Err(e) = self.registry.release(&listener, &tenant_id, service).await {
                warn!(tenant_id = %tenant_id, error = %e, "Failed to release priority block");
            }
        }
        result
    }

    async fn apply_stack(
        &self,
        service: ServiceKind,
        tenant_id: &str,
        listener: &str,
        reservation: &ReservationRecord,
        imports: BTreeMap<String, String>,
    ) -> Result<DeployReport> {
        let context = TenantContext::new(tenant_id, block_base(reservation)?)?;
        let plan = TenantStackPlan::build(
            service,
            &context,
            imports,
            self.invoker.function_version(),
        )?;

        self.check_listener(service, listener, &plan).await?;

        let provision_invoked = match &plan.provision {
            Some(planned) => {
                let invocation = LifecycleInvocation::for_tenant(tenant_id, TenantState::Provision)?;
                let outcome = self
                    .invoker
                    .apply(&plan.stack_name, &planned.function_name, &invocation)
                    .await?;
                Some(outcome.was_invoked())
            }
            None => None,
        };

        info!(
            stack = %plan.stack_name,
            tenant_id = %tenant_id,
            priority_base = plan.priority_base,
            rules = plan.rules.len(),
            "Tenant stack deployed"
        );

        Ok(DeployReport {
            plan,
            provision_invoked,
        })
    }

    /// Rebuild the listener's rules from its reservations, each with its own
    /// service's routes, and attach the plan's rules on top, rejecting any
    /// duplicate priority.
    async fn check_listener(
        &self,
        service: ServiceKind,
        listener: &str,
        plan: &TenantStackPlan,
    ) -> Result<()> {
        let mut table = ListenerRuleTable::new();

        for other in self.registry.list(Some(listener)).await? {
            if other.tenant_id == plan.tenant_id && other.service == service.as_str() {
                continue;
            }
            let other_service: ServiceKind = other.service.parse()?;
            let rules = allocate_rules(
                block_base(&other)?,
                &other.tenant_id,
                &other_service.target_group(&other.tenant_id),
                &other_service.routes(),
            )?;
            table.attach(&other.tenant_id, &rules)?;
        }

        table.attach(&plan.tenant_id, &plan.rules)?;
        Ok(())
    }

    /// Destroy one tenant stack.
    pub async fn destroy(&self, service: ServiceKind, tenant_id: &str) -> Result<DestroyReport> {
        let tenant_id = validate_tenant_id(tenant_id.to_string())?;
        let stack_name = service.stack_name(&tenant_id);
        let listener = self.exports.import(service.listener_import()).await?;

        let provisioned = self.was_provisioned(&stack_name, &tenant_id).await?;
        let deprovision_invoked = match service.lifecycle_function_import() {
            Some(_) if !provisioned => {
                info!(
                    stack = %stack_name,
                    tenant_id = %tenant_id,
                    "Tenant was never provisioned, skipping DE-PROVISION"
                );
                Some(false)
            }
            Some(import) => {
                let function_name = self.exports.import(import).await?;
                let invocation =
                    LifecycleInvocation::for_tenant(&tenant_id, TenantState::Deprovision)?;
                let outcome: InvokeOutcome = self
                    .invoker
                    .apply(&stack_name, &function_name, &invocation)
                    .await?;
                Some(outcome.was_invoked())
            }
            None => None,
        };

        let released = self.registry.release(&listener, &tenant_id, service).await?;
        self.persistence.clear_invocations(&stack_name).await?;
        let exports_removed = self.exports.remove_stack(&stack_name).await?;

        info!(
            stack = %stack_name,
            tenant_id = %tenant_id,
            released = released,
            "Tenant stack destroyed"
        );

        Ok(DestroyReport {
            stack_name,
            deprovision_invoked,
            released,
            exports_removed,
        })
    }

    /// A tenant counts as provisioned when its status says so or the stack's
    /// ledger still holds a PROVISION call.
    async fn was_provisioned(&self, stack_name: &str, tenant_id: &str) -> Result<bool> {
        if self.invoker.tenant_status(tenant_id).await? == TenantStatus::Provisioned {
            return Ok(true);
        }
        Ok(self
            .persistence
            .last_invocation(stack_name, PROVISIONING_RESOURCE)
            .await?
            .is_some())
    }

    /// Handle an onboarding or offboarding request for `services`, returning
    /// the success reply to publish.
    pub async fn handle_event(
        &self,
        event: &ControlPlaneEvent,
        services: &[ServiceKind],
    ) -> Result<ControlPlaneEvent> {
        let tenant_id = &event.detail.tenant_id;
        let state = event.requested_state()?;

        for service in services {
            match state {
                TenantState::Provision => {
                    self.deploy(&DeployRequest {
                        service: *service,
                        tenant_id: tenant_id.clone(),
                        priority_base: None,
                    })
                    .await?;
                }
                TenantState::Deprovision => {
                    self.destroy(*service, tenant_id).await?;
                }
            }
        }

        event.success_reply(state.resulting_status().as_str())
    }
}

fn block_base(record: &ReservationRecord) -> Result<u32> {
    u32::try_from(record.priority_base).map_err(|_| {
        tenantplane_core::CoreError::DatabaseError {
            operation: "read_reservation".to_string(),
            details: format!("stored priority base {} out of range", record.priority_base),
        }
        .into()
    })
}
