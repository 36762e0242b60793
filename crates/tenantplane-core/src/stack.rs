// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-tenant service stacks.
//!
//! The service catalog fixes, per application-plane service, the ordered
//! routes, the exports a tenant stack imports and the stack naming. A
//! [`TenantStackPlan`] combines the catalog entry with a [`TenantContext`]
//! and resolved imports into everything a deployment will declare.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;
use crate::lifecycle::LifecycleInvocation;
use crate::model::{TenantContext, TenantState};
use crate::routing::{ListenerRule, RouteSpec, TENANT_HEADER, allocate_rules};

/// Tag key carrying the tenant id.
pub const TENANT_TAG: &str = "TenantId";

/// Tag key naming the application-plane service.
pub const APP_PLANE_TAG: &str = "saas-app-plane";

/// Application-plane services that get one stack per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Media upload service behind a tenant-header route.
    ProductMedia,
    /// Review service with a per-tenant database user.
    ProductReview,
}

impl ServiceKind {
    /// All catalogued services.
    pub const ALL: [ServiceKind; 2] = [ServiceKind::ProductMedia, ServiceKind::ProductReview];

    /// Catalog name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductMedia => "product-media",
            Self::ProductReview => "product-review",
        }
    }

    /// Ordered routes, most specific first.
    pub fn routes(&self) -> Vec<RouteSpec> {
        match self {
            Self::ProductMedia => vec![
                RouteSpec::prefix("ListenerRuleUpload", "/productmedia")
                    .with_tenant_header(TENANT_HEADER),
                RouteSpec::exact("ListenerRuleSvcHealth", "/health"),
                RouteSpec::exact("ListenerRuleDefault", "/"),
            ],
            Self::ProductReview => vec![
                RouteSpec::prefix("ListenerRuleReview", "/productreview"),
                RouteSpec::exact("ListenerRuleSvcHealth", "/health"),
                RouteSpec::exact("ListenerRuleDefault", "/"),
            ],
        }
    }

    /// Exports a tenant stack of this service needs.
    pub fn imports(&self) -> &'static [&'static str] {
        match self {
            Self::ProductMedia => &[
                "ApplicationPlaneVpcId",
                "ApplicationPlaneClusterName",
                "ApplicationPlaneListenerArn",
                "ProductMediaServiceS3Bucket",
            ],
            Self::ProductReview => &[
                "RDSClusterHost",
                "RDSClusterPort",
                "TenantRDSInitializerLambdaName",
                "ProductReviewListenerArn",
            ],
        }
    }

    /// Import holding the listener the rules attach to.
    pub fn listener_import(&self) -> &'static str {
        match self {
            Self::ProductMedia => "ApplicationPlaneListenerArn",
            Self::ProductReview => "ProductReviewListenerArn",
        }
    }

    /// Import naming the tenant lifecycle function, for services that have one.
    pub fn lifecycle_function_import(&self) -> Option<&'static str> {
        match self {
            Self::ProductMedia => None,
            Self::ProductReview => Some("TenantRDSInitializerLambdaName"),
        }
    }

    /// Stack name for a tenant.
    pub fn stack_name(&self, tenant_id: &str) -> String {
        match self {
            Self::ProductMedia => format!("ProductMediaTenantStack-{tenant_id}"),
            Self::ProductReview => format!("ProductReviewTenantProvisioningStack-{tenant_id}"),
        }
    }

    /// Target group the tenant's rules forward to.
    pub fn target_group(&self, tenant_id: &str) -> String {
        format!("{}-TargetGroup", self.stack_name(tenant_id))
    }

    /// Tags applied to every resource of a tenant stack.
    pub fn tags(&self, tenant_id: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (TENANT_TAG.to_string(), tenant_id.to_string()),
            (APP_PLANE_TAG.to_string(), self.as_str().to_string()),
        ])
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product-media" | "productmedia" => Ok(Self::ProductMedia),
            "product-review" | "productreview" => Ok(Self::ProductReview),
            other => Err(CoreError::validation(
                "service",
                format!("unknown service '{other}' (expected product-media or product-review)"),
            )),
        }
    }
}

/// A lifecycle call a plan will make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedInvocation {
    /// Logical resource name.
    pub resource: String,
    /// Backend function name.
    pub function_name: String,
    /// Physical identifier of the call.
    pub physical_id: String,
    /// Exact payload.
    pub payload: String,
}

/// Everything one tenant stack declares, computed before anything is applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStackPlan {
    /// Stack name.
    pub stack_name: String,
    /// Service the stack deploys.
    pub service: ServiceKind,
    /// Tenant identifier.
    pub tenant_id: String,
    /// Base of the tenant's rule block.
    pub priority_base: u32,
    /// Listener the rules attach to.
    pub listener: String,
    /// Resource tags.
    pub tags: BTreeMap<String, String>,
    /// Resolved imports.
    pub imports: BTreeMap<String, String>,
    /// Container environment.
    pub environment: BTreeMap<String, String>,
    /// Listener rules in priority order.
    pub rules: Vec<ListenerRule>,
    /// Provisioning call, if the service has a lifecycle function.
    pub provision: Option<PlannedInvocation>,
}

impl TenantStackPlan {
    /// Build the plan.
    ///
    /// `imports` must hold every name in [`ServiceKind::imports`]; a missing
    /// one fails with [`CoreError::ExportNotFound`].
    pub fn build(
        service: ServiceKind,
        context: &TenantContext,
        imports: BTreeMap<String, String>,
        function_version: &str,
    ) -> Result<Self, CoreError> {
        for name in service.imports() {
            if !imports.contains_key(*name) {
                return Err(CoreError::ExportNotFound {
                    name: (*name).to_string(),
                });
            }
        }

        let tenant_id = context.tenant_id();
        let stack_name = service.stack_name(tenant_id);
        let listener = imports[service.listener_import()].clone();
        let target = service.target_group(tenant_id);
        let rules = allocate_rules(
            context.priority_base(),
            tenant_id,
            &target,
            &service.routes(),
        )?;

        let environment = BTreeMap::from([
            ("TENANT_ID".to_string(), tenant_id.to_string()),
            (
                "PRIORITY_BASE".to_string(),
                context.priority_base().to_string(),
            ),
        ]);

        let provision = match service.lifecycle_function_import() {
            Some(import) => {
                let invocation = LifecycleInvocation::for_tenant(tenant_id, TenantState::Provision)?;
                Some(PlannedInvocation {
                    resource: invocation.resource_name().to_string(),
                    function_name: imports[import].clone(),
                    physical_id: invocation.physical_id(&stack_name, function_version),
                    payload: invocation.payload_json().to_string(),
                })
            }
            None => None,
        };

        Ok(Self {
            tags: service.tags(tenant_id),
            stack_name,
            service,
            tenant_id: tenant_id.to_string(),
            priority_base: context.priority_base(),
            listener,
            imports,
            environment,
            rules,
            provision,
        })
    }
}
