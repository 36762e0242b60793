// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! tenantplane core: tenant routing and lifecycle fingerprints.
//!
//! Tenants of one application-plane service share a load balancer listener.
//! This crate decides which listener rules each tenant gets, and which
//! provisioning calls a deployment must make.
//!
//! # Listener rules
//!
//! ```text
//!   priority_base = 100 (tenant "acme")
//!
//!   101  /productmedia, /productmedia/*  + header tenantId=acme  -> acme
//!   102  /health                                                -> acme
//!   103  /                                                      -> acme
//! ```
//!
//! [`routing::allocate_rules`] is pure. Tenants are kept apart by the
//! [`registry::PriorityRegistry`], which hands every
//! `(listener, tenant, service)` a block of priorities and rejects
//! overlapping explicit bases.
//!
//! # Lifecycle invocations
//!
//! [`lifecycle::LifecycleInvocation`] serializes
//! `{"tenantState":..,"tenantId":..,"tenantSecretName":..}` and keeps the
//! first six hex characters of its MD5 digest. The digest ends up in the
//! physical id `{stack}-AwsSdkCall-{version}{hash}`: the same input yields
//! the same id and no new call.
//!
//! # State
//!
//! | Table | Contents |
//! |-------|----------|
//! | `priority_reservations` | one block per `(listener, tenant, service)` |
//! | `lifecycle_invocations` | last applied physical id per stack resource |
//! | `tenant_status` | provisioned / unprovisioned |
//! | `stack_exports` | cross-stack export namespace |

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod exports;
pub mod lifecycle;
pub mod migrations;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod routing;
pub mod stack;

pub use config::{Config, ConfigError};
pub use error::CoreError;
pub use exports::ExportStore;
pub use lifecycle::LifecycleInvocation;
pub use model::{TenantContext, TenantState, TenantStatus};
pub use persistence::{Persistence, SqlitePersistence};
pub use registry::PriorityRegistry;
pub use routing::{ListenerRule, ListenerRuleTable, RouteSpec, allocate_rules};
pub use stack::{ServiceKind, TenantStackPlan};
