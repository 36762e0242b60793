// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! tenantplane deployer: applies tenant stacks.
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────────┐
//! │  onboardingRequest       │─────►│      DeploymentDriver        │
//! │  offboardingRequest      │      │                              │
//! └──────────────────────────┘      │  ExportStore   (imports)     │
//!                                   │  PriorityRegistry (blocks)   │
//!                                   │  TenantStackPlan  (rules)    │
//!                                   │  LifecycleInvoker            │
//!                                   └──────────────┬───────────────┘
//!                                                  │ once per physical id
//!                                                  ▼
//!                                   ┌──────────────────────────────┐
//!                                   │  LifecycleFunction           │
//!                                   │  (command / mock)            │
//!                                   └──────────────────────────────┘
//! ```
//!
//! ## Lifecycle functions
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`runner::CommandFunction`] | Runs a local executable, payload on stdin, response on stdout |
//! | [`runner::MockFunction`] | Records requests, answers with a configured behaviour |
//!
//! Every call is bounded by `TENANTPLANE_INVOKE_TIMEOUT_SECS` (10 minutes by
//! default). Failures are never retried.

#![deny(missing_docs)]

pub mod driver;
pub mod error;
pub mod events;
pub mod invoker;
pub mod runner;

pub use driver::{DeployReport, DeployRequest, DeploymentDriver, DestroyReport};
pub use error::DeployError;
pub use events::{ControlPlaneEvent, DetailType};
pub use invoker::{InvokeOutcome, LifecycleInvoker};
