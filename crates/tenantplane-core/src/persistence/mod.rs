// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and the SQLite backend for tenantplane.
//!
//! Four kinds of state survive between deployment runs: priority block
//! reservations, the ledger of applied lifecycle invocations, per-tenant
//! provisioning status and published cross-stack exports.

pub mod sqlite;

pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::TenantStatus;

/// A priority block held by one tenant stack on one listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ReservationRecord {
    /// Listener the block belongs to.
    pub listener: String,
    /// Tenant holding the block.
    pub tenant_id: String,
    /// Catalog name of the service whose rules use the block.
    pub service: String,
    /// Block base; rules use `priority_base + 1 ..= priority_base + block_size`.
    pub priority_base: i64,
    /// Number of priorities in the block.
    pub block_size: i64,
    /// When the block was reserved.
    pub reserved_at: DateTime<Utc>,
}

impl ReservationRecord {
    /// Lowest priority inside the block.
    pub fn first_priority(&self) -> i64 {
        self.priority_base + 1
    }

    /// Highest priority inside the block.
    pub fn last_priority(&self) -> i64 {
        self.priority_base + self.block_size
    }

    /// Whether this block shares any priority with `[base+1, base+size]`.
    pub fn overlaps(&self, base: i64, size: i64) -> bool {
        let first = base + 1;
        let last = base + size;
        first <= self.last_priority() && self.first_priority() <= last
    }

    /// Whether this record is the block identified by `key`.
    pub fn is_held_by(&self, key: &ReservationKey<'_>) -> bool {
        self.listener == key.listener
            && self.tenant_id == key.tenant_id
            && self.service == key.service
    }
}

/// Identity of a priority block: one per tenant stack and listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationKey<'a> {
    /// Listener the block belongs to.
    pub listener: &'a str,
    /// Tenant holding the block.
    pub tenant_id: &'a str,
    /// Service catalog name.
    pub service: &'a str,
}

/// What [`Persistence::reserve_block`] does once the listener is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Return the block the key already holds.
    Keep,
    /// Insert a new block at this base.
    Insert(i64),
}

/// Chooses a [`Placement`] from the key's current block and every other
/// block on the listener.
pub type PlacementFn<'a> = dyn Fn(
        Option<&ReservationRecord>,
        &[ReservationRecord],
    ) -> Result<Placement, CoreError>
    + Send
    + Sync
    + 'a;

/// Last successfully applied lifecycle invocation for a stack resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct InvocationRecord {
    /// Stack the invocation resource is declared in.
    pub stack_id: String,
    /// Logical resource name.
    pub resource: String,
    /// Tenant the invocation was for.
    pub tenant_id: String,
    /// Wire form of the transition (`PROVISION` / `DE-PROVISION`).
    pub tenant_state: String,
    /// Physical identifier that was applied.
    pub physical_id: String,
    /// Six-character payload hash prefix.
    pub payload_hash: String,
    /// When the backend call succeeded.
    pub applied_at: DateTime<Utc>,
}

/// Provisioning status of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TenantStatusRecord {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Stored status (see [`TenantStatus::from_stored`]).
    pub status: String,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl TenantStatusRecord {
    /// Parsed status.
    pub fn status(&self) -> TenantStatus {
        TenantStatus::from_stored(&self.status)
    }
}

/// A value published on the cross-stack export channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ExportRecord {
    /// Export name, unique across all stacks.
    pub name: String,
    /// Exported value.
    pub value: String,
    /// Stack that published the export.
    pub stack_name: String,
    /// When the export was first published.
    pub created_at: DateTime<Utc>,
}

/// Persistence interface shared by the registry, export store and invoker.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Reserve a block for `key` atomically.
    ///
    /// The listener's reservations are read and the new block is written in
    /// one write-locked transaction, so `place` sees a listener no other
    /// process can change before the insert commits. Returns the block and
    /// whether it was newly inserted.
    async fn reserve_block(
        &self,
        key: &ReservationKey<'_>,
        block_size: i64,
        place: &PlacementFn<'_>,
    ) -> Result<(ReservationRecord, bool), CoreError>;

    /// Reservation held by `key`, if any.
    async fn get_reservation(
        &self,
        key: &ReservationKey<'_>,
    ) -> Result<Option<ReservationRecord>, CoreError>;

    /// Reservations ordered by listener then base; all listeners when `None`.
    async fn list_reservations(
        &self,
        listener: Option<&str>,
    ) -> Result<Vec<ReservationRecord>, CoreError>;

    /// Drop a reservation. Returns whether one existed.
    async fn delete_reservation(&self, key: &ReservationKey<'_>) -> Result<bool, CoreError>;

    /// Last applied invocation for a stack resource.
    async fn last_invocation(
        &self,
        stack_id: &str,
        resource: &str,
    ) -> Result<Option<InvocationRecord>, CoreError>;

    /// Record a successful invocation and the tenant status it produced, in
    /// one transaction.
    async fn record_invocation(
        &self,
        record: &InvocationRecord,
        status: TenantStatus,
    ) -> Result<(), CoreError>;

    /// Forget every ledger entry of a stack. Returns how many were removed.
    async fn clear_invocations(&self, stack_id: &str) -> Result<u64, CoreError>;

    /// Provisioning status of a tenant, if ever recorded.
    async fn get_tenant_status(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantStatusRecord>, CoreError>;

    /// Publish or update an export owned by `stack_name`.
    async fn put_export(
        &self,
        name: &str,
        value: &str,
        stack_name: &str,
    ) -> Result<ExportRecord, CoreError>;

    /// Look up an export by name.
    async fn get_export(&self, name: &str) -> Result<Option<ExportRecord>, CoreError>;

    /// Exports ordered by name; only those of `stack_name` when given.
    async fn list_exports(&self, stack_name: Option<&str>) -> Result<Vec<ExportRecord>, CoreError>;

    /// Remove every export a stack published. Returns how many were removed.
    async fn delete_exports_for_stack(&self, stack_name: &str) -> Result<u64, CoreError>;
}
