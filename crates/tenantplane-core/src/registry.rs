// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Central registry of listener priority blocks.
//!
//! Every tenant stack that declares rules on a listener first reserves a
//! block of `stride` priorities there, keyed by listener, tenant and service.
//! The block with base `b` covers `b + 1 ..= b + stride`, which is exactly
//! the span [`allocate_rules`](crate::routing::allocate_rules) uses for up to
//! `stride` routes. Automatic reservations take the lowest free base from
//! `floor, floor + stride, floor + 2 * stride, ...`; explicit bases are
//! checked against every other block on the listener. Either way, a
//! collision is reported before a single rule is declared.
//!
//! The scan and the insert run in one write-locked transaction
//! ([`Persistence::reserve_block`]), so separate processes sharing the state
//! file never hand out overlapping blocks.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::CoreError;
use crate::persistence::{Persistence, Placement, ReservationKey, ReservationRecord};
use crate::routing::MAX_RULE_PRIORITY;
use crate::stack::ServiceKind;

/// Allocates and records priority blocks per `(listener, tenant, service)`.
pub struct PriorityRegistry {
    persistence: Arc<dyn Persistence>,
    floor: u32,
    stride: u32,
}

impl PriorityRegistry {
    /// Registry handing out blocks of `stride` priorities starting at `floor`.
    pub fn new(persistence: Arc<dyn Persistence>, floor: u32, stride: u32) -> Self {
        Self {
            persistence,
            floor,
            stride: stride.max(1),
        }
    }

    /// Registry using the configured floor and stride.
    pub fn from_config(persistence: Arc<dyn Persistence>, config: &Config) -> Self {
        Self::new(persistence, config.priority_floor, config.priority_stride)
    }

    /// Block width.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Reserve the lowest free block for the tenant's `service` stack.
    ///
    /// Idempotent: a stack that already holds a block on the listener gets
    /// that block back.
    pub async fn reserve(
        &self,
        listener: &str,
        tenant_id: &str,
        service: ServiceKind,
    ) -> Result<ReservationRecord, CoreError> {
        self.check_fits(service)?;
        let key = key(listener, tenant_id, service);
        let (floor, stride) = (i64::from(self.floor), i64::from(self.stride));

        let (record, created) = self
            .persistence
            .reserve_block(&key, stride, &|held, taken| {
                if held.is_some() {
                    return Ok(Placement::Keep);
                }
                free_base(floor, stride, taken).map(Placement::Insert).ok_or_else(|| {
                    CoreError::PriorityExhausted {
                        listener: listener.to_string(),
                        tenant_id: tenant_id.to_string(),
                    }
                })
            })
            .await?;

        if created {
            info!(
                listener = %listener,
                tenant_id = %tenant_id,
                service = %service,
                priority_base = record.priority_base,
                block_size = record.block_size,
                "Reserved priority block"
            );
        } else {
            debug!(
                listener = %listener,
                tenant_id = %tenant_id,
                service = %service,
                priority_base = record.priority_base,
                "Reusing existing priority block"
            );
        }
        Ok(record)
    }

    /// Reserve the block starting at `priority_base` for the tenant's
    /// `service` stack.
    ///
    /// Re-reserving the same base is a no-op. A stack already holding a
    /// different base must release it first.
    pub async fn reserve_explicit(
        &self,
        listener: &str,
        tenant_id: &str,
        service: ServiceKind,
        priority_base: u32,
    ) -> Result<ReservationRecord, CoreError> {
        self.check_fits(service)?;
        let stride = i64::from(self.stride);
        let base = i64::from(priority_base);

        if base + stride > i64::from(MAX_RULE_PRIORITY) {
            return Err(CoreError::validation(
                "priority_base",
                format!(
                    "block {}..={} exceeds the listener ceiling {}",
                    base + 1,
                    base + stride,
                    MAX_RULE_PRIORITY
                ),
            ));
        }

        let key = key(listener, tenant_id, service);
        let (record, created) = self
            .persistence
            .reserve_block(&key, stride, &|held, taken| {
                if let Some(held) = held {
                    if held.priority_base == base {
                        return Ok(Placement::Keep);
                    }
                    return Err(CoreError::validation(
                        "priority_base",
                        format!(
                            "'{}' ({}) already holds base {} on listener '{}'",
                            tenant_id, service, held.priority_base, listener
                        ),
                    ));
                }
                if let Some(other) = taken.iter().find(|r| r.overlaps(base, stride)) {
                    let priority = (base + 1).max(other.first_priority());
                    return Err(CoreError::PriorityCollision {
                        tenant_id: tenant_id.to_string(),
                        holder: other.tenant_id.clone(),
                        priority: u32::try_from(priority).unwrap_or(u32::MAX),
                    });
                }
                Ok(Placement::Insert(base))
            })
            .await?;

        if created {
            info!(
                listener = %listener,
                tenant_id = %tenant_id,
                service = %service,
                priority_base = record.priority_base,
                "Reserved explicit priority block"
            );
        }
        Ok(record)
    }

    /// Base the next automatic reservation on `listener` would get.
    pub async fn next_free(&self, listener: &str) -> Result<u32, CoreError> {
        let taken = self.persistence.list_reservations(Some(listener)).await?;
        let base = free_base(i64::from(self.floor), i64::from(self.stride), &taken).ok_or_else(
            || CoreError::PriorityExhausted {
                listener: listener.to_string(),
                tenant_id: String::new(),
            },
        )?;
        Ok(u32::try_from(base).unwrap_or(u32::MAX))
    }

    /// Free the stack's block. Returns whether one was held.
    pub async fn release(
        &self,
        listener: &str,
        tenant_id: &str,
        service: ServiceKind,
    ) -> Result<bool, CoreError> {
        let released = self
            .persistence
            .delete_reservation(&key(listener, tenant_id, service))
            .await?;
        if released {
            info!(
                listener = %listener,
                tenant_id = %tenant_id,
                service = %service,
                "Released priority block"
            );
        }
        Ok(released)
    }

    /// Block currently held by the tenant's `service` stack.
    pub async fn lookup(
        &self,
        listener: &str,
        tenant_id: &str,
        service: ServiceKind,
    ) -> Result<Option<ReservationRecord>, CoreError> {
        self.persistence
            .get_reservation(&key(listener, tenant_id, service))
            .await
    }

    /// All blocks, optionally restricted to one listener.
    pub async fn list(&self, listener: Option<&str>) -> Result<Vec<ReservationRecord>, CoreError> {
        self.persistence.list_reservations(listener).await
    }

    fn check_fits(&self, service: ServiceKind) -> Result<(), CoreError> {
        let route_count = service.routes().len();
        if route_count > self.stride as usize {
            return Err(CoreError::validation(
                "route_count",
                format!(
                    "{} routes of {} do not fit a block of {} priorities",
                    route_count, service, self.stride
                ),
            ));
        }
        Ok(())
    }
}

fn key<'a>(listener: &'a str, tenant_id: &'a str, service: ServiceKind) -> ReservationKey<'a> {
    ReservationKey {
        listener,
        tenant_id,
        service: service.as_str(),
    }
}

/// Lowest stride-aligned base at or above `floor` whose block overlaps none
/// of `taken` and stays under the listener ceiling.
fn free_base(floor: i64, stride: i64, taken: &[ReservationRecord]) -> Option<i64> {
    let mut base = floor;
    while base + stride <= i64::from(MAX_RULE_PRIORITY) {
        if !taken.iter().any(|r| r.overlaps(base, stride)) {
            return Some(base);
        }
        base += stride;
    }
    None
}
