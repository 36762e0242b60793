// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant deployment context and lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::routing::MAX_RULE_PRIORITY;

/// Per-deployment tenant parameters.
///
/// Built once per deployment run and never mutated. Construction validates
/// every field, so holding a `TenantContext` means the tenant id is non-empty
/// and the priority base leaves room below the listener ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    tenant_id: String,
    priority_base: u32,
}

impl TenantContext {
    /// Validate and build a context.
    pub fn new(tenant_id: impl Into<String>, priority_base: u32) -> Result<Self, ConfigError> {
        let tenant_id = validate_tenant_id(tenant_id.into())?;
        if priority_base >= MAX_RULE_PRIORITY {
            return Err(ConfigError::Invalid(
                "PRIORITY_BASE",
                "must be below the listener priority ceiling",
            ));
        }
        Ok(Self {
            tenant_id,
            priority_base,
        })
    }

    /// Tenant identifier.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Priority base of this tenant's rule block.
    pub fn priority_base(&self) -> u32 {
        self.priority_base
    }
}

/// Reject empty and whitespace-only tenant ids.
pub fn validate_tenant_id(tenant_id: String) -> Result<String, ConfigError> {
    if tenant_id.trim().is_empty() {
        return Err(ConfigError::Missing("TENANT_ID"));
    }
    if tenant_id.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(
            "TENANT_ID",
            "must not contain whitespace",
        ));
    }
    Ok(tenant_id)
}

/// Requested lifecycle transition sent to the backend function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenantState {
    /// Create the tenant's database user and schema grants.
    #[serde(rename = "PROVISION")]
    Provision,
    /// Revoke grants and drop the tenant's database user.
    #[serde(rename = "DE-PROVISION")]
    Deprovision,
}

impl TenantState {
    /// Wire form used in payloads and the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "PROVISION",
            Self::Deprovision => "DE-PROVISION",
        }
    }

    /// Whether this transition may start from `status`.
    ///
    /// PROVISION is accepted from either status: a provisioned tenant whose
    /// payload changed (a rotated secret, say) is provisioned again. DE-PROVISION
    /// needs a provisioned tenant.
    pub fn allowed_from(&self, status: TenantStatus) -> bool {
        match self {
            Self::Provision => true,
            Self::Deprovision => status == TenantStatus::Provisioned,
        }
    }

    /// Status after the transition succeeds.
    pub fn resulting_status(&self) -> TenantStatus {
        match self {
            Self::Provision => TenantStatus::Provisioned,
            Self::Deprovision => TenantStatus::Unprovisioned,
        }
    }
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROVISION" => Ok(Self::Provision),
            "DE-PROVISION" | "DEPROVISION" => Ok(Self::Deprovision),
            _ => Err(ConfigError::Invalid(
                "tenantState",
                "must be PROVISION or DE-PROVISION",
            )),
        }
    }
}

/// Provisioning status recorded per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// No successful PROVISION on record (or the last DE-PROVISION succeeded).
    Unprovisioned,
    /// The last successful transition was PROVISION.
    Provisioned,
}

impl TenantStatus {
    /// Stored form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprovisioned => "unprovisioned",
            Self::Provisioned => "provisioned",
        }
    }

    /// Parse the stored form. Unknown values read as unprovisioned.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "provisioned" => Self::Provisioned,
            _ => Self::Unprovisioned,
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new_valid() {
        let ctx = TenantContext::new("acme", 100).unwrap();
        assert_eq!(ctx.tenant_id(), "acme");
        assert_eq!(ctx.priority_base(), 100);
    }

    #[test]
    fn test_context_rejects_empty_tenant() {
        assert_eq!(
            TenantContext::new("", 100).unwrap_err(),
            ConfigError::Missing("TENANT_ID")
        );
        assert_eq!(
            TenantContext::new("   ", 100).unwrap_err(),
            ConfigError::Missing("TENANT_ID")
        );
    }

    #[test]
    fn test_context_rejects_whitespace_in_tenant() {
        assert!(matches!(
            TenantContext::new("ac me", 100),
            Err(ConfigError::Invalid("TENANT_ID", _))
        ));
    }

    #[test]
    fn test_context_rejects_base_at_ceiling() {
        assert!(matches!(
            TenantContext::new("acme", MAX_RULE_PRIORITY),
            Err(ConfigError::Invalid("PRIORITY_BASE", _))
        ));
    }

    #[test]
    fn test_tenant_state_wire_form() {
        assert_eq!(
            serde_json::to_string(&TenantState::Provision).unwrap(),
            "\"PROVISION\""
        );
        assert_eq!(
            serde_json::to_string(&TenantState::Deprovision).unwrap(),
            "\"DE-PROVISION\""
        );
        assert_eq!(
            "de-provision".parse::<TenantState>().unwrap(),
            TenantState::Deprovision
        );
        assert!("RESUME".parse::<TenantState>().is_err());
    }

    #[test]
    fn test_state_machine_edges() {
        assert!(TenantState::Provision.allowed_from(TenantStatus::Unprovisioned));
        assert!(TenantState::Provision.allowed_from(TenantStatus::Provisioned));
        assert_eq!(
            TenantState::Provision.resulting_status(),
            TenantStatus::Provisioned
        );
        assert!(TenantState::Deprovision.allowed_from(TenantStatus::Provisioned));
        assert!(!TenantState::Deprovision.allowed_from(TenantStatus::Unprovisioned));
        assert_eq!(
            TenantState::Deprovision.resulting_status(),
            TenantStatus::Unprovisioned
        );
    }

    #[test]
    fn test_status_round_trip_through_storage() {
        for status in [TenantStatus::Provisioned, TenantStatus::Unprovisioned] {
            assert_eq!(TenantStatus::from_stored(status.as_str()), status);
        }
        assert_eq!(TenantStatus::from_stored("garbage"), TenantStatus::Unprovisioned);
    }
}
