// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle invocation fingerprints.
//!
//! A [`LifecycleInvocation`] is the payload sent to the tenant database
//! provisioning function. Its physical identifier embeds the first six hex
//! characters of the MD5 digest of the compact JSON payload. An identifier
//! equal to the last applied one means the call is skipped; any change to the
//! tenant id, state or secret name produces a new identifier and a new call.
//!
//! The digest is a change detector only, never a security boundary.

use md5::{Digest, Md5};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::TenantState;

/// Number of hex characters of the digest kept in the physical id.
pub const HASH_PREFIX_LEN: usize = 6;

/// Logical resource carrying PROVISION calls.
pub const PROVISIONING_RESOURCE: &str = "AwsProvisioningCustomResource";

/// Logical resource carrying DE-PROVISION calls.
pub const DEPROVISIONING_RESOURCE: &str = "AwsDeprovisioningCustomResource";

/// Conventional credential-store secret name for a tenant.
pub fn tenant_secret_name(tenant_id: &str) -> String {
    format!("{tenant_id}Credentials")
}

/// Wire payload. Field order here is the canonical serialization order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecyclePayload<'a> {
    tenant_state: TenantState,
    tenant_id: &'a str,
    tenant_secret_name: &'a str,
}

/// One provisioning or deprovisioning request for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleInvocation {
    tenant_id: String,
    state: TenantState,
    secret_name: String,
    payload: String,
    hash_prefix: String,
}

impl LifecycleInvocation {
    /// Build an invocation, computing its payload and hash prefix up front.
    ///
    /// Fails fast on an empty tenant id or secret name.
    pub fn new(
        tenant_id: impl Into<String>,
        state: TenantState,
        secret_name: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let tenant_id = tenant_id.into();
        let secret_name = secret_name.into();

        if tenant_id.trim().is_empty() {
            return Err(CoreError::validation("tenantId", "must not be empty"));
        }
        if secret_name.trim().is_empty() {
            return Err(CoreError::validation("tenantSecretName", "must not be empty"));
        }

        let payload = serde_json::to_string(&LifecyclePayload {
            tenant_state: state,
            tenant_id: &tenant_id,
            tenant_secret_name: &secret_name,
        })?;
        let hash_prefix = hash_prefix(&payload);

        Ok(Self {
            tenant_id,
            state,
            secret_name,
            payload,
            hash_prefix,
        })
    }

    /// Invocation using the tenant's conventional secret name.
    pub fn for_tenant(tenant_id: &str, state: TenantState) -> Result<Self, CoreError> {
        Self::new(tenant_id, state, tenant_secret_name(tenant_id))
    }

    /// Tenant identifier.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Requested transition.
    pub fn state(&self) -> TenantState {
        self.state
    }

    /// Credential-store secret name.
    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Compact JSON payload sent to the backend function.
    pub fn payload_json(&self) -> &str {
        &self.payload
    }

    /// First six hex characters of the payload's MD5 digest.
    pub fn payload_hash_prefix(&self) -> &str {
        &self.hash_prefix
    }

    /// Logical resource this transition is declared under.
    pub fn resource_name(&self) -> &'static str {
        match self.state {
            TenantState::Provision => PROVISIONING_RESOURCE,
            TenantState::Deprovision => DEPROVISIONING_RESOURCE,
        }
    }

    /// Physical identifier: `{stack_id}-AwsSdkCall-{function_version}{hash}`.
    pub fn physical_id(&self, stack_id: &str, function_version: &str) -> String {
        format!(
            "{stack_id}-AwsSdkCall-{function_version}{}",
            self.hash_prefix
        )
    }
}

fn hash_prefix(payload: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(payload.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
        .chars()
        .take(HASH_PREFIX_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_canonical_form() {
        let inv = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();
        assert_eq!(
            inv.payload_json(),
            r#"{"tenantState":"PROVISION","tenantId":"acme","tenantSecretName":"acmeCredentials"}"#
        );
    }

    #[test]
    fn test_known_hash_prefixes() {
        let cases = [
            ("acme", TenantState::Provision, "acmeCredentials", "9b9cb3"),
            ("acme", TenantState::Deprovision, "acmeCredentials", "3460f1"),
            ("globex", TenantState::Provision, "globexCredentials", "ac83d2"),
            ("acme", TenantState::Provision, "acmeRotated", "cdff13"),
        ];
        for (tenant, state, secret, expected) in cases {
            let inv = LifecycleInvocation::new(tenant, state, secret).unwrap();
            assert_eq!(inv.payload_hash_prefix(), expected, "{}", inv.payload_json());
        }
    }

    #[test]
    fn test_full_digest_vector() {
        let payload =
            r#"{"tenantState":"PROVISION","tenantId":"acme","tenantSecretName":"acmeCredentials"}"#;
        let mut hasher = Md5::new();
        hasher.update(payload.as_bytes());
        let hex: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(hex, "9b9cb318a012dd956cdb3e19a355ba81");
    }

    #[test]
    fn test_physical_id() {
        let inv = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();
        assert_eq!(
            inv.physical_id("ProductReviewTenantProvisioningStack-acme", "$LATEST"),
            "ProductReviewTenantProvisioningStack-acme-AwsSdkCall-$LATEST9b9cb3"
        );
    }

    #[test]
    fn test_identical_inputs_identical_ids() {
        let a = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();
        let b = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.physical_id("s", "1"), b.physical_id("s", "1"));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let err = LifecycleInvocation::new("", TenantState::Provision, "x").unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { ref field, .. } if field == "tenantId"));

        let err = LifecycleInvocation::new("acme", TenantState::Provision, " ").unwrap_err();
        assert!(
            matches!(err, CoreError::ValidationError { ref field, .. } if field == "tenantSecretName")
        );
    }

    #[test]
    fn test_resource_names() {
        let p = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();
        let d = LifecycleInvocation::for_tenant("acme", TenantState::Deprovision).unwrap();
        assert_eq!(p.resource_name(), "AwsProvisioningCustomResource");
        assert_eq!(d.resource_name(), "AwsDeprovisioningCustomResource");
        assert_eq!(tenant_secret_name("acme"), "acmeCredentials");
    }

    #[test]
    fn test_payload_escapes_special_characters() {
        let inv = LifecycleInvocation::new("a\"b", TenantState::Provision, "s").unwrap();
        assert_eq!(
            inv.payload_json(),
            r#"{"tenantState":"PROVISION","tenantId":"a\"b","tenantSecretName":"s"}"#
        );
        assert_eq!(inv.payload_hash_prefix().len(), HASH_PREFIX_LEN);
    }
}
