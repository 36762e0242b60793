// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Control-plane event contract.
//!
//! The control plane publishes `onboardingRequest` and `offboardingRequest`
//! events; the provisioning job reads a fixed set of detail fields as its
//! environment and answers with `provisionSuccess` / `deprovisionSuccess`
//! carrying `tenantStatus`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tenantplane_core::TenantState;

use crate::error::{DeployError, Result};

/// Source used on events this application plane emits.
pub const APPLICATION_PLANE_SOURCE: &str = "applicationPlaneEventSource";

/// Detail fields copied from an incoming event into the job environment.
pub const INCOMING_ENVIRONMENT: [&str; 6] = [
    "tenantId",
    "tenantName",
    "email",
    "tenantTier",
    "tenantStatus",
    "features",
];

/// Event detail types exchanged with the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetailType {
    /// A tenant was created.
    OnboardingRequest,
    /// A tenant was removed.
    OffboardingRequest,
    /// Tenant resources are deployed.
    ProvisionSuccess,
    /// Tenant resources are torn down.
    DeprovisionSuccess,
}

/// Tenant fields carried in an event detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDetail {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
    /// Tenant admin email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Pricing tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_tier: Option<String>,
    /// Status reported back to the control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_status: Option<String>,
    /// Free-form feature flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,
}

/// An event on the control-plane bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneEvent {
    /// Event kind.
    #[serde(rename = "detail-type")]
    pub detail_type: DetailType,
    /// Emitting component.
    pub source: String,
    /// Tenant fields.
    pub detail: TenantDetail,
}

impl ControlPlaneEvent {
    /// Parse and validate an event.
    pub fn parse(json: &str) -> Result<Self> {
        let event: Self = serde_json::from_str(json)?;
        if event.detail.tenant_id.trim().is_empty() {
            return Err(DeployError::InvalidEvent(
                "detail.tenantId must not be empty".to_string(),
            ));
        }
        Ok(event)
    }

    /// Lifecycle transition an incoming event asks for.
    pub fn requested_state(&self) -> Result<TenantState> {
        match self.detail_type {
            DetailType::OnboardingRequest => Ok(TenantState::Provision),
            DetailType::OffboardingRequest => Ok(TenantState::Deprovision),
            other => Err(DeployError::InvalidEvent(format!(
                "{other:?} is not a request event"
            ))),
        }
    }

    /// Job environment built from the incoming detail.
    ///
    /// String fields are passed verbatim, everything else as compact JSON.
    /// Absent fields are omitted.
    pub fn job_environment(&self) -> Result<BTreeMap<String, String>> {
        let detail = serde_json::to_value(&self.detail)?;
        let mut env = BTreeMap::new();
        for name in INCOMING_ENVIRONMENT {
            match detail.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => {
                    env.insert(name.to_string(), s.clone());
                }
                Some(other) => {
                    env.insert(name.to_string(), serde_json::to_string(other)?);
                }
            }
        }
        Ok(env)
    }

    /// Success reply for this request, carrying `tenant_status`.
    pub fn success_reply(&self, tenant_status: &str) -> Result<Self> {
        let detail_type = match self.requested_state()? {
            TenantState::Provision => DetailType::ProvisionSuccess,
            TenantState::Deprovision => DetailType::DeprovisionSuccess,
        };
        Ok(Self {
            detail_type,
            source: APPLICATION_PLANE_SOURCE.to_string(),
            detail: TenantDetail {
                tenant_id: self.detail.tenant_id.clone(),
                tenant_name: None,
                email: None,
                tenant_tier: None,
                tenant_status: Some(tenant_status.to_string()),
                features: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONBOARDING: &str = r#"{
        "detail-type": "onboardingRequest",
        "source": "controlPlaneEventSource",
        "detail": {
            "tenantId": "acme",
            "tenantName": "Acme Corp",
            "email": "ops@acme.test",
            "tenantTier": "basic",
            "features": {"media": true}
        }
    }"#;

    #[test]
    fn test_parse_onboarding() {
        let event = ControlPlaneEvent::parse(ONBOARDING).unwrap();
        assert_eq!(event.detail_type, DetailType::OnboardingRequest);
        assert_eq!(event.detail.tenant_id, "acme");
        assert_eq!(event.requested_state().unwrap(), TenantState::Provision);
    }

    #[test]
    fn test_job_environment() {
        let event = ControlPlaneEvent::parse(ONBOARDING).unwrap();
        let env = event.job_environment().unwrap();
        assert_eq!(env["tenantId"], "acme");
        assert_eq!(env["tenantTier"], "basic");
        assert_eq!(env["features"], r#"{"media":true}"#);
        assert!(!env.contains_key("tenantStatus"));
    }

    #[test]
    fn test_success_reply() {
        let event = ControlPlaneEvent::parse(ONBOARDING).unwrap();
        let reply = event.success_reply("provisioned").unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["detail-type"], "provisionSuccess");
        assert_eq!(json["source"], "applicationPlaneEventSource");
        assert_eq!(json["detail"]["tenantId"], "acme");
        assert_eq!(json["detail"]["tenantStatus"], "provisioned");
        assert!(json["detail"].get("email").is_none());
    }

    #[test]
    fn test_offboarding_reply() {
        let json = r#"{"detail-type":"offboardingRequest","source":"c","detail":{"tenantId":"acme"}}"#;
        let event = ControlPlaneEvent::parse(json).unwrap();
        assert_eq!(event.requested_state().unwrap(), TenantState::Deprovision);
        assert_eq!(
            event.success_reply("unprovisioned").unwrap().detail_type,
            DetailType::DeprovisionSuccess
        );
    }

    #[test]
    fn test_reply_events_are_not_requests() {
        let json = r#"{"detail-type":"provisionSuccess","source":"a","detail":{"tenantId":"acme"}}"#;
        let event = ControlPlaneEvent::parse(json).unwrap();
        assert!(matches!(
            event.requested_state(),
            Err(DeployError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_empty_tenant_rejected() {
        let json = r#"{"detail-type":"onboardingRequest","source":"c","detail":{"tenantId":" "}}"#;
        assert!(matches!(
            ControlPlaneEvent::parse(json),
            Err(DeployError::InvalidEvent(_))
        ));
        let json = r#"{"detail-type":"onboardingRequest","source":"c","detail":{}}"#;
        assert!(matches!(ControlPlaneEvent::parse(json), Err(DeployError::Json(_))));
    }
}
