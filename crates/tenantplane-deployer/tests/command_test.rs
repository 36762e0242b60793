// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the command-backed lifecycle function.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tenantplane_core::lifecycle::LifecycleInvocation;
use tenantplane_core::persistence::Persistence;
use tenantplane_core::TenantState;
use tenantplane_deployer::runner::{
    CommandFunction, FunctionError, InvokeRequest, LifecycleFunction, ResponseStatus,
};
use tenantplane_deployer::{DeployError, LifecycleInvoker};

fn sh(script: &str) -> CommandFunction {
    CommandFunction::new("sh", vec!["-c".to_string(), script.to_string()])
}

fn request() -> InvokeRequest {
    let invocation = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();
    InvokeRequest {
        function_name: common::RDS_FUNCTION.to_string(),
        tenant_id: "acme".to_string(),
        payload: invocation.payload_json().to_string(),
    }
}

#[tokio::test]
async fn test_payload_arrives_on_stdin() {
    let f = sh(r#"grep -q '"tenantId":"acme"' && echo '{"status":"OK","results":"Tenant Initialized"}'"#);
    let resp = f.invoke(&request()).await.unwrap();
    assert_eq!(resp.status, ResponseStatus::Ok);
    assert_eq!(resp.results.as_deref(), Some("Tenant Initialized"));
}

#[tokio::test]
async fn test_environment_is_passed() {
    let f = sh(
        r#"cat >/dev/null; printf '{"status":"OK","results":"%s/%s"}' "$TENANT_ID" "$TENANTPLANE_FUNCTION_NAME""#,
    );
    let resp = f.invoke(&request()).await.unwrap();
    assert_eq!(resp.results.as_deref(), Some("acme/TenantRDSInitializer"));
}

#[tokio::test]
async fn test_non_zero_exit() {
    let f = sh("echo 'psql: connection refused' >&2; exit 3");
    match f.invoke(&request()).await {
        Err(FunctionError::ExitCode { exit_code, stderr }) => {
            assert_eq!(exit_code, 3);
            assert_eq!(stderr, "psql: connection refused");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_error_body_is_returned_as_response() {
    let f = sh(r#"cat >/dev/null; echo '{"status":"ERROR","err":"x","message":"role exists"}'"#);
    let resp = f.invoke(&request()).await.unwrap();
    assert_eq!(resp.status, ResponseStatus::Error);
    assert!(matches!(resp.into_result(), Err(FunctionError::Backend(m)) if m == "role exists"));
}

#[tokio::test]
async fn test_invoker_times_out_slow_command() {
    let persistence = common::persistence().await;
    let invoker = LifecycleInvoker::new(
        persistence.clone(),
        Arc::new(sh("sleep 5")),
        Duration::from_millis(200),
        "$LATEST",
    );
    let invocation = LifecycleInvocation::for_tenant("acme", TenantState::Provision).unwrap();

    let start = Instant::now();
    let err = invoker
        .apply(
            "ProductReviewTenantProvisioningStack-acme",
            common::RDS_FUNCTION,
            &invocation,
        )
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(matches!(err, DeployError::Function(FunctionError::Timeout(_))));
    assert!(persistence.get_tenant_status("acme").await.unwrap().is_none());
}
