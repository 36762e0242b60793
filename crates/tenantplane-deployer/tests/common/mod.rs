// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for deployer integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tenantplane_core::{Config, ExportStore, SqlitePersistence};

pub const MEDIA_LISTENER: &str = "arn:aws:elasticloadbalancing:listener/app/media/1";
pub const REVIEW_LISTENER: &str = "arn:aws:elasticloadbalancing:listener/app/review/2";
pub const RDS_FUNCTION: &str = "TenantRDSInitializer";

/// Fresh in-memory store.
pub async fn persistence() -> Arc<SqlitePersistence> {
    Arc::new(
        SqlitePersistence::in_memory()
            .await
            .expect("Failed to create in-memory persistence"),
    )
}

/// Store with every shared-stack export a tenant stack imports.
pub async fn seeded_persistence() -> Arc<SqlitePersistence> {
    seeded_with_listeners(MEDIA_LISTENER, REVIEW_LISTENER).await
}

/// Seeded store whose services attach to the given listeners.
pub async fn seeded_with_listeners(
    media_listener: &str,
    review_listener: &str,
) -> Arc<SqlitePersistence> {
    let persistence = persistence().await;
    let exports = ExportStore::new(persistence.clone());

    for (name, value) in [
        ("ApplicationPlaneVpcId", "vpc-0a1b2c"),
        ("ApplicationPlaneClusterName", "app-plane-cluster"),
        ("ApplicationPlaneListenerArn", media_listener),
        ("ProductMediaServiceS3Bucket", "product-media-bucket"),
    ] {
        exports
            .publish("ApplicationPlaneStack", name, value)
            .await
            .expect("Failed to publish export");
    }

    for (name, value) in [
        ("RDSClusterHost", "reviews.cluster.internal"),
        ("RDSClusterPort", "5432"),
        ("TenantRDSInitializerLambdaName", RDS_FUNCTION),
        ("ProductReviewListenerArn", review_listener),
    ] {
        exports
            .publish("ProductReviewApplicationPlaneStack", name, value)
            .await
            .expect("Failed to publish export");
    }

    persistence
}

/// Defaults with a short invocation bound.
pub fn config() -> Config {
    Config {
        invoke_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}
