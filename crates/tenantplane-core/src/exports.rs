// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cross-stack export channel.
//!
//! A flat, string-keyed namespace. Stacks publish named values; tenant stacks
//! import them by name at deployment time. A missing name is a hard failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::CoreError;
use crate::persistence::{ExportRecord, Persistence};

/// Publish and resolve cross-stack exports.
#[derive(Clone)]
pub struct ExportStore {
    persistence: Arc<dyn Persistence>,
}

impl ExportStore {
    /// Store backed by `persistence`.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    /// Publish `name = value` on behalf of `stack_name`.
    pub async fn publish(
        &self,
        stack_name: &str,
        name: &str,
        value: &str,
    ) -> Result<ExportRecord, CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::validation("name", "export name must not be empty"));
        }
        let record = self.persistence.put_export(name, value, stack_name).await?;
        info!(stack = %stack_name, export = %name, "Published export");
        Ok(record)
    }

    /// Resolve one export.
    pub async fn import(&self, name: &str) -> Result<String, CoreError> {
        match self.persistence.get_export(name).await? {
            Some(record) => Ok(record.value),
            None => {
                warn!(export = %name, "Import of unknown export");
                Err(CoreError::ExportNotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Resolve every name, failing on the first one that is missing.
    pub async fn import_all(&self, names: &[&str]) -> Result<BTreeMap<String, String>, CoreError> {
        let mut resolved = BTreeMap::new();
        for name in names {
            let value = self.import(name).await?;
            resolved.insert((*name).to_string(), value);
        }
        Ok(resolved)
    }

    /// Published exports, optionally only those of one stack.
    pub async fn list(&self, stack_name: Option<&str>) -> Result<Vec<ExportRecord>, CoreError> {
        self.persistence.list_exports(stack_name).await
    }

    /// Withdraw every export of a stack.
    pub async fn remove_stack(&self, stack_name: &str) -> Result<u64, CoreError> {
        let removed = self.persistence.delete_exports_for_stack(stack_name).await?;
        if removed > 0 {
            info!(stack = %stack_name, removed, "Withdrew stack exports");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqlitePersistence;

    async fn store() -> ExportStore {
        ExportStore::new(Arc::new(SqlitePersistence::in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_import_all_resolves_in_order() {
        let store = store().await;
        store.publish("ProductReviewStack", "RDSClusterHost", "db.internal").await.unwrap();
        store.publish("ProductReviewStack", "RDSClusterPort", "5432").await.unwrap();

        let values = store
            .import_all(&["RDSClusterHost", "RDSClusterPort"])
            .await
            .unwrap();
        assert_eq!(values["RDSClusterHost"], "db.internal");
        assert_eq!(values["RDSClusterPort"], "5432");
    }

    #[tokio::test]
    async fn test_missing_import_is_fatal() {
        let store = store().await;
        store.publish("ProductReviewStack", "RDSClusterHost", "db").await.unwrap();

        let err = store
            .import_all(&["RDSClusterHost", "TenantRDSInitializerLambdaName"])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ExportNotFound { ref name } if name == "TenantRDSInitializerLambdaName"
        ));
    }

    #[tokio::test]
    async fn test_renamed_export_is_not_found() {
        let store = store().await;
        store.publish("ApplicationPlaneStack", "ApplicationPlaneListenerArnV2", "arn").await.unwrap();
        assert_eq!(
            store.import("ApplicationPlaneListenerArn").await.unwrap_err().error_code(),
            "EXPORT_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let store = store().await;
        assert!(store.publish("s", " ", "v").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_stack() {
        let store = store().await;
        store.publish("A", "x", "1").await.unwrap();
        store.publish("B", "y", "2").await.unwrap();

        assert_eq!(store.remove_stack("A").await.unwrap(), 1);
        assert!(store.import("x").await.is_err());
        assert_eq!(store.import("y").await.unwrap(), "2");
    }
}
