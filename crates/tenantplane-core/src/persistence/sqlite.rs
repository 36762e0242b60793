// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CoreError;
use crate::migrations;
use crate::model::TenantStatus;

use super::{
    ExportRecord, InvocationRecord, Persistence, Placement, PlacementFn, ReservationKey,
    ReservationRecord, TenantStatusRecord,
};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    ///
    /// The pool must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the state file at `path` and migrate it.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/tenantplane.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }

    /// Fresh in-memory store, migrated. State is lost when dropped.
    pub async fn in_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        migrations::run_sqlite(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn reserve_block(
        &self,
        key: &ReservationKey<'_>,
        block_size: i64,
        place: &PlacementFn<'_>,
    ) -> Result<(ReservationRecord, bool), CoreError> {
        // Write lock before the scan: concurrent reservers queue here.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let taken = sqlx::query_as::<_, ReservationRecord>(
            r#"
            SELECT listener, tenant_id, service, priority_base, block_size, reserved_at
            FROM priority_reservations
            WHERE listener = ?
            ORDER BY priority_base
            "#,
        )
        .bind(key.listener)
        .fetch_all(&mut *tx)
        .await?;

        let (held, others): (Vec<_>, Vec<_>) = taken.into_iter().partition(|r| r.is_held_by(key));
        let held = held.into_iter().next();

        let base = match (place(held.as_ref(), &others)?, held) {
            (Placement::Keep, Some(record)) => return Ok((record, false)),
            (Placement::Keep, None) => {
                return Err(CoreError::DatabaseError {
                    operation: "reserve_block".to_string(),
                    details: format!(
                        "no block to keep for '{}' ({}) on '{}'",
                        key.tenant_id, key.service, key.listener
                    ),
                });
            }
            (Placement::Insert(base), _) => base,
        };

        sqlx::query(
            r#"
            INSERT INTO priority_reservations
                (listener, tenant_id, service, priority_base, block_size, reserved_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
        )
        .bind(key.listener)
        .bind(key.tenant_id)
        .bind(key.service)
        .bind(base)
        .bind(block_size)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::DatabaseError {
            operation: "reserve_block".to_string(),
            details: e.to_string(),
        })?;

        let record = sqlx::query_as::<_, ReservationRecord>(
            r#"
            SELECT listener, tenant_id, service, priority_base, block_size, reserved_at
            FROM priority_reservations
            WHERE listener = ? AND tenant_id = ? AND service = ?
            "#,
        )
        .bind(key.listener)
        .bind(key.tenant_id)
        .bind(key.service)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((record, true))
    }

    async fn get_reservation(
        &self,
        key: &ReservationKey<'_>,
    ) -> Result<Option<ReservationRecord>, CoreError> {
        let record = sqlx::query_as::<_, ReservationRecord>(
            r#"
            SELECT listener, tenant_id, service, priority_base, block_size, reserved_at
            FROM priority_reservations
            WHERE listener = ? AND tenant_id = ? AND service = ?
            "#,
        )
        .bind(key.listener)
        .bind(key.tenant_id)
        .bind(key.service)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_reservations(
        &self,
        listener: Option<&str>,
    ) -> Result<Vec<ReservationRecord>, CoreError> {
        let records = sqlx::query_as::<_, ReservationRecord>(
            r#"
            SELECT listener, tenant_id, service, priority_base, block_size, reserved_at
            FROM priority_reservations
            WHERE (?1 IS NULL OR listener = ?1)
            ORDER BY listener, priority_base
            "#,
        )
        .bind(listener)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_reservation(&self, key: &ReservationKey<'_>) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM priority_reservations
            WHERE listener = ? AND tenant_id = ? AND service = ?
            "#,
        )
        .bind(key.listener)
        .bind(key.tenant_id)
        .bind(key.service)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn last_invocation(
        &self,
        stack_id: &str,
        resource: &str,
    ) -> Result<Option<InvocationRecord>, CoreError> {
        let record = sqlx::query_as::<_, InvocationRecord>(
            r#"
            SELECT stack_id, resource, tenant_id, tenant_state, physical_id, payload_hash, applied_at
            FROM lifecycle_invocations
            WHERE stack_id = ? AND resource = ?
            "#,
        )
        .bind(stack_id)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn record_invocation(
        &self,
        record: &InvocationRecord,
        status: TenantStatus,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO lifecycle_invocations
                (stack_id, resource, tenant_id, tenant_state, physical_id, payload_hash, applied_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (stack_id, resource) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                tenant_state = excluded.tenant_state,
                physical_id = excluded.physical_id,
                payload_hash = excluded.payload_hash,
                applied_at = excluded.applied_at
            "#,
        )
        .bind(&record.stack_id)
        .bind(&record.resource)
        .bind(&record.tenant_id)
        .bind(&record.tenant_state)
        .bind(&record.physical_id)
        .bind(&record.payload_hash)
        .bind(record.applied_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO tenant_status (tenant_id, status, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (tenant_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.tenant_id)
        .bind(status.as_str())
        .bind(record.applied_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear_invocations(&self, stack_id: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM lifecycle_invocations WHERE stack_id = ?")
            .bind(stack_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn get_tenant_status(
        &self,
        tenant_id: &str,
    ) -> Result<Option<TenantStatusRecord>, CoreError> {
        let record = sqlx::query_as::<_, TenantStatusRecord>(
            r#"
            SELECT tenant_id, status, updated_at
            FROM tenant_status
            WHERE tenant_id = ?
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn put_export(
        &self,
        name: &str,
        value: &str,
        stack_name: &str,
    ) -> Result<ExportRecord, CoreError> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT stack_name FROM stack_exports WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(owner) = owner
            && owner != stack_name
        {
            return Err(CoreError::ExportAlreadyExists {
                name: name.to_string(),
                owner,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO stack_exports (name, value, stack_name, created_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(name)
        .bind(value)
        .bind(stack_name)
        .execute(&mut *tx)
        .await?;

        let record = sqlx::query_as::<_, ExportRecord>(
            "SELECT name, value, stack_name, created_at FROM stack_exports WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn get_export(&self, name: &str) -> Result<Option<ExportRecord>, CoreError> {
        let record = sqlx::query_as::<_, ExportRecord>(
            "SELECT name, value, stack_name, created_at FROM stack_exports WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_exports(&self, stack_name: Option<&str>) -> Result<Vec<ExportRecord>, CoreError> {
        let records = sqlx::query_as::<_, ExportRecord>(
            r#"
            SELECT name, value, stack_name, created_at
            FROM stack_exports
            WHERE (?1 IS NULL OR stack_name = ?1)
            ORDER BY name
            "#,
        )
        .bind(stack_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_exports_for_stack(&self, stack_name: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM stack_exports WHERE stack_name = ?")
            .bind(stack_name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_persistence() -> SqlitePersistence {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        SqlitePersistence::new(pool)
    }

    fn invocation(stack: &str, physical_id: &str) -> InvocationRecord {
        InvocationRecord {
            stack_id: stack.to_string(),
            resource: "AwsProvisioningCustomResource".to_string(),
            tenant_id: "acme".to_string(),
            tenant_state: "PROVISION".to_string(),
            physical_id: physical_id.to_string(),
            payload_hash: "9b9cb3".to_string(),
            applied_at: Utc::now(),
        }
    }

    fn media<'a>(listener: &'a str, tenant_id: &'a str) -> ReservationKey<'a> {
        ReservationKey {
            listener,
            tenant_id,
            service: "product-media",
        }
    }

    async fn insert_at(
        p: &SqlitePersistence,
        key: &ReservationKey<'_>,
        base: i64,
    ) -> Result<ReservationRecord, CoreError> {
        p.reserve_block(key, 10, &move |_, _| Ok(Placement::Insert(base)))
            .await
            .map(|(record, _)| record)
    }

    #[tokio::test]
    async fn test_reservation_round_trip() {
        let p = test_persistence().await;
        let key = media("shared", "acme");

        let (rec, created) = p
            .reserve_block(&key, 10, &|_, _| Ok(Placement::Insert(100)))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(rec.priority_base, 100);
        assert_eq!(rec.block_size, 10);
        assert_eq!(rec.service, "product-media");

        let fetched = p.get_reservation(&key).await.unwrap().unwrap();
        assert_eq!(fetched, rec);

        assert!(p.get_reservation(&media("other", "acme")).await.unwrap().is_none());
        let review = ReservationKey {
            service: "product-review",
            ..key
        };
        assert!(p.get_reservation(&review).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reservation_unique_per_key_and_base() {
        let p = test_persistence().await;
        insert_at(&p, &media("shared", "acme"), 100).await.unwrap();

        let dup_key = insert_at(&p, &media("shared", "acme"), 110).await;
        assert!(matches!(dup_key, Err(CoreError::DatabaseError { .. })));

        let dup_base = insert_at(&p, &media("shared", "globex"), 100).await;
        assert!(matches!(dup_base, Err(CoreError::DatabaseError { .. })));

        // same base on another listener is fine
        insert_at(&p, &media("internal", "globex"), 100).await.unwrap();

        // same tenant, other service, other base is fine
        let review = ReservationKey {
            listener: "shared",
            tenant_id: "acme",
            service: "product-review",
        };
        insert_at(&p, &review, 110).await.unwrap();
    }

    #[tokio::test]
    async fn test_reserve_block_keep_and_scan() {
        let p = test_persistence().await;
        let acme = media("shared", "acme");
        insert_at(&p, &acme, 100).await.unwrap();
        insert_at(&p, &media("shared", "globex"), 110).await.unwrap();

        let (kept, created) = p
            .reserve_block(&acme, 10, &|held, others| {
                assert_eq!(held.map(|r| r.priority_base), Some(100));
                assert_eq!(
                    others.iter().map(|r| r.tenant_id.as_str()).collect::<Vec<_>>(),
                    vec!["globex"]
                );
                Ok(Placement::Keep)
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(kept.priority_base, 100);

        let err = p
            .reserve_block(&media("shared", "initech"), 10, &|_, _| Ok(Placement::Keep))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DatabaseError { .. }));

        let err = p
            .reserve_block(&media("shared", "initech"), 10, &|_, _| {
                Err(CoreError::validation("priority_base", "rejected"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(p.list_reservations(Some("shared")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_and_delete_reservations() {
        let p = test_persistence().await;
        insert_at(&p, &media("shared", "globex"), 110).await.unwrap();
        insert_at(&p, &media("shared", "acme"), 100).await.unwrap();
        insert_at(&p, &media("internal", "initech"), 100).await.unwrap();

        let shared = p.list_reservations(Some("shared")).await.unwrap();
        assert_eq!(
            shared.iter().map(|r| r.tenant_id.as_str()).collect::<Vec<_>>(),
            vec!["acme", "globex"]
        );
        assert_eq!(p.list_reservations(None).await.unwrap().len(), 3);

        assert!(p.delete_reservation(&media("shared", "acme")).await.unwrap());
        assert!(!p.delete_reservation(&media("shared", "acme")).await.unwrap());
        assert_eq!(p.list_reservations(Some("shared")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_invocation_updates_ledger_and_status() {
        let p = test_persistence().await;
        let stack = "ProductReviewTenantProvisioningStack-acme";

        assert!(p.last_invocation(stack, "AwsProvisioningCustomResource").await.unwrap().is_none());
        assert!(p.get_tenant_status("acme").await.unwrap().is_none());

        p.record_invocation(&invocation(stack, "id-1"), TenantStatus::Provisioned)
            .await
            .unwrap();
        p.record_invocation(&invocation(stack, "id-2"), TenantStatus::Provisioned)
            .await
            .unwrap();

        let last = p
            .last_invocation(stack, "AwsProvisioningCustomResource")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.physical_id, "id-2");

        let status = p.get_tenant_status("acme").await.unwrap().unwrap();
        assert_eq!(status.status(), TenantStatus::Provisioned);
    }

    #[tokio::test]
    async fn test_clear_invocations() {
        let p = test_persistence().await;
        p.record_invocation(&invocation("stack-a", "id-1"), TenantStatus::Provisioned)
            .await
            .unwrap();
        p.record_invocation(&invocation("stack-b", "id-2"), TenantStatus::Provisioned)
            .await
            .unwrap();

        assert_eq!(p.clear_invocations("stack-a").await.unwrap(), 1);
        assert!(p.last_invocation("stack-a", "AwsProvisioningCustomResource").await.unwrap().is_none());
        assert!(p.last_invocation("stack-b", "AwsProvisioningCustomResource").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_exports_owned_by_one_stack() {
        let p = test_persistence().await;

        p.put_export("RDSClusterHost", "db.internal", "ProductReviewStack").await.unwrap();
        let updated = p
            .put_export("RDSClusterHost", "db2.internal", "ProductReviewStack")
            .await
            .unwrap();
        assert_eq!(updated.value, "db2.internal");

        let err = p
            .put_export("RDSClusterHost", "evil", "SomeOtherStack")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ExportAlreadyExists { ref owner, .. } if owner == "ProductReviewStack"
        ));

        let stored = p.get_export("RDSClusterHost").await.unwrap().unwrap();
        assert_eq!(stored.value, "db2.internal");
    }

    #[tokio::test]
    async fn test_list_and_delete_exports() {
        let p = test_persistence().await;
        p.put_export("RDSClusterPort", "5432", "ProductReviewStack").await.unwrap();
        p.put_export("RDSClusterHost", "db", "ProductReviewStack").await.unwrap();
        p.put_export("ApplicationPlaneVpcId", "vpc-1", "ApplicationPlaneStack").await.unwrap();

        let all = p.list_exports(None).await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["ApplicationPlaneVpcId", "RDSClusterHost", "RDSClusterPort"]
        );
        assert_eq!(p.list_exports(Some("ProductReviewStack")).await.unwrap().len(), 2);

        assert_eq!(p.delete_exports_for_stack("ProductReviewStack").await.unwrap(), 2);
        assert!(p.get_export("RDSClusterHost").await.unwrap().is_none());
        assert!(p.get_export("ApplicationPlaneVpcId").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_from_path_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");

        let p = SqlitePersistence::from_path(&path).await.unwrap();
        insert_at(&p, &media("shared", "acme"), 100).await.unwrap();
        drop(p);

        let reopened = SqlitePersistence::from_path(&path).await.unwrap();
        assert!(
            reopened
                .get_reservation(&media("shared", "acme"))
                .await
                .unwrap()
                .is_some()
        );
    }
}
