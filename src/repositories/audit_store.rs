use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::{AuditUpdate, NewAuditRecord, PurchaseAuditStore};
use crate::entities::purchase_audit_log::{self, Entity as PurchaseAuditLog};
use crate::errors::ServiceError;

fn new_model(record: NewAuditRecord) -> purchase_audit_log::Model {
    let now = Utc::now();
    purchase_audit_log::Model {
        id: Uuid::new_v4(),
        user_id: record.user_id,
        design_id: record.design_id,
        outbound_request: record.outbound_request,
        outbound_response: record.outbound_response,
        payload_digest: record.payload_digest,
        status: record.status,
        error_message: record.error_message,
        external_cart_id: record.external_cart_id,
        redirect_url: record.redirect_url,
        attempt_count: record.attempt_count,
        created_at: now,
        updated_at: now,
    }
}

/// Audit trail backed by sea-orm.
#[derive(Debug, Clone)]
pub struct SeaOrmAuditStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmAuditStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PurchaseAuditStore for SeaOrmAuditStore {
    async fn insert(&self, record: NewAuditRecord) -> Result<purchase_audit_log::Model, ServiceError> {
        let model = new_model(record);
        let active = purchase_audit_log::ActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id),
            design_id: Set(model.design_id),
            outbound_request: Set(model.outbound_request),
            outbound_response: Set(model.outbound_response),
            payload_digest: Set(model.payload_digest),
            status: Set(model.status),
            error_message: Set(model.error_message),
            external_cart_id: Set(model.external_cart_id),
            redirect_url: Set(model.redirect_url),
            attempt_count: Set(model.attempt_count),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
        };
        Ok(active.insert(&*self.db).await?)
    }

    async fn update(
        &self,
        id: Uuid,
        update: AuditUpdate,
    ) -> Result<purchase_audit_log::Model, ServiceError> {
        let existing = PurchaseAuditLog::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::RequestNotFound(id.to_string()))?;

        let attempt_count = existing.attempt_count + update.additional_attempts;
        let mut active: purchase_audit_log::ActiveModel = existing.into();
        active.outbound_response = Set(update.outbound_response);
        active.status = Set(update.status);
        active.error_message = Set(update.error_message);
        active.external_cart_id = Set(update.external_cart_id);
        active.redirect_url = Set(update.redirect_url);
        active.attempt_count = Set(attempt_count);
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    async fn get_for_user(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<purchase_audit_log::Model>, ServiceError> {
        Ok(PurchaseAuditLog::find_by_id(id)
            .filter(purchase_audit_log::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<purchase_audit_log::Model>, ServiceError> {
        Ok(PurchaseAuditLog::find()
            .filter(purchase_audit_log::Column::UserId.eq(user_id))
            .order_by_desc(purchase_audit_log::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}

/// Audit trail kept in a concurrent map.
///
/// `fail_writes` makes every insert and update fail, for exercising the
/// orchestrator's behaviour when the audit store is down.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: DashMap<Uuid, purchase_audit_log::Model>,
    fail_writes: AtomicBool,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, id: Uuid) -> Option<purchase_audit_log::Model> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overwrites a stored record as-is.
    pub fn put(&self, record: purchase_audit_log::Model) {
        self.records.insert(record.id, record);
    }

    fn check_writable(&self) -> Result<(), ServiceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(ServiceError::InternalError("audit store unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PurchaseAuditStore for InMemoryAuditStore {
    async fn insert(&self, record: NewAuditRecord) -> Result<purchase_audit_log::Model, ServiceError> {
        self.check_writable()?;
        let model = new_model(record);
        self.records.insert(model.id, model.clone());
        Ok(model)
    }

    async fn update(
        &self,
        id: Uuid,
        update: AuditUpdate,
    ) -> Result<purchase_audit_log::Model, ServiceError> {
        self.check_writable()?;
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| ServiceError::RequestNotFound(id.to_string()))?;

        entry.outbound_response = update.outbound_response;
        entry.status = update.status;
        entry.error_message = update.error_message;
        entry.external_cart_id = update.external_cart_id;
        entry.redirect_url = update.redirect_url;
        entry.attempt_count += update.additional_attempts;
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    async fn get_for_user(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<purchase_audit_log::Model>, ServiceError> {
        Ok(self
            .records
            .get(&id)
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<purchase_audit_log::Model>, ServiceError> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(records)
    }
}
