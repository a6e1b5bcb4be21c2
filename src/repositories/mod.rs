//! Persistence collaborators of the cart pipeline.
//!
//! Each store is a trait with a sea-orm implementation for deployments and an
//! in-memory implementation for tests.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::entities::{
    design::{self, CartStatus},
    purchase_audit_log::{self, AuditStatus},
};
use crate::errors::ServiceError;

pub mod audit_store;
pub mod design_store;

pub use audit_store::{InMemoryAuditStore, SeaOrmAuditStore};
pub use design_store::{InMemoryDesignStore, SeaOrmDesignStore};

/// Ownership lookups and cart status transitions for designs.
#[async_trait]
pub trait DesignStore: Send + Sync {
    /// Returns the design only if it exists and belongs to `user_id`.
    async fn find_owned_design(
        &self,
        design_id: &str,
        user_id: &str,
    ) -> Result<Option<design::Model>, ServiceError>;

    async fn set_cart_status(
        &self,
        design_id: &str,
        status: CartStatus,
        external_cart_id: Option<String>,
    ) -> Result<(), ServiceError>;
}

/// Fields of a new audit record; id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub user_id: String,
    pub design_id: String,
    pub outbound_request: Value,
    pub outbound_response: Option<Value>,
    pub payload_digest: String,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub external_cart_id: Option<String>,
    pub redirect_url: Option<String>,
    pub attempt_count: i32,
}

/// Result of a replay, applied in place to an existing record.
#[derive(Debug, Clone)]
pub struct AuditUpdate {
    pub outbound_response: Option<Value>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub external_cart_id: Option<String>,
    pub redirect_url: Option<String>,
    /// Added to the stored attempt count
    pub additional_attempts: i32,
}

/// Append/update audit trail. Records are never deleted.
#[async_trait]
pub trait PurchaseAuditStore: Send + Sync {
    async fn insert(&self, record: NewAuditRecord) -> Result<purchase_audit_log::Model, ServiceError>;

    async fn update(
        &self,
        id: Uuid,
        update: AuditUpdate,
    ) -> Result<purchase_audit_log::Model, ServiceError>;

    /// Returns the record only if it belongs to `user_id`.
    async fn get_for_user(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<purchase_audit_log::Model>, ServiceError>;

    /// Most recent first.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> Result<Vec<purchase_audit_log::Model>, ServiceError>;
}
