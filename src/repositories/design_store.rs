use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::DesignStore;
use crate::entities::design::{self, CartStatus, Entity as Design};
use crate::errors::ServiceError;

/// Designs table backed by sea-orm.
#[derive(Debug, Clone)]
pub struct SeaOrmDesignStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmDesignStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a design in `saved` state.
    pub async fn create(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
    ) -> Result<design::Model, ServiceError> {
        let now = Utc::now();
        let model = design::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
            name: Set(name.to_string()),
            cart_status: Set(CartStatus::Saved),
            external_cart_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&*self.db).await?)
    }
}

#[async_trait]
impl DesignStore for SeaOrmDesignStore {
    async fn find_owned_design(
        &self,
        design_id: &str,
        user_id: &str,
    ) -> Result<Option<design::Model>, ServiceError> {
        Ok(Design::find_by_id(design_id.to_string())
            .filter(design::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self, external_cart_id))]
    async fn set_cart_status(
        &self,
        design_id: &str,
        status: CartStatus,
        external_cart_id: Option<String>,
    ) -> Result<(), ServiceError> {
        let existing = Design::find_by_id(design_id.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::DesignNotFound(design_id.to_string()))?;

        let mut active: design::ActiveModel = existing.into();
        active.cart_status = Set(status);
        active.external_cart_id = Set(external_cart_id);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        debug!("Design cart status updated");
        Ok(())
    }
}

/// Designs kept in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryDesignStore {
    designs: DashMap<String, design::Model>,
}

impl InMemoryDesignStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a design in `saved` state and returns it.
    pub fn add_design(&self, id: &str, user_id: &str, name: &str) -> design::Model {
        let now = Utc::now();
        let model = design::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            cart_status: CartStatus::Saved,
            external_cart_id: None,
            created_at: now,
            updated_at: now,
        };
        self.designs.insert(id.to_string(), model.clone());
        model
    }

    pub fn get(&self, id: &str) -> Option<design::Model> {
        self.designs.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl DesignStore for InMemoryDesignStore {
    async fn find_owned_design(
        &self,
        design_id: &str,
        user_id: &str,
    ) -> Result<Option<design::Model>, ServiceError> {
        Ok(self
            .designs
            .get(design_id)
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn set_cart_status(
        &self,
        design_id: &str,
        status: CartStatus,
        external_cart_id: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut entry = self
            .designs
            .get_mut(design_id)
            .ok_or_else(|| ServiceError::DesignNotFound(design_id.to_string()))?;
        entry.cart_status = status;
        entry.external_cart_id = external_cart_id;
        entry.updated_at = Utc::now();
        Ok(())
    }
}
