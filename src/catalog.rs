use std::sync::Arc;

use log::{debug, Logger};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::class::{ClassOccurrence, NewClass};
use crate::db::Db;
use crate::errors::BackendError;

/// Lookup and capacity management for class occurrences.
#[derive(Clone)]
pub struct Catalog {
    logger: Arc<Logger>,
    db: Arc<dyn Db + Send + Sync>,
}

impl Catalog {
    pub fn new(logger: Arc<Logger>, db: Arc<dyn Db + Send + Sync>) -> Self {
        Catalog { logger, db }
    }

    /// Fails with `ClassNotFound` when there is no such class.
    pub async fn get(&self, id: &Uuid) -> Result<ClassOccurrence, BackendError> {
        self.db
            .retrieve_class(id)
            .await?
            .ok_or(BackendError::ClassNotFound(*id))
    }

    /// Classes starting at or after `now`, earliest first.
    pub async fn list_upcoming(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<ClassOccurrence>, BackendError> {
        self.db.retrieve_upcoming(now).await
    }

    /// Classes with at least one free slot, earliest first.
    pub async fn list_bookable(&self) -> Result<Vec<ClassOccurrence>, BackendError> {
        self.db.retrieve_bookable().await
    }

    /// Takes one slot from the class. Fails with `SoldOut` if none were
    /// left at the moment of the update; of any number of concurrent
    /// callers racing for the last slot, exactly one succeeds.
    pub async fn decrement_slot(&self, id: &Uuid) -> Result<(), BackendError> {
        self.db.decrement_slot(id).await
    }

    pub async fn add(&self, class: NewClass) -> Result<ClassOccurrence, BackendError> {
        class.validate()?;

        let class = self.db.insert_class(class).await?;
        debug!(self.logger, "Added class"; "id" => %class.id, "name" => &class.name, "slots" => class.total_slots);

        Ok(class)
    }
}
