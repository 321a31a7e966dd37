/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Entity store abstraction.
//!
//! Engines, jobs and results are persisted through a [`Repository`] per entity
//! type. Repositories support filtered reads and writes, take an optional
//! [`Transaction`] for multi-entity units of work, and expose a change
//! [`Subscription`] used by the long-poll.
//!
//! Revisions are owned by the store: insert sets revision 1 and every update
//! increments it by exactly one.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::StoreError;

mod memory;
mod transaction;

pub use memory::{MemoryDataAccessContext, MemoryRepository, MemorySubscription};
pub use transaction::{DataAccessContext, Transaction};

/// A stored entity with a string id and a store-managed revision.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn revision(&self) -> i64;
    fn set_revision(&mut self, revision: i64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityChangeType {
    None,
    Insert,
    Update,
    Delete,
}

/// A change notification: what happened and the entity's value afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange<T> {
    pub change_type: EntityChangeType,
    pub entity: Option<T>,
}

impl<T> EntityChange<T> {
    pub fn new(change_type: EntityChangeType, entity: Option<T>) -> Self {
        Self {
            change_type,
            entity,
        }
    }

    pub fn deleted() -> Self {
        Self::new(EntityChangeType::Delete, None)
    }

    pub fn is_delete(&self) -> bool {
        self.change_type == EntityChangeType::Delete
    }
}

/// Predicate selecting entities.
pub struct Filter<T> {
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

impl<T> Filter<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn all() -> Self {
        Self::new(|_| true)
    }

    pub fn matches(&self, entity: &T) -> bool {
        (self.predicate)(entity)
    }
}

impl<T: Entity> Filter<T> {
    pub fn by_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(move |entity: &T| entity.id() == id)
    }
}

/// In-place mutation applied by `update` and `update_all`.
pub struct Update<T> {
    apply: Arc<dyn Fn(&mut T) + Send + Sync>,
}

impl<T> Clone for Update<T> {
    fn clone(&self) -> Self {
        Self {
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T> Update<T> {
    pub fn new(apply: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        Self {
            apply: Arc::new(apply),
        }
    }

    pub fn apply(&self, entity: &mut T) {
        (self.apply)(entity)
    }
}

/// Repository for one entity type.
///
/// Mutations accept an optional transaction. Inside a transaction the write is
/// undone if the transaction is dropped without commit, and change
/// notifications are held back until commit.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    async fn get(&self, filter: Filter<T>) -> Result<Option<T>, StoreError>;

    async fn get_all(&self, filter: Filter<T>) -> Result<Vec<T>, StoreError>;

    async fn exists(&self, filter: Filter<T>) -> Result<bool, StoreError> {
        Ok(self.get(filter).await?.is_some())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.get(Filter::by_id(id)).await
    }

    /// Inserts an entity, assigning an id when empty and setting revision 1.
    async fn insert(&self, tx: Option<&Transaction>, entity: T) -> Result<T, StoreError>;

    async fn insert_all(
        &self,
        tx: Option<&Transaction>,
        entities: Vec<T>,
    ) -> Result<Vec<T>, StoreError>;

    /// Updates the first matching entity and returns its new value.
    async fn update(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
        update: Update<T>,
    ) -> Result<Option<T>, StoreError>;

    /// Updates every matching entity and returns how many changed.
    async fn update_all(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
        update: Update<T>,
    ) -> Result<usize, StoreError>;

    async fn delete(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
    ) -> Result<Option<T>, StoreError>;

    async fn delete_all(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
    ) -> Result<usize, StoreError>;

    /// Opens a change subscription for the first entity matching `filter`.
    async fn subscribe(&self, filter: Filter<T>) -> Result<Box<dyn Subscription<T>>, StoreError>;
}

/// A live view of one entity.
///
/// The initial change is `Update` with the current value, or `Delete` with no
/// entity when nothing matches. A present entity is then followed by id; an
/// absent one is picked up by the next write that matches the filter.
/// Dropping the subscription unsubscribes it.
#[async_trait]
pub trait Subscription<T: Entity>: Send {
    fn change(&self) -> &EntityChange<T>;

    /// Waits for the next change. Cancel by dropping the future.
    async fn wait_for_change(&mut self) -> Result<(), StoreError>;
}
