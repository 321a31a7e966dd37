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

//! In-process repository backed by a mutex-guarded vector.
//!
//! Each subscription owns a `watch` channel. Writes are matched against the
//! registered subscriptions under the same lock that applies them, so a
//! subscriber never misses a write between reading its initial value and
//! waiting for the next change.
//!
//! Rollback restores snapshots. An undo is skipped when the entity has been
//! written again since the transaction's write, so a revision never moves
//! backwards. Repositories created with [`MemoryRepository::with_context`]
//! also make writes without a transaction wait for the open one, so nothing
//! is written between a transaction's write and its rollback.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::{
    DataAccessContext, Entity, EntityChange, EntityChangeType, Filter, Repository, Subscription,
    Transaction, Update,
};
use crate::error::StoreError;

struct Subscriber<T> {
    filter: Filter<T>,
    tracked_id: Option<String>,
    sender: watch::Sender<EntityChange<T>>,
}

struct WriteEvent<T> {
    id: String,
    change_type: EntityChangeType,
    entity: Option<T>,
}

struct RepositoryState<T> {
    entities: Vec<T>,
    subscribers: HashMap<u64, Subscriber<T>>,
    next_subscriber_id: u64,
}

impl<T: Entity> RepositoryState<T> {
    fn position(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == id)
    }

    fn publish(&mut self, event: WriteEvent<T>) {
        for subscriber in self.subscribers.values_mut() {
            match &subscriber.tracked_id {
                Some(tracked) if *tracked == event.id => {
                    if event.change_type == EntityChangeType::Delete {
                        subscriber.tracked_id = None;
                        subscriber.sender.send_replace(EntityChange::deleted());
                    } else {
                        subscriber
                            .sender
                            .send_replace(EntityChange::new(event.change_type, event.entity.clone()));
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(entity) = &event.entity {
                        if subscriber.filter.matches(entity) {
                            subscriber.tracked_id = Some(event.id.clone());
                            subscriber.sender.send_replace(EntityChange::new(
                                event.change_type,
                                Some(entity.clone()),
                            ));
                        }
                    }
                }
            }
        }
    }
}

/// In-memory [`Repository`].
pub struct MemoryRepository<T> {
    state: Arc<Mutex<RepositoryState<T>>>,
    writer: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl<T> Clone for MemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            writer: self.writer.clone(),
        }
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RepositoryState {
                entities: Vec::new(),
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
            })),
            writer: None,
        }
    }

    /// Creates a repository whose writes without a transaction are serialized
    /// with the transactions of `context`.
    ///
    /// A task holding a transaction of `context` must pass it to every write
    /// it makes on this repository.
    pub fn with_context(context: &MemoryDataAccessContext) -> Self {
        Self {
            writer: Some(Arc::clone(&context.writer)),
            ..Self::new()
        }
    }

    /// Takes the context's writer lock for a write made without a transaction.
    async fn exclusive(
        &self,
        tx: Option<&Transaction>,
    ) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match (&self.writer, tx) {
            (Some(writer), None) => Some(writer.lock().await),
            _ => None,
        }
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Publishes now, or at commit when inside a transaction.
    fn publish(&self, tx: Option<&Transaction>, event: WriteEvent<T>) {
        match tx {
            Some(tx) => {
                let state = Arc::clone(&self.state);
                tx.on_commit(move || state.lock().publish(event));
            }
            None => self.state.lock().publish(event),
        }
    }

    /// Records how to undo a write. `written` is the revision the write left,
    /// or `None` for a delete.
    fn record_restore(
        &self,
        tx: Option<&Transaction>,
        id: String,
        previous: Option<T>,
        written: Option<i64>,
    ) {
        let Some(tx) = tx else {
            return;
        };
        let state = Arc::clone(&self.state);
        tx.record_undo(move || {
            let mut state = state.lock();
            let position = state.position(&id);
            if let Some(index) = position {
                if Some(state.entities[index].revision()) != written {
                    debug!(id = %id, "Keeping a later write over a rolled back one");
                    return;
                }
            }
            match (position, previous) {
                (Some(index), Some(previous)) => state.entities[index] = previous,
                (Some(index), None) => {
                    state.entities.remove(index);
                }
                (None, Some(previous)) => state.entities.push(previous),
                (None, None) => {}
            }
        });
    }

    fn insert_one(&self, tx: Option<&Transaction>, mut entity: T) -> Result<T, StoreError> {
        if entity.id().is_empty() {
            entity.set_id(Uuid::new_v4().simple().to_string());
        }
        entity.set_revision(1);
        {
            let mut state = self.state.lock();
            if state.position(entity.id()).is_some() {
                return Err(StoreError::DuplicateKey {
                    id: entity.id().to_string(),
                });
            }
            state.entities.push(entity.clone());
        }
        self.record_restore(tx, entity.id().to_string(), None, Some(entity.revision()));
        self.publish(
            tx,
            WriteEvent {
                id: entity.id().to_string(),
                change_type: EntityChangeType::Insert,
                entity: Some(entity.clone()),
            },
        );
        Ok(entity)
    }

    fn update_matching(
        &self,
        tx: Option<&Transaction>,
        filter: &Filter<T>,
        update: &Update<T>,
        limit: Option<usize>,
    ) -> Vec<T> {
        let mut changed = Vec::new();
        {
            let mut state = self.state.lock();
            for entity in state.entities.iter_mut() {
                if limit.is_some_and(|limit| changed.len() >= limit) {
                    break;
                }
                if !filter.matches(entity) {
                    continue;
                }
                let previous = entity.clone();
                update.apply(entity);
                entity.set_revision(previous.revision() + 1);
                changed.push((previous, entity.clone()));
            }
        }
        changed
            .into_iter()
            .map(|(previous, current)| {
                self.record_restore(
                    tx,
                    current.id().to_string(),
                    Some(previous),
                    Some(current.revision()),
                );
                self.publish(
                    tx,
                    WriteEvent {
                        id: current.id().to_string(),
                        change_type: EntityChangeType::Update,
                        entity: Some(current.clone()),
                    },
                );
                current
            })
            .collect()
    }

    fn delete_matching(
        &self,
        tx: Option<&Transaction>,
        filter: &Filter<T>,
        limit: Option<usize>,
    ) -> Vec<T> {
        let mut removed = Vec::new();
        {
            let mut state = self.state.lock();
            let mut index = 0;
            while index < state.entities.len() {
                if limit.is_some_and(|limit| removed.len() >= limit) {
                    break;
                }
                if filter.matches(&state.entities[index]) {
                    removed.push(state.entities.remove(index));
                } else {
                    index += 1;
                }
            }
        }
        for entity in &removed {
            self.record_restore(tx, entity.id().to_string(), Some(entity.clone()), None);
            self.publish(
                tx,
                WriteEvent {
                    id: entity.id().to_string(),
                    change_type: EntityChangeType::Delete,
                    entity: None,
                },
            );
        }
        removed
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for MemoryRepository<T> {
    async fn get(&self, filter: Filter<T>) -> Result<Option<T>, StoreError> {
        let state = self.state.lock();
        Ok(state.entities.iter().find(|e| filter.matches(e)).cloned())
    }

    async fn get_all(&self, filter: Filter<T>) -> Result<Vec<T>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .entities
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn insert(&self, tx: Option<&Transaction>, entity: T) -> Result<T, StoreError> {
        let _writer = self.exclusive(tx).await;
        self.insert_one(tx, entity)
    }

    async fn insert_all(
        &self,
        tx: Option<&Transaction>,
        entities: Vec<T>,
    ) -> Result<Vec<T>, StoreError> {
        let _writer = self.exclusive(tx).await;
        entities
            .into_iter()
            .map(|entity| self.insert_one(tx, entity))
            .collect()
    }

    async fn update(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
        update: Update<T>,
    ) -> Result<Option<T>, StoreError> {
        let _writer = self.exclusive(tx).await;
        Ok(self
            .update_matching(tx, &filter, &update, Some(1))
            .into_iter()
            .next())
    }

    async fn update_all(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
        update: Update<T>,
    ) -> Result<usize, StoreError> {
        let _writer = self.exclusive(tx).await;
        Ok(self.update_matching(tx, &filter, &update, None).len())
    }

    async fn delete(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
    ) -> Result<Option<T>, StoreError> {
        let _writer = self.exclusive(tx).await;
        Ok(self.delete_matching(tx, &filter, Some(1)).into_iter().next())
    }

    async fn delete_all(
        &self,
        tx: Option<&Transaction>,
        filter: Filter<T>,
    ) -> Result<usize, StoreError> {
        let _writer = self.exclusive(tx).await;
        Ok(self.delete_matching(tx, &filter, None).len())
    }

    async fn subscribe(&self, filter: Filter<T>) -> Result<Box<dyn Subscription<T>>, StoreError> {
        let mut state = self.state.lock();
        let current = state.entities.iter().find(|e| filter.matches(e)).cloned();
        let initial = match &current {
            Some(entity) => EntityChange::new(EntityChangeType::Update, Some(entity.clone())),
            None => EntityChange::deleted(),
        };
        let (sender, receiver) = watch::channel(initial.clone());
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.insert(
            id,
            Subscriber {
                filter,
                tracked_id: current.map(|e| e.id().to_string()),
                sender,
            },
        );

        Ok(Box::new(MemorySubscription {
            id,
            current: initial,
            receiver,
            state: Arc::downgrade(&self.state),
        }))
    }
}

/// Subscription handed out by [`MemoryRepository::subscribe`].
pub struct MemorySubscription<T> {
    id: u64,
    current: EntityChange<T>,
    receiver: watch::Receiver<EntityChange<T>>,
    state: Weak<Mutex<RepositoryState<T>>>,
}

#[async_trait]
impl<T: Entity> Subscription<T> for MemorySubscription<T> {
    fn change(&self) -> &EntityChange<T> {
        &self.current
    }

    async fn wait_for_change(&mut self) -> Result<(), StoreError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| StoreError::SubscriptionClosed)?;
        self.current = self.receiver.borrow_and_update().clone();
        Ok(())
    }
}

impl<T> Drop for MemorySubscription<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().subscribers.remove(&self.id);
        }
    }
}

/// Transaction source for [`MemoryRepository`] instances.
///
/// Reads are not isolated from an open transaction; writers are serialized.
#[derive(Clone, Default)]
pub struct MemoryDataAccessContext {
    writer: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryDataAccessContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataAccessContext for MemoryDataAccessContext {
    async fn begin_transaction(&self) -> Result<Transaction, StoreError> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        Ok(Transaction::new(writer))
    }
}
