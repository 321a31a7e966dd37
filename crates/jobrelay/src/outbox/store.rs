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

//! Outbox message storage.
//!
//! The store assigns each message the next index within its
//! `(outbox_ref, group_id)` at enqueue time. It never reorders messages:
//! `list_pending` may return them in any order and the dispatcher sorts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::{NewOutboxMessage, OutboxMessage};

/// Storage for pending outbox messages.
///
/// `delete` and `increment_attempts` must be atomic per message so that
/// several dispatchers can race on the same store.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persists a message with the next index for its group.
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<OutboxMessage, StoreError>;

    async fn list_pending(&self) -> Result<Vec<OutboxMessage>, StoreError>;

    async fn increment_attempts(&self, id: &str) -> Result<(), StoreError>;

    /// Removes a message. Returns false if it was already gone.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError>;
}

#[derive(Default)]
struct MemoryOutboxState {
    messages: Vec<OutboxMessage>,
    current_index: HashMap<(String, String), i64>,
}

/// In-process [`OutboxStore`].
#[derive(Default)]
pub struct MemoryOutboxStore {
    state: Mutex<MemoryOutboxState>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message as-is, keeping its index and attempts.
    pub fn insert_raw(&self, message: OutboxMessage) {
        let mut state = self.state.lock();
        let key = (message.outbox_ref.clone(), message.group_id.clone());
        let current = state.current_index.entry(key).or_insert(0);
        *current = (*current).max(message.index);
        state.messages.push(message);
    }

    pub fn get(&self, id: &str) -> Option<OutboxMessage> {
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<OutboxMessage, StoreError> {
        let mut state = self.state.lock();
        if state.messages.iter().any(|m| m.id == message.id) {
            return Err(StoreError::DuplicateKey { id: message.id });
        }
        let key = (message.outbox_ref.clone(), message.group_id.clone());
        let index = state.current_index.entry(key).or_insert(0);
        *index += 1;
        let stored = message.into_message(*index);
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_pending(&self) -> Result<Vec<OutboxMessage>, StoreError> {
        Ok(self.state.lock().messages.clone())
    }

    async fn increment_attempts(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
            message.attempts += 1;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        Ok(state.messages.len() < before)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.state.lock().messages.len())
    }

    async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        Ok(self
            .state
            .lock()
            .messages
            .iter()
            .filter(|m| m.created_at < cutoff)
            .cloned()
            .collect())
    }
}
