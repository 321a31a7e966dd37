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

//! Unit of work spanning several repositories.
//!
//! A [`Transaction`] is opened through a [`DataAccessContext`] and passed to
//! every repository call in the block. Repositories record how to undo each
//! write and which notifications to publish. [`Transaction::commit`] publishes
//! the notifications; dropping the handle without commit replays the undo log
//! in reverse.
//!
//! ```rust,ignore
//! let tx = context.begin_transaction().await?;
//! jobs.update(Some(&tx), Filter::by_id(&job_id), Update::new(|j| j.state = JobState::Active)).await?;
//! engines.update(Some(&tx), Filter::by_id(&engine_id), Update::new(|e| e.is_job_running = true)).await?;
//! tx.commit();
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::error::StoreError;

type Action = Box<dyn FnOnce() + Send>;

/// Source of transactions. Writers holding a transaction are serialized.
#[async_trait]
pub trait DataAccessContext: Send + Sync {
    async fn begin_transaction(&self) -> Result<Transaction, StoreError>;
}

pub struct Transaction {
    undo_log: Mutex<Vec<Action>>,
    on_commit: Mutex<Vec<Action>>,
    _writer: OwnedMutexGuard<()>,
}

impl Transaction {
    pub(crate) fn new(writer: OwnedMutexGuard<()>) -> Self {
        Self {
            undo_log: Mutex::new(Vec::new()),
            on_commit: Mutex::new(Vec::new()),
            _writer: writer,
        }
    }

    /// Records the inverse of a write that has already been applied.
    pub fn record_undo(&self, undo: impl FnOnce() + Send + 'static) {
        self.undo_log.lock().push(Box::new(undo));
    }

    /// Defers an action, typically a change notification, until commit.
    pub fn on_commit(&self, action: impl FnOnce() + Send + 'static) {
        self.on_commit.lock().push(Box::new(action));
    }

    pub fn commit(self) {
        self.undo_log.lock().clear();
        let actions = std::mem::take(&mut *self.on_commit.lock());
        debug!(notifications = actions.len(), "Committing transaction");
        for action in actions {
            action();
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let undo_log = std::mem::take(&mut *self.undo_log.lock());
        if undo_log.is_empty() {
            return;
        }
        debug!(writes = undo_log.len(), "Rolling back transaction");
        for undo in undo_log.into_iter().rev() {
            undo();
        }
    }
}
