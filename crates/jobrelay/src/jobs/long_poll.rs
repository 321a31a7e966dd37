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

//! Revision-gated long-poll over a repository subscription.

use std::time::Duration;

use crate::error::StoreError;
use crate::store::{Entity, EntityChange, Filter, Repository, Subscription};

/// What a long-poll saw before returning.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The entity reached the requested revision, or was deleted.
    Changed(EntityChange<T>),
    /// Nothing satisfied the request before the timeout.
    TimedOut,
}

/// How to treat a filter that matches nothing when the poll starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentPolicy {
    /// Return `Delete` right away. Used for lookups by id.
    ReturnDelete,
    /// Wait for a matching entity to appear.
    WaitForInsert,
}

/// Waits until the entity matching `filter` has `revision >= min_revision`.
///
/// Returns a `Delete` change if the entity is removed while waiting. The
/// subscription is dropped, and so unsubscribed, on every return path,
/// including when the returned future itself is dropped.
pub async fn get_newer_revision<T: Entity>(
    repository: &dyn Repository<T>,
    filter: Filter<T>,
    min_revision: i64,
    timeout: Duration,
    absent: AbsentPolicy,
) -> Result<PollOutcome<T>, StoreError> {
    let mut subscription = repository.subscribe(filter).await?;
    if subscription.change().entity.is_none() && absent == AbsentPolicy::ReturnDelete {
        return Ok(PollOutcome::Changed(EntityChange::deleted()));
    }

    match tokio::time::timeout(
        timeout,
        wait_for_revision(subscription.as_mut(), min_revision),
    )
    .await
    {
        Ok(change) => Ok(PollOutcome::Changed(change?)),
        Err(_) => Ok(PollOutcome::TimedOut),
    }
}

async fn wait_for_revision<T: Entity>(
    subscription: &mut dyn Subscription<T>,
    min_revision: i64,
) -> Result<EntityChange<T>, StoreError> {
    loop {
        if let Some(change) = satisfied(subscription.change(), min_revision) {
            return Ok(change);
        }
        subscription.wait_for_change().await?;
        if subscription.change().is_delete() {
            return Ok(EntityChange::deleted());
        }
    }
}

fn satisfied<T: Entity>(change: &EntityChange<T>, min_revision: i64) -> Option<EntityChange<T>> {
    match &change.entity {
        Some(entity) if entity.revision() >= min_revision => Some(change.clone()),
        _ => None,
    }
}
