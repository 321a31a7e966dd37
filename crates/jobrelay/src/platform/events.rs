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

//! Domain event publishing.
//!
//! The platform publishes an event after each job start or finish commits.
//! Publishing never rolls back the transition; failures are logged by the
//! caller.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::PublishError;
use crate::models::DomainEvent;
use crate::outbox::OutboxService;

/// Default capacity of a [`BroadcastPublisher`] channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

/// Fans events out to in-process listeners.
///
/// Listeners that fall behind by more than the channel capacity miss events.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        // A send with no listeners is not a failure.
        if self.sender.send(event.clone()).is_err() {
            debug!(
                event_type = event.event_type().as_str(),
                "No listeners for domain event"
            );
        }
        Ok(())
    }
}

/// Enqueues events into an outbox so downstream delivery survives restarts.
///
/// Messages are grouped by engine id, so events about one engine are delivered
/// in the order they were published.
#[derive(Clone)]
pub struct OutboxEventPublisher {
    outbox: OutboxService,
    outbox_ref: String,
}

impl OutboxEventPublisher {
    pub fn new(outbox: OutboxService, outbox_ref: impl Into<String>) -> Self {
        Self {
            outbox,
            outbox_ref: outbox_ref.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for OutboxEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        self.outbox
            .enqueue(
                &self.outbox_ref,
                event.event_type().as_str(),
                event.engine_id(),
                event,
            )
            .await?;
        Ok(())
    }
}
