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

//! Producer side of the outbox.

use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::content::ContentStore;
use super::signal::DeliverySignal;
use super::store::OutboxStore;
use crate::config::OutboxConfig;
use crate::error::OutboxError;
use crate::models::{NewOutboxMessage, OutboxMessage};

/// Enqueues remote calls for later delivery.
#[derive(Clone)]
pub struct OutboxService {
    store: Arc<dyn OutboxStore>,
    content: ContentStore,
    config: OutboxConfig,
    signal: Arc<DeliverySignal>,
}

impl OutboxService {
    pub fn new(store: Arc<dyn OutboxStore>, config: OutboxConfig) -> Self {
        Self {
            store,
            content: ContentStore::new(config.outbox_dir()),
            config,
            signal: Arc::new(DeliverySignal::new()),
        }
    }

    /// Signal notified on every enqueue. Hand it to the delivery service.
    pub fn signal(&self) -> Arc<DeliverySignal> {
        Arc::clone(&self.signal)
    }

    pub fn store(&self) -> Arc<dyn OutboxStore> {
        Arc::clone(&self.store)
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.content
    }

    pub async fn enqueue<C>(
        &self,
        outbox_ref: &str,
        method: &str,
        group_id: &str,
        content: &C,
    ) -> Result<OutboxMessage, OutboxError>
    where
        C: Serialize + ?Sized,
    {
        let content = self.serialize_content(method, group_id, content)?;
        let message = self
            .store
            .enqueue(NewOutboxMessage::new(outbox_ref, method, group_id, Some(content)))
            .await?;
        debug!(
            outbox = outbox_ref,
            method,
            group_id,
            index = message.index,
            "Enqueued outbox message"
        );
        self.signal.notify();
        Ok(message)
    }

    /// Enqueues a call whose bulk payload is written to a content stream file.
    ///
    /// The file is written before the message is stored, and removed again if
    /// storing fails.
    pub async fn enqueue_with_stream<C, T, S>(
        &self,
        outbox_ref: &str,
        method: &str,
        group_id: &str,
        content: &C,
        rows: S,
    ) -> Result<OutboxMessage, OutboxError>
    where
        C: Serialize + ?Sized,
        T: Serialize,
        S: Stream<Item = T>,
    {
        let content = self.serialize_content(method, group_id, content)?;
        let new_message =
            NewOutboxMessage::new(outbox_ref, method, group_id, Some(content)).with_content_stream();
        let message_id = new_message.id.clone();

        if let Err(e) = self.content.write(&message_id, rows).await {
            self.discard_content(&message_id).await;
            return Err(e);
        }
        let message = match self.store.enqueue(new_message).await {
            Ok(message) => message,
            Err(e) => {
                self.discard_content(&message_id).await;
                return Err(e.into());
            }
        };
        debug!(
            outbox = outbox_ref,
            method,
            group_id,
            index = message.index,
            "Enqueued outbox message with content stream"
        );
        self.signal.notify();
        Ok(message)
    }

    fn serialize_content<C: Serialize + ?Sized>(
        &self,
        method: &str,
        group_id: &str,
        content: &C,
    ) -> Result<String, OutboxError> {
        let serialized = serde_json::to_string(content)?;
        if serialized.len() > self.config.max_document_size() {
            return Err(OutboxError::ContentTooLarge {
                method: method.to_string(),
                group_id: group_id.to_string(),
                size: serialized.len(),
                max: self.config.max_document_size(),
            });
        }
        Ok(serialized)
    }

    async fn discard_content(&self, message_id: &str) {
        if let Err(e) = self.content.remove(message_id).await {
            warn!(message_id, "Failed to remove orphaned content stream: {}", e);
        }
    }
}
