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

//! Outbox consumers and their registry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use super::content::RecordStream;
use crate::error::DeliveryError;

/// Delivers messages of one `(outbox_ref, method)` pair.
///
/// Delivery is at-least-once: a consumer may see the same message again after
/// a crash or a transient failure, and must tolerate it.
#[async_trait]
pub trait OutboxConsumer: Send + Sync {
    fn outbox_ref(&self) -> &str;

    fn method(&self) -> &str;

    async fn handle_message(
        &self,
        group_id: &str,
        content: Option<&str>,
        stream: Option<RecordStream>,
    ) -> Result<(), DeliveryError>;
}

/// Decodes message content. Missing content decodes as JSON `null`.
pub fn decode_content<T: DeserializeOwned>(content: Option<&str>) -> Result<T, DeliveryError> {
    Ok(serde_json::from_str(content.unwrap_or("null"))?)
}

/// Maps `(outbox_ref, method)` to the consumer that delivers it.
#[derive(Default, Clone)]
pub struct ConsumerRegistry {
    consumers: HashMap<(String, String), Arc<dyn OutboxConsumer>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer, replacing any previous one for the same pair.
    pub fn register(&mut self, consumer: Arc<dyn OutboxConsumer>) {
        let key = (
            consumer.outbox_ref().to_string(),
            consumer.method().to_string(),
        );
        self.consumers.insert(key, consumer);
    }

    pub fn get(&self, outbox_ref: &str, method: &str) -> Option<Arc<dyn OutboxConsumer>> {
        self.consumers
            .get(&(outbox_ref.to_string(), method.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
