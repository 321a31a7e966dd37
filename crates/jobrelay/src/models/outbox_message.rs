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

//! Outbox Message Model
//!
//! An outbox message is a pending remote call. Messages sharing a `group_id`
//! are delivered in ascending `index` order; the index is assigned by the
//! store when the message is enqueued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending remote call (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Unique identifier; also names the content stream file
    pub id: String,
    /// Logical outbox the message belongs to
    pub outbox_ref: String,
    /// Target operation within the outbox
    pub method: String,
    /// Ordering partition, usually the engine the call is about
    pub group_id: String,
    /// Sequence number within `(outbox_ref, group_id)`
    pub index: i64,
    /// Serialized payload
    pub content: Option<String>,
    /// Whether a content stream file accompanies the message
    pub has_content_stream: bool,
    /// Failed delivery attempts that reached the consumer
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Whether the message is older than `timeout` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => self.created_at < now - timeout,
            Err(_) => false,
        }
    }
}

/// Structure for enqueueing new outbox messages (domain type).
///
/// `index` and `attempts` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutboxMessage {
    pub id: String,
    pub outbox_ref: String,
    pub method: String,
    pub group_id: String,
    pub content: Option<String>,
    pub has_content_stream: bool,
    pub created_at: DateTime<Utc>,
}

impl NewOutboxMessage {
    pub fn new(
        outbox_ref: impl Into<String>,
        method: impl Into<String>,
        group_id: impl Into<String>,
        content: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            outbox_ref: outbox_ref.into(),
            method: method.into(),
            group_id: group_id.into(),
            content,
            has_content_stream: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_content_stream(mut self) -> Self {
        self.has_content_stream = true;
        self
    }

    /// Builds the stored message once the store has assigned an index.
    pub fn into_message(self, index: i64) -> OutboxMessage {
        OutboxMessage {
            id: self.id,
            outbox_ref: self.outbox_ref,
            method: self.method,
            group_id: self.group_id,
            index,
            content: self.content,
            has_content_stream: self.has_content_stream,
            attempts: 0,
            created_at: self.created_at,
        }
    }
}
