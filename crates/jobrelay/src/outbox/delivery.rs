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

//! Outbox delivery dispatcher.
//!
//! A pass reads every pending message, partitions them by
//! `(outbox_ref, group_id)` and sorts each group by index. Only the head of a
//! group is attempted, so a later message never overtakes an earlier one.
//!
//! The run loop executes one pass at a time. A completed pass that delivered
//! or dropped anything is followed at once by the next, so a backlog drains
//! without waiting. A pass that moved nothing idles for the poll interval; an
//! aborted or failed pass backs off, doubling from the initial backoff up to
//! the maximum. An enqueue wakes it in either case.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::consumer::ConsumerRegistry;
use super::content::{ContentStore, RecordStream};
use super::metrics::{self, DropReason};
use super::signal::DeliverySignal;
use super::store::OutboxStore;
use crate::config::OutboxConfig;
use crate::error::{DeliveryError, FailureKind, OutboxError};
use crate::models::OutboxMessage;

/// Result of a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every group was visited.
    Completed,
    /// The pass stopped early because an endpoint was unreachable.
    Aborted,
}

/// Outcome of a pass and how many messages left the store during it.
struct PassSummary {
    outcome: PassOutcome,
    removed: usize,
}

/// What to do with the rest of a group after handling its head.
enum GroupStep {
    /// The head is gone without delivery; the next message is the new head.
    Advance,
    /// The head was delivered. The rest of the group waits for the next pass.
    Delivered,
    /// Stop with this group for the pass.
    Stop,
    /// Stop the entire pass.
    AbortPass,
}

pub struct OutboxDeliveryService {
    store: Arc<dyn OutboxStore>,
    consumers: ConsumerRegistry,
    content: ContentStore,
    config: OutboxConfig,
    signal: Arc<DeliverySignal>,
}

impl OutboxDeliveryService {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        consumers: ConsumerRegistry,
        config: OutboxConfig,
        signal: Arc<DeliverySignal>,
    ) -> Self {
        Self {
            store,
            consumers,
            content: ContentStore::new(config.outbox_dir()),
            config,
            signal,
        }
    }

    pub fn signal(&self) -> Arc<DeliverySignal> {
        Arc::clone(&self.signal)
    }

    /// Spawns the run loop on the tokio runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs dispatch passes until the signal is shut down.
    ///
    /// Shutdown is honored between passes; a started pass runs to completion.
    pub async fn run(&self) {
        info!("Outbox delivery service started");
        let mut backoff: Option<Duration> = None;

        while !self.signal.is_shutdown() {
            let wait = match self.dispatch_pass().await {
                Ok(PassSummary {
                    outcome: PassOutcome::Completed,
                    removed,
                }) => {
                    backoff = None;
                    if removed > 0 {
                        continue;
                    }
                    self.config.poll_interval()
                }
                Ok(PassSummary {
                    outcome: PassOutcome::Aborted,
                    ..
                }) => self.next_backoff(&mut backoff),
                Err(e) => {
                    error!("Outbox dispatch pass failed: {}", e);
                    self.next_backoff(&mut backoff)
                }
            };
            self.signal.wait(wait).await;
        }

        info!("Outbox delivery service stopped");
    }

    fn next_backoff(&self, current: &mut Option<Duration>) -> Duration {
        let next = match *current {
            None => self.config.initial_retry_backoff(),
            Some(previous) => previous
                .saturating_mul(2)
                .min(self.config.max_retry_backoff()),
        };
        *current = Some(next);
        debug!(backoff_secs = next.as_secs_f64(), "Backing off outbox delivery");
        next
    }

    /// Runs a single dispatch pass.
    ///
    /// Returns an error only for failures of the outbox itself, such as a
    /// store error or a message with no registered consumer.
    pub async fn process_messages(&self) -> Result<PassOutcome, OutboxError> {
        Ok(self.dispatch_pass().await?.outcome)
    }

    async fn dispatch_pass(&self) -> Result<PassSummary, OutboxError> {
        let messages = self.store.list_pending().await?;
        if messages.is_empty() {
            return Ok(PassSummary {
                outcome: PassOutcome::Completed,
                removed: 0,
            });
        }
        debug!(pending = messages.len(), "Starting outbox dispatch pass");

        let now = Utc::now();
        let timeout = self.config.message_expiration_timeout();
        let mut removed = 0;

        for group in partition_into_groups(messages) {
            for message in group {
                let step = if message.is_expired(now, timeout) {
                    self.drop_message(&message, DropReason::Expired, None).await?;
                    GroupStep::Advance
                } else {
                    self.attempt(&message).await?
                };

                match step {
                    GroupStep::Advance => {
                        removed += 1;
                        continue;
                    }
                    GroupStep::Delivered => {
                        removed += 1;
                        break;
                    }
                    GroupStep::Stop => break,
                    GroupStep::AbortPass => {
                        metrics::record_pass_aborted();
                        return Ok(PassSummary {
                            outcome: PassOutcome::Aborted,
                            removed: 0,
                        });
                    }
                }
            }
        }

        Ok(PassSummary {
            outcome: PassOutcome::Completed,
            removed,
        })
    }

    async fn attempt(&self, message: &OutboxMessage) -> Result<GroupStep, OutboxError> {
        let consumer = self
            .consumers
            .get(&message.outbox_ref, &message.method)
            .ok_or_else(|| OutboxError::ConsumerNotRegistered {
                outbox_ref: message.outbox_ref.clone(),
                method: message.method.clone(),
            })?;

        let result = match self.open_stream(message).await {
            Ok(stream) => {
                consumer
                    .handle_message(&message.group_id, message.content.as_deref(), stream)
                    .await
            }
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(()) => {
                self.complete(message).await?;
                return Ok(GroupStep::Delivered);
            }
            Err(error) => error,
        };

        match error.failure_kind() {
            FailureKind::Unavailable => {
                warn!(
                    outbox = %message.outbox_ref,
                    method = %message.method,
                    group_id = %message.group_id,
                    "Endpoint unavailable, aborting dispatch pass: {}",
                    error
                );
                Ok(GroupStep::AbortPass)
            }
            FailureKind::Transient => {
                warn!(
                    outbox = %message.outbox_ref,
                    method = %message.method,
                    group_id = %message.group_id,
                    message_id = %message.id,
                    attempts = message.attempts + 1,
                    "Delivery failed, will retry: {}",
                    error
                );
                self.store.increment_attempts(&message.id).await?;
                metrics::record_delivery_failure(&message.outbox_ref, &message.method);
                Ok(GroupStep::Stop)
            }
            FailureKind::Permanent => {
                self.drop_message(message, DropReason::Permanent, Some(&error))
                    .await?;
                Ok(GroupStep::Advance)
            }
        }
    }

    async fn open_stream(
        &self,
        message: &OutboxMessage,
    ) -> Result<Option<RecordStream>, DeliveryError> {
        if !message.has_content_stream {
            return Ok(None);
        }
        Ok(Some(self.content.open(&message.id).await?))
    }

    async fn complete(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        self.store.delete(&message.id).await?;
        self.remove_content(message).await;
        metrics::record_delivered(&message.outbox_ref, &message.method);
        debug!(
            outbox = %message.outbox_ref,
            method = %message.method,
            group_id = %message.group_id,
            index = message.index,
            "Delivered outbox message"
        );
        Ok(())
    }

    async fn drop_message(
        &self,
        message: &OutboxMessage,
        reason: DropReason,
        cause: Option<&DeliveryError>,
    ) -> Result<(), OutboxError> {
        error!(
            outbox = %message.outbox_ref,
            method = %message.method,
            group_id = %message.group_id,
            message_id = %message.id,
            attempts = message.attempts,
            created_at = %message.created_at,
            reason = reason.as_str(),
            cause = ?cause.map(|e| e.to_string()),
            "Dropping undeliverable outbox message"
        );
        self.store.delete(&message.id).await?;
        self.remove_content(message).await;
        metrics::record_dropped(&message.outbox_ref, &message.method, reason);
        Ok(())
    }

    async fn remove_content(&self, message: &OutboxMessage) {
        if !message.has_content_stream {
            return;
        }
        if let Err(e) = self.content.remove(&message.id).await {
            warn!(message_id = %message.id, "Failed to remove content stream: {}", e);
        }
    }
}

/// Groups messages by `(outbox_ref, group_id)`, each sorted by index.
///
/// Groups are returned in order of their lowest index.
fn partition_into_groups(mut messages: Vec<OutboxMessage>) -> Vec<Vec<OutboxMessage>> {
    messages.sort_by_key(|m| m.index);

    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut groups: Vec<Vec<OutboxMessage>> = Vec::new();
    for message in messages {
        let key = (message.outbox_ref.clone(), message.group_id.clone());
        match positions.get(&key) {
            Some(&position) => groups[position].push(message),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![message]);
            }
        }
    }
    groups
}
