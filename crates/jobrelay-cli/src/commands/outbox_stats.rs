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

//! Implementation of the `admin outbox-stats` command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobrelay::outbox::{OutboxHealthCheck, OutboxStore};
use jobrelay::{OutboxMessage, RelayConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Pending messages of one `(outbox, group)`.
#[derive(Debug, PartialEq)]
struct GroupSummary {
    pending: usize,
    max_attempts: i32,
    oldest: DateTime<Utc>,
}

fn summarize(messages: &[OutboxMessage]) -> BTreeMap<(String, String), GroupSummary> {
    let mut groups: BTreeMap<(String, String), GroupSummary> = BTreeMap::new();
    for message in messages {
        groups
            .entry((message.outbox_ref.clone(), message.group_id.clone()))
            .and_modify(|summary| {
                summary.pending += 1;
                summary.max_attempts = summary.max_attempts.max(message.attempts);
                summary.oldest = summary.oldest.min(message.created_at);
            })
            .or_insert(GroupSummary {
                pending: 1,
                max_attempts: message.attempts,
                oldest: message.created_at,
            });
    }
    groups
}

pub async fn run(database_url: &str, config: &RelayConfig) -> Result<()> {
    let store = Arc::new(super::open_outbox(database_url).await?);
    let messages = store
        .list_pending()
        .await
        .context("Failed to list outbox messages")?;

    let groups = summarize(&messages);
    if groups.is_empty() {
        info!("The outbox is empty");
    }
    for ((outbox_ref, group_id), summary) in &groups {
        info!(
            outbox = %outbox_ref,
            group_id = %group_id,
            pending = summary.pending,
            max_attempts = summary.max_attempts,
            oldest = %summary.oldest,
            "Pending group"
        );
    }

    let limit = config.outbox_config().healthy_message_limit();
    let report = OutboxHealthCheck::new(store, limit)
        .check()
        .await
        .context("Failed to check outbox health")?;
    match &report.description {
        Some(description) => info!(status = %report.status, "{}", description),
        None => info!(
            status = %report.status,
            "{} pending outbox message(s), limit {}",
            report.pending,
            limit
        ),
    }

    Ok(())
}
