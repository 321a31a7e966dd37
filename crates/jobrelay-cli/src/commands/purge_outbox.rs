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

//! Implementation of the `admin purge-outbox` command.
//!
//! Removes messages that will never be delivered, for example when the
//! platform they were addressed to has been retired.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use jobrelay::outbox::{ContentStore, OutboxStore};
use jobrelay::RelayConfig;
use std::time::Duration;
use tracing::{info, warn};

/// Parses durations such as "48h", "90d" or "7d12h30m".
///
/// Each component is a number followed by one of `d`, `h`, `m` or `s`. Units
/// are case-insensitive and the total must be positive.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    if text.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total_secs: u64 = 0;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            bail!("Invalid duration '{}': expected a number at '{}'", text, rest);
        }
        let value: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("Invalid number in duration '{}'", text))?;
        let unit = rest[digits..]
            .chars()
            .next()
            .ok_or_else(|| anyhow!("Duration '{}' is missing a unit (d, h, m or s)", text))?;
        let scale = match unit.to_ascii_lowercase() {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            other => bail!("Unknown duration unit '{}'. Use d, h, m or s", other),
        };
        total_secs = value
            .checked_mul(scale)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| anyhow!("Duration '{}' is too large", text))?;
        rest = &rest[digits + unit.len_utf8()..];
    }

    if total_secs == 0 {
        bail!("Duration must be greater than zero");
    }
    Ok(Duration::from_secs(total_secs))
}

pub async fn run(
    database_url: &str,
    config: &RelayConfig,
    older_than: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let outbox_config = config.outbox_config();
    let age = match older_than {
        Some(value) => {
            parse_duration(value).with_context(|| format!("Invalid duration: '{}'", value))?
        }
        None => outbox_config.message_expiration_timeout(),
    };
    let cutoff = Utc::now()
        - chrono::Duration::from_std(age).context("Duration is out of range")?;

    let store = super::open_outbox(database_url).await?;
    let expired = store
        .list_created_before(cutoff)
        .await
        .context("Failed to list outbox messages")?;

    if expired.is_empty() {
        info!("No outbox messages created before {}", cutoff);
        return Ok(());
    }
    if dry_run {
        for message in &expired {
            info!(
                message_id = %message.id,
                outbox = %message.outbox_ref,
                method = %message.method,
                group_id = %message.group_id,
                attempts = message.attempts,
                "[DRY RUN] Would delete"
            );
        }
        info!(
            "[DRY RUN] Would delete {} outbox message(s) created before {}",
            expired.len(),
            cutoff
        );
        return Ok(());
    }

    let content = ContentStore::new(outbox_config.outbox_dir());
    let mut deleted = 0;
    for message in &expired {
        if store
            .delete(&message.id)
            .await
            .with_context(|| format!("Failed to delete outbox message {}", message.id))?
        {
            deleted += 1;
        }
        if message.has_content_stream {
            if let Err(e) = content.remove(&message.id).await {
                warn!(message_id = %message.id, "Failed to remove content file: {}", e);
            }
        }
    }
    info!(
        "Deleted {} outbox message(s) created before {}",
        deleted, cutoff
    );

    Ok(())
}
