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

//! Outbox backlog health check.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::metrics;
use super::store::OutboxStore;
use crate::error::OutboxError;

/// Consecutive over-limit checks tolerated before reporting unhealthy.
const MAX_DEGRADED_CHECKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub pending: usize,
    pub consecutive_failures: usize,
    pub description: Option<String>,
}

/// Reports degraded, then unhealthy, while the backlog stays above the limit.
pub struct OutboxHealthCheck {
    store: Arc<dyn OutboxStore>,
    healthy_message_limit: usize,
    consecutive_failures: AtomicUsize,
}

impl OutboxHealthCheck {
    pub fn new(store: Arc<dyn OutboxStore>, healthy_message_limit: usize) -> Self {
        Self {
            store,
            healthy_message_limit,
            consecutive_failures: AtomicUsize::new(0),
        }
    }

    pub async fn check(&self) -> Result<HealthReport, OutboxError> {
        let pending = self.store.count().await?;
        metrics::record_pending(pending);

        if pending <= self.healthy_message_limit {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return Ok(HealthReport {
                status: HealthStatus::Healthy,
                pending,
                consecutive_failures: 0,
                description: None,
            });
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let status = if failures > MAX_DEGRADED_CHECKS {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        Ok(HealthReport {
            status,
            pending,
            consecutive_failures: failures,
            description: Some(format!(
                "{} pending outbox messages exceed the limit of {}",
                pending, self.healthy_message_limit
            )),
        })
    }
}
