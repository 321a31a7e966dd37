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

//! Domain Event Model
//!
//! Events published by the platform after a lifecycle transition commits.
//! Downstream listeners (webhook fan-out, auditing) consume them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    JobStarted {
        job_id: String,
        engine_id: String,
        owner: String,
        engine_type: String,
    },
    JobFinished {
        job_id: String,
        engine_id: String,
        owner: String,
        engine_type: String,
        state: JobState,
        message: Option<String>,
        date_finished: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainEventType {
    JobStarted,
    JobFinished,
}

impl DomainEventType {
    /// Returns the string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventType::JobStarted => "job_started",
            DomainEventType::JobFinished => "job_finished",
        }
    }

    /// Parses an event type from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "job_started" => Some(DomainEventType::JobStarted),
            "job_finished" => Some(DomainEventType::JobFinished),
            _ => None,
        }
    }
}

impl DomainEvent {
    pub fn event_type(&self) -> DomainEventType {
        match self {
            DomainEvent::JobStarted { .. } => DomainEventType::JobStarted,
            DomainEvent::JobFinished { .. } => DomainEventType::JobFinished,
        }
    }

    pub fn engine_id(&self) -> &str {
        match self {
            DomainEvent::JobStarted { engine_id, .. } | DomainEvent::JobFinished { engine_id, .. } => {
                engine_id
            }
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            DomainEvent::JobStarted { job_id, .. } | DomainEvent::JobFinished { job_id, .. } => {
                job_id
            }
        }
    }
}
