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

//! Job Model
//!
//! A job is one execution attempt against an engine. Its state moves
//! `Pending -> Active -> {Completed | Canceled | Faulted}`, and a restart puts
//! any of those back to `Pending`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::{Entity, Filter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Canceled,
    Faulted,
}

impl JobState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Canceled => "canceled",
            JobState::Faulted => "faulted",
        }
    }

    /// Parses a state from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "canceled" => Some(JobState::Canceled),
            "faulted" => Some(JobState::Faulted),
            _ => None,
        }
    }

    /// Pending or Active. At most one such job exists per engine.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Active)
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Canceled | JobState::Faulted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub revision: i64,
    pub engine_ref: String,
    pub name: Option<String>,
    pub state: JobState,
    pub message: Option<String>,
    pub percent_completed: Option<f64>,
    pub step: i32,
    pub queue_depth: Option<i32>,
    pub date_created: DateTime<Utc>,
    pub date_finished: Option<DateTime<Utc>>,
    /// Opaque key/value data reported by the worker, e.g. corpus line counts
    pub execution_data: HashMap<String, String>,
}

impl Job {
    pub fn new(engine_ref: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            revision: 1,
            engine_ref: engine_ref.into(),
            name: None,
            state: JobState::Pending,
            message: None,
            percent_completed: None,
            step: 0,
            queue_depth: None,
            date_created: Utc::now(),
            date_finished: None,
            execution_data: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Matches the Pending or Active job of an engine.
    pub fn active_filter(engine_id: impl Into<String>) -> Filter<Job> {
        let engine_id = engine_id.into();
        Filter::new(move |job: &Job| job.engine_ref == engine_id && job.state.is_in_progress())
    }
}

impl Entity for Job {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }
}
