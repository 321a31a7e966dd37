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

//! Engine Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Entity;

/// A trainable unit owned by a tenant.
///
/// `job_revision` advances exactly once per successfully completed job and
/// marks which generation of results is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    pub id: String,
    pub revision: i64,
    pub name: Option<String>,
    pub owner: String,
    /// Engine type, e.g. "nmt" or "statistical"
    pub engine_type: String,
    pub is_job_running: bool,
    pub job_revision: i64,
    pub confidence: f64,
    pub corpus_size: i64,
    pub date_created: DateTime<Utc>,
}

impl Engine {
    pub fn new(owner: impl Into<String>, engine_type: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            revision: 1,
            name: None,
            owner: owner.into(),
            engine_type: engine_type.into(),
            is_job_running: false,
            job_revision: 0,
            confidence: 0.0,
            corpus_size: 0,
            date_created: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl Entity for Engine {
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
