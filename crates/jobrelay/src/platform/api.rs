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

//! Lifecycle RPC surface of the platform.
//!
//! Workers report job progress through [`PlatformApi`]. The trait returns
//! [`RpcStatus`] so that a remote client and the in-process
//! [`EnginePlatformService`](super::EnginePlatformService) are interchangeable
//! behind the outbox consumers.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RpcStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStartedRequest {
    pub job_id: String,
}

/// Engine statistics reported on completion. Present values overwrite the engine's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub confidence: Option<f64>,
    pub corpus_size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletedRequest {
    pub job_id: String,
    #[serde(default)]
    pub statistics: JobStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCanceledRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFaultedRequest {
    pub job_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRestartingRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub job_id: String,
    pub step: i32,
    pub percent_completed: Option<f64>,
    pub message: Option<String>,
    pub queue_depth: Option<i32>,
}

/// One streamed result row. `content` is the JSON of a single result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertResultsRequest {
    pub engine_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementCorpusSizeRequest {
    pub engine_id: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateJobExecutionDataRequest {
    pub job_id: String,
    pub execution_data: HashMap<String, String>,
}

pub type ResultRequestStream = BoxStream<'static, Result<InsertResultsRequest, RpcStatus>>;

/// Lifecycle calls a worker makes against the platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn job_started(&self, request: JobStartedRequest) -> Result<(), RpcStatus>;

    async fn job_completed(&self, request: JobCompletedRequest) -> Result<(), RpcStatus>;

    async fn job_canceled(&self, request: JobCanceledRequest) -> Result<(), RpcStatus>;

    async fn job_faulted(&self, request: JobFaultedRequest) -> Result<(), RpcStatus>;

    async fn job_restarting(&self, request: JobRestartingRequest) -> Result<(), RpcStatus>;

    /// Advisory progress report. Ignored unless the job is Pending or Active.
    async fn update_job_status(&self, request: UpdateJobStatusRequest) -> Result<(), RpcStatus>;

    async fn insert_results(&self, requests: ResultRequestStream) -> Result<(), RpcStatus>;

    async fn increment_engine_corpus_size(
        &self,
        request: IncrementCorpusSizeRequest,
    ) -> Result<(), RpcStatus>;

    async fn update_job_execution_data(
        &self,
        request: UpdateJobExecutionDataRequest,
    ) -> Result<(), RpcStatus>;
}

/// Outbox method names for the lifecycle calls that are delivered through an outbox.
///
/// `update_job_status` is absent: status reports are sent directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformMethod {
    JobStarted,
    JobCompleted,
    JobCanceled,
    JobFaulted,
    JobRestarting,
    InsertResults,
    IncrementEngineCorpusSize,
    UpdateJobExecutionData,
}

impl PlatformMethod {
    pub const ALL: [PlatformMethod; 8] = [
        PlatformMethod::JobStarted,
        PlatformMethod::JobCompleted,
        PlatformMethod::JobCanceled,
        PlatformMethod::JobFaulted,
        PlatformMethod::JobRestarting,
        PlatformMethod::InsertResults,
        PlatformMethod::IncrementEngineCorpusSize,
        PlatformMethod::UpdateJobExecutionData,
    ];

    /// Returns the string representation of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformMethod::JobStarted => "job_started",
            PlatformMethod::JobCompleted => "job_completed",
            PlatformMethod::JobCanceled => "job_canceled",
            PlatformMethod::JobFaulted => "job_faulted",
            PlatformMethod::JobRestarting => "job_restarting",
            PlatformMethod::InsertResults => "insert_results",
            PlatformMethod::IncrementEngineCorpusSize => "increment_engine_corpus_size",
            PlatformMethod::UpdateJobExecutionData => "update_job_execution_data",
        }
    }

    /// Parses a method from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == s)
    }

    /// Whether messages of this method carry their payload in a content stream.
    pub fn has_content_stream(&self) -> bool {
        matches!(self, PlatformMethod::InsertResults)
    }
}
