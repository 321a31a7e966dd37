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

//! Worker-side producer of lifecycle calls.

use futures::Stream;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::api::{
    IncrementCorpusSizeRequest, JobCanceledRequest, JobCompletedRequest, JobFaultedRequest,
    JobRestartingRequest, JobStartedRequest, JobStatistics, PlatformApi, PlatformMethod,
    UpdateJobExecutionDataRequest, UpdateJobStatusRequest,
};
use crate::error::OutboxError;
use crate::models::OutboxMessage;
use crate::outbox::OutboxService;

/// Default outbox name for platform lifecycle calls.
pub const PLATFORM_OUTBOX: &str = "platform";

/// Records lifecycle calls in the outbox, grouped by engine id, so calls about
/// one engine reach the platform in the order they were made.
#[derive(Clone)]
pub struct PlatformOutbox {
    outbox: OutboxService,
    outbox_ref: String,
    direct: Arc<dyn PlatformApi>,
}

impl PlatformOutbox {
    /// `direct` receives the calls that bypass the outbox.
    pub fn new(outbox: OutboxService, direct: Arc<dyn PlatformApi>) -> Self {
        Self::with_outbox_ref(outbox, PLATFORM_OUTBOX, direct)
    }

    pub fn with_outbox_ref(
        outbox: OutboxService,
        outbox_ref: impl Into<String>,
        direct: Arc<dyn PlatformApi>,
    ) -> Self {
        Self {
            outbox,
            outbox_ref: outbox_ref.into(),
            direct,
        }
    }

    pub fn outbox_ref(&self) -> &str {
        &self.outbox_ref
    }

    pub async fn job_started(
        &self,
        engine_id: &str,
        job_id: &str,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::JobStarted,
            engine_id,
            &JobStartedRequest {
                job_id: job_id.to_string(),
            },
        )
        .await
    }

    pub async fn job_completed(
        &self,
        engine_id: &str,
        job_id: &str,
        statistics: JobStatistics,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::JobCompleted,
            engine_id,
            &JobCompletedRequest {
                job_id: job_id.to_string(),
                statistics,
            },
        )
        .await
    }

    pub async fn job_canceled(
        &self,
        engine_id: &str,
        job_id: &str,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::JobCanceled,
            engine_id,
            &JobCanceledRequest {
                job_id: job_id.to_string(),
            },
        )
        .await
    }

    pub async fn job_faulted(
        &self,
        engine_id: &str,
        job_id: &str,
        message: &str,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::JobFaulted,
            engine_id,
            &JobFaultedRequest {
                job_id: job_id.to_string(),
                message: message.to_string(),
            },
        )
        .await
    }

    pub async fn job_restarting(
        &self,
        engine_id: &str,
        job_id: &str,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::JobRestarting,
            engine_id,
            &JobRestartingRequest {
                job_id: job_id.to_string(),
            },
        )
        .await
    }

    /// Streams result rows into a content file. The message content is the engine id.
    pub async fn insert_results<T, S>(
        &self,
        engine_id: &str,
        rows: S,
    ) -> Result<OutboxMessage, OutboxError>
    where
        T: Serialize,
        S: Stream<Item = T>,
    {
        self.outbox
            .enqueue_with_stream(
                &self.outbox_ref,
                PlatformMethod::InsertResults.as_str(),
                engine_id,
                engine_id,
                rows,
            )
            .await
    }

    pub async fn increment_engine_corpus_size(
        &self,
        engine_id: &str,
        count: i64,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::IncrementEngineCorpusSize,
            engine_id,
            &IncrementCorpusSizeRequest {
                engine_id: engine_id.to_string(),
                count,
            },
        )
        .await
    }

    pub async fn update_job_execution_data(
        &self,
        engine_id: &str,
        job_id: &str,
        execution_data: HashMap<String, String>,
    ) -> Result<OutboxMessage, OutboxError> {
        self.enqueue(
            PlatformMethod::UpdateJobExecutionData,
            engine_id,
            &UpdateJobExecutionDataRequest {
                job_id: job_id.to_string(),
                execution_data,
            },
        )
        .await
    }

    /// Sends a progress report directly. A lost report is superseded by the
    /// next one, so failures are only logged.
    pub async fn update_job_status(&self, request: UpdateJobStatusRequest) {
        let job_id = request.job_id.clone();
        if let Err(e) = self.direct.update_job_status(request).await {
            warn!(job_id = %job_id, "Failed to send job status update: {}", e);
        }
    }

    async fn enqueue<C: Serialize>(
        &self,
        method: PlatformMethod,
        engine_id: &str,
        content: &C,
    ) -> Result<OutboxMessage, OutboxError> {
        self.outbox
            .enqueue(&self.outbox_ref, method.as_str(), engine_id, content)
            .await
    }
}
