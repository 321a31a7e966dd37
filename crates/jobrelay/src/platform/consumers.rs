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

//! Outbox consumers that replay lifecycle calls against a [`PlatformApi`].

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use super::api::{InsertResultsRequest, PlatformApi, PlatformMethod};
use crate::error::{DeliveryError, RpcStatus, StatusCode};
use crate::outbox::{decode_content, ConsumerRegistry, OutboxConsumer, RecordStream};

/// Delivers one [`PlatformMethod`] from an outbox.
pub struct PlatformConsumer {
    outbox_ref: String,
    method: PlatformMethod,
    api: Arc<dyn PlatformApi>,
}

impl PlatformConsumer {
    pub fn new(
        outbox_ref: impl Into<String>,
        method: PlatformMethod,
        api: Arc<dyn PlatformApi>,
    ) -> Self {
        Self {
            outbox_ref: outbox_ref.into(),
            method,
            api,
        }
    }
}

#[async_trait]
impl OutboxConsumer for PlatformConsumer {
    fn outbox_ref(&self) -> &str {
        &self.outbox_ref
    }

    fn method(&self) -> &str {
        self.method.as_str()
    }

    async fn handle_message(
        &self,
        _group_id: &str,
        content: Option<&str>,
        stream: Option<RecordStream>,
    ) -> Result<(), DeliveryError> {
        match self.method {
            PlatformMethod::JobStarted => self.api.job_started(decode_content(content)?).await?,
            PlatformMethod::JobCompleted => {
                self.api.job_completed(decode_content(content)?).await?
            }
            PlatformMethod::JobCanceled => self.api.job_canceled(decode_content(content)?).await?,
            PlatformMethod::JobFaulted => self.api.job_faulted(decode_content(content)?).await?,
            PlatformMethod::JobRestarting => {
                self.api.job_restarting(decode_content(content)?).await?
            }
            PlatformMethod::IncrementEngineCorpusSize => {
                self.api
                    .increment_engine_corpus_size(decode_content(content)?)
                    .await?
            }
            PlatformMethod::UpdateJobExecutionData => {
                self.api
                    .update_job_execution_data(decode_content(content)?)
                    .await?
            }
            PlatformMethod::InsertResults => {
                let engine_id: String = decode_content(content)?;
                let rows = stream.ok_or_else(|| DeliveryError::MissingStream {
                    method: self.method.as_str().to_string(),
                })?;
                let requests = rows
                    .map(move |row| {
                        row.map(|content| InsertResultsRequest {
                            engine_id: engine_id.clone(),
                            content,
                        })
                        .map_err(|e| RpcStatus::new(StatusCode::DataLoss, e.to_string()))
                    })
                    .boxed();
                self.api.insert_results(requests).await?
            }
        }
        Ok(())
    }
}

/// Registers a consumer for every [`PlatformMethod`] of `outbox_ref`.
pub fn register_platform_consumers(
    registry: &mut ConsumerRegistry,
    outbox_ref: &str,
    api: Arc<dyn PlatformApi>,
) {
    for method in PlatformMethod::ALL {
        registry.register(Arc::new(PlatformConsumer::new(
            outbox_ref,
            method,
            Arc::clone(&api),
        )));
    }
}
