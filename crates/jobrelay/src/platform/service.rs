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

//! # Engine Platform Service
//!
//! Applies worker lifecycle calls to the Engine/Job pair. Each transition runs
//! in one [`Transaction`](crate::store::Transaction): the job update, the
//! engine update and the result cleanup either all commit or none do. Domain
//! events are published only after the commit.
//!
//! ## Result generations
//!
//! Results carry the job revision that produced them. Completion advances
//! `Engine::job_revision` to that value and purges anything older. Cancel,
//! fault and restart leave the revision alone and purge anything newer, which
//! can only be partial output of the discarded attempt.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::api::{
    IncrementCorpusSizeRequest, JobCanceledRequest, JobCompletedRequest, JobFaultedRequest,
    JobRestartingRequest, JobStartedRequest, JobStatistics, PlatformApi, ResultRequestStream,
    UpdateJobExecutionDataRequest, UpdateJobStatusRequest,
};
use super::events::EventPublisher;
use crate::config::PlatformConfig;
use crate::error::{PlatformError, RpcStatus};
use crate::models::{DomainEvent, Engine, Job, JobResult, JobState};
use crate::store::{DataAccessContext, Filter, Repository, Transaction, Update};

/// Rounds a progress percentage to 4 decimal places.
fn round_percent(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Platform state machine for engines producing results of type `R`.
pub struct EnginePlatformService<R: JobResult> {
    context: Arc<dyn DataAccessContext>,
    engines: Arc<dyn Repository<Engine>>,
    jobs: Arc<dyn Repository<Job>>,
    results: Arc<dyn Repository<R>>,
    publisher: Arc<dyn EventPublisher>,
    config: PlatformConfig,
}

impl<R: JobResult> EnginePlatformService<R> {
    pub fn new(
        context: Arc<dyn DataAccessContext>,
        engines: Arc<dyn Repository<Engine>>,
        jobs: Arc<dyn Repository<Job>>,
        results: Arc<dyn Repository<R>>,
        publisher: Arc<dyn EventPublisher>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            context,
            engines,
            jobs,
            results,
            publisher,
            config,
        }
    }

    pub async fn job_started(&self, job_id: &str) -> Result<(), PlatformError> {
        let tx = self.context.begin_transaction().await?;
        let job = self
            .update_job(&tx, job_id, Update::new(|job: &mut Job| job.state = JobState::Active))
            .await?;
        let engine = self
            .update_engine(
                &tx,
                &job.engine_ref,
                Update::new(|engine: &mut Engine| engine.is_job_running = true),
            )
            .await?;
        tx.commit();

        info!(job_id, engine_id = %engine.id, "Job started");
        self.publish(DomainEvent::JobStarted {
            job_id: job.id,
            engine_id: engine.id,
            owner: engine.owner,
            engine_type: engine.engine_type,
        })
        .await;
        Ok(())
    }

    pub async fn job_completed(
        &self,
        job_id: &str,
        statistics: JobStatistics,
    ) -> Result<(), PlatformError> {
        let finished = Utc::now();
        let tx = self.context.begin_transaction().await?;
        let job = self
            .update_job(
                &tx,
                job_id,
                Update::new(move |job: &mut Job| {
                    job.state = JobState::Completed;
                    job.message = Some("Completed".to_string());
                    job.date_finished = Some(finished);
                }),
            )
            .await?;
        let engine = self
            .update_engine(
                &tx,
                &job.engine_ref,
                Update::new(move |engine: &mut Engine| {
                    if let Some(confidence) = statistics.confidence {
                        engine.confidence = confidence;
                    }
                    if let Some(corpus_size) = statistics.corpus_size {
                        engine.corpus_size = corpus_size;
                    }
                    engine.is_job_running = false;
                    engine.job_revision += 1;
                }),
            )
            .await?;

        let current = engine.job_revision;
        let engine_id = engine.id.clone();
        let purged = self
            .results
            .delete_all(
                Some(&tx),
                Filter::new(move |r: &R| r.engine_ref() == engine_id && r.job_revision() < current),
            )
            .await?;
        tx.commit();

        info!(
            job_id,
            engine_id = %engine.id,
            job_revision = current,
            purged,
            "Job completed"
        );
        self.publish_finished(job, engine).await;
        Ok(())
    }

    pub async fn job_canceled(&self, job_id: &str) -> Result<(), PlatformError> {
        self.finish_unsuccessfully(job_id, JobState::Canceled, "Canceled".to_string())
            .await
    }

    pub async fn job_faulted(&self, job_id: &str, message: &str) -> Result<(), PlatformError> {
        self.finish_unsuccessfully(job_id, JobState::Faulted, message.to_string())
            .await
    }

    /// Puts a job back to Pending. The engine is only read; no event is published.
    pub async fn job_restarting(&self, job_id: &str) -> Result<(), PlatformError> {
        let tx = self.context.begin_transaction().await?;
        let job = self
            .update_job(
                &tx,
                job_id,
                Update::new(|job: &mut Job| {
                    job.state = JobState::Pending;
                    job.message = Some("Restarting".to_string());
                    job.percent_completed = Some(0.0);
                }),
            )
            .await?;
        let engine = self
            .engines
            .get_by_id(&job.engine_ref)
            .await?
            .ok_or_else(|| PlatformError::engine_not_found(&job.engine_ref))?;
        let purged = self.purge_in_flight_results(&tx, &engine).await?;
        tx.commit();

        info!(job_id, engine_id = %engine.id, purged, "Job restarting");
        Ok(())
    }

    /// Applies a progress report. Reports for jobs that are no longer in
    /// progress, or that no longer exist, are ignored.
    pub async fn update_job_status(
        &self,
        request: UpdateJobStatusRequest,
    ) -> Result<(), PlatformError> {
        let job_id = request.job_id.clone();
        let filter = Filter::new(move |job: &Job| job.id == job_id && job.state.is_in_progress());
        let updated = self
            .jobs
            .update(
                None,
                filter,
                Update::new(move |job: &mut Job| {
                    job.step = request.step;
                    if let Some(percent) = request.percent_completed {
                        job.percent_completed = Some(round_percent(percent));
                    }
                    if let Some(message) = &request.message {
                        job.message = Some(message.clone());
                    }
                    if let Some(queue_depth) = request.queue_depth {
                        job.queue_depth = Some(queue_depth);
                    }
                }),
            )
            .await?;
        if updated.is_none() {
            debug!("Ignored status update for a job that is not in progress");
        }
        Ok(())
    }

    /// Stores streamed result rows and returns how many were inserted.
    ///
    /// Rows are tagged with the engine's next job revision, resolved once per
    /// engine, and flushed in batches of the configured size.
    pub async fn insert_results(
        &self,
        mut requests: ResultRequestStream,
    ) -> Result<usize, PlatformError> {
        let batch_size = self.config.result_insert_batch_size();
        let mut revisions: HashMap<String, i64> = HashMap::new();
        let mut batch: Vec<R> = Vec::with_capacity(batch_size);
        let mut inserted = 0;

        while let Some(request) = requests.next().await {
            let request = request.map_err(PlatformError::Stream)?;
            let revision = match revisions.get(&request.engine_id) {
                Some(revision) => *revision,
                None => {
                    let engine = self
                        .engines
                        .get_by_id(&request.engine_id)
                        .await?
                        .ok_or_else(|| PlatformError::engine_not_found(&request.engine_id))?;
                    let revision = engine.job_revision + 1;
                    revisions.insert(request.engine_id.clone(), revision);
                    revision
                }
            };
            batch.push(R::from_content(&request.engine_id, revision, &request.content)?);

            if batch.len() >= batch_size {
                inserted += self.flush(&mut batch).await?;
            }
        }
        if !batch.is_empty() {
            inserted += self.flush(&mut batch).await?;
        }

        debug!(kind = R::KIND, inserted, "Inserted results");
        Ok(inserted)
    }

    pub async fn increment_engine_corpus_size(
        &self,
        engine_id: &str,
        count: i64,
    ) -> Result<(), PlatformError> {
        self.engines
            .update(
                None,
                Filter::by_id(engine_id),
                Update::new(move |engine: &mut Engine| engine.corpus_size += count),
            )
            .await?
            .ok_or_else(|| PlatformError::engine_not_found(engine_id))?;
        Ok(())
    }

    /// Merges key/value pairs into the job's execution data.
    pub async fn update_job_execution_data(
        &self,
        job_id: &str,
        execution_data: HashMap<String, String>,
    ) -> Result<(), PlatformError> {
        self.jobs
            .update(
                None,
                Filter::by_id(job_id),
                Update::new(move |job: &mut Job| {
                    job.execution_data
                        .extend(execution_data.iter().map(|(k, v)| (k.clone(), v.clone())));
                }),
            )
            .await?
            .ok_or_else(|| PlatformError::job_not_found(job_id))?;
        Ok(())
    }

    async fn finish_unsuccessfully(
        &self,
        job_id: &str,
        state: JobState,
        message: String,
    ) -> Result<(), PlatformError> {
        let finished = Utc::now();
        let tx = self.context.begin_transaction().await?;
        let job = self
            .update_job(
                &tx,
                job_id,
                Update::new(move |job: &mut Job| {
                    job.state = state;
                    job.message = Some(message.clone());
                    job.date_finished = Some(finished);
                }),
            )
            .await?;
        let engine = self
            .update_engine(
                &tx,
                &job.engine_ref,
                Update::new(|engine: &mut Engine| engine.is_job_running = false),
            )
            .await?;
        let purged = self.purge_in_flight_results(&tx, &engine).await?;
        tx.commit();

        info!(
            job_id,
            engine_id = %engine.id,
            state = state.as_str(),
            purged,
            "Job finished"
        );
        self.publish_finished(job, engine).await;
        Ok(())
    }

    async fn update_job(
        &self,
        tx: &Transaction,
        job_id: &str,
        update: Update<Job>,
    ) -> Result<Job, PlatformError> {
        self.jobs
            .update(Some(tx), Filter::by_id(job_id), update)
            .await?
            .ok_or_else(|| PlatformError::job_not_found(job_id))
    }

    async fn update_engine(
        &self,
        tx: &Transaction,
        engine_id: &str,
        update: Update<Engine>,
    ) -> Result<Engine, PlatformError> {
        self.engines
            .update(Some(tx), Filter::by_id(engine_id), update)
            .await?
            .ok_or_else(|| PlatformError::engine_not_found(engine_id))
    }

    /// Deletes results newer than the engine's current generation.
    async fn purge_in_flight_results(
        &self,
        tx: &Transaction,
        engine: &Engine,
    ) -> Result<usize, PlatformError> {
        let engine_id = engine.id.clone();
        let current = engine.job_revision;
        Ok(self
            .results
            .delete_all(
                Some(tx),
                Filter::new(move |r: &R| r.engine_ref() == engine_id && r.job_revision() > current),
            )
            .await?)
    }

    /// Writes a batch, replacing rows an earlier delivery of the same stream
    /// already stored.
    async fn flush(&self, batch: &mut Vec<R>) -> Result<usize, PlatformError> {
        let rows = Arc::new(std::mem::take(batch));
        let tx = self.context.begin_transaction().await?;
        let existing = Arc::clone(&rows);
        let replaced = self
            .results
            .delete_all(
                Some(&tx),
                Filter::new(move |stored: &R| existing.iter().any(|row| row.is_same_row(stored))),
            )
            .await?;
        let inserted = self.results.insert_all(Some(&tx), rows.to_vec()).await?.len();
        tx.commit();

        if replaced > 0 {
            debug!(kind = R::KIND, replaced, "Replaced previously delivered results");
        }
        Ok(inserted)
    }

    async fn publish_finished(&self, job: Job, engine: Engine) {
        self.publish(DomainEvent::JobFinished {
            job_id: job.id,
            engine_id: engine.id,
            owner: engine.owner,
            engine_type: engine.engine_type,
            state: job.state,
            message: job.message,
            date_finished: job.date_finished.unwrap_or_else(Utc::now),
        })
        .await;
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            warn!(
                event_type = event.event_type().as_str(),
                job_id = event.job_id(),
                "Failed to publish domain event: {}",
                e
            );
        }
    }
}

#[async_trait]
impl<R: JobResult> PlatformApi for EnginePlatformService<R> {
    async fn job_started(&self, request: JobStartedRequest) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::job_started(self, &request.job_id).await?)
    }

    async fn job_completed(&self, request: JobCompletedRequest) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::job_completed(self, &request.job_id, request.statistics).await?)
    }

    async fn job_canceled(&self, request: JobCanceledRequest) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::job_canceled(self, &request.job_id).await?)
    }

    async fn job_faulted(&self, request: JobFaultedRequest) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::job_faulted(self, &request.job_id, &request.message).await?)
    }

    async fn job_restarting(&self, request: JobRestartingRequest) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::job_restarting(self, &request.job_id).await?)
    }

    async fn update_job_status(&self, request: UpdateJobStatusRequest) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::update_job_status(self, request).await?)
    }

    async fn insert_results(&self, requests: ResultRequestStream) -> Result<(), RpcStatus> {
        EnginePlatformService::insert_results(self, requests).await?;
        Ok(())
    }

    async fn increment_engine_corpus_size(
        &self,
        request: IncrementCorpusSizeRequest,
    ) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::increment_engine_corpus_size(
            self,
            &request.engine_id,
            request.count,
        )
        .await?)
    }

    async fn update_job_execution_data(
        &self,
        request: UpdateJobExecutionDataRequest,
    ) -> Result<(), RpcStatus> {
        Ok(EnginePlatformService::update_job_execution_data(
            self,
            &request.job_id,
            request.execution_data,
        )
        .await?)
    }
}
