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

//! Client-facing job queries, including the long-poll.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::long_poll::{get_newer_revision, AbsentPolicy, PollOutcome};
use crate::config::PlatformConfig;
use crate::error::ServiceError;
use crate::models::{Engine, Job, JobResult};
use crate::store::{DataAccessContext, Filter, Repository, Update};

fn job_not_found(id: &str) -> ServiceError {
    ServiceError::NotFound {
        entity: "job",
        id: id.to_string(),
    }
}

pub struct JobService<R: JobResult> {
    context: Arc<dyn DataAccessContext>,
    engines: Arc<dyn Repository<Engine>>,
    jobs: Arc<dyn Repository<Job>>,
    results: Arc<dyn Repository<R>>,
    config: PlatformConfig,
}

impl<R: JobResult> JobService<R> {
    pub fn new(
        context: Arc<dyn DataAccessContext>,
        engines: Arc<dyn Repository<Engine>>,
        jobs: Arc<dyn Repository<Job>>,
        results: Arc<dyn Repository<R>>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            context,
            engines,
            jobs,
            results,
            config,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Job, ServiceError> {
        self.jobs
            .get_by_id(id)
            .await?
            .ok_or_else(|| job_not_found(id))
    }

    pub async fn get_all(&self, engine_id: &str) -> Result<Vec<Job>, ServiceError> {
        let engine_id = engine_id.to_string();
        Ok(self
            .jobs
            .get_all(Filter::new(move |job: &Job| job.engine_ref == engine_id))
            .await?)
    }

    /// The engine's Pending or Active job, if any.
    pub async fn get_active(&self, engine_id: &str) -> Result<Option<Job>, ServiceError> {
        Ok(self.jobs.get(Job::active_filter(engine_id)).await?)
    }

    pub async fn get_newer_revision(
        &self,
        id: &str,
        min_revision: i64,
        timeout: Duration,
    ) -> Result<PollOutcome<Job>, ServiceError> {
        Ok(get_newer_revision(
            self.jobs.as_ref(),
            Filter::by_id(id),
            min_revision,
            timeout,
            AbsentPolicy::ReturnDelete,
        )
        .await?)
    }

    /// Long-polls the engine's in-progress job, waiting for one to start if
    /// there is none yet.
    pub async fn get_active_newer_revision(
        &self,
        engine_id: &str,
        min_revision: i64,
        timeout: Duration,
    ) -> Result<PollOutcome<Job>, ServiceError> {
        Ok(get_newer_revision(
            self.jobs.as_ref(),
            Job::active_filter(engine_id),
            min_revision,
            timeout,
            AbsentPolicy::WaitForInsert,
        )
        .await?)
    }

    /// Returns the job now, or once it reaches `min_revision`.
    ///
    /// A job that is missing or deleted while waiting is `NotFound`; a wait
    /// that outlasts the configured long-poll timeout is `RequestTimeout`.
    pub async fn get_job(&self, id: &str, min_revision: Option<i64>) -> Result<Job, ServiceError> {
        let Some(min_revision) = min_revision else {
            return self.get(id).await;
        };
        let outcome = self
            .get_newer_revision(id, min_revision, self.config.long_poll_timeout())
            .await?;
        match outcome {
            PollOutcome::Changed(change) if !change.is_delete() => {
                change.entity.ok_or_else(|| job_not_found(id))
            }
            PollOutcome::Changed(_) => Err(job_not_found(id)),
            PollOutcome::TimedOut => Err(ServiceError::RequestTimeout { min_revision }),
        }
    }

    /// Deletes a job. An in-progress job takes its partial results with it and
    /// releases the engine.
    pub async fn delete(&self, id: &str) -> Result<Job, ServiceError> {
        let tx = self.context.begin_transaction().await?;
        let job = self
            .jobs
            .delete(Some(&tx), Filter::by_id(id))
            .await?
            .ok_or_else(|| job_not_found(id))?;

        let mut purged = 0;
        if job.state.is_in_progress() {
            let engine = self
                .engines
                .update(
                    Some(&tx),
                    Filter::by_id(&job.engine_ref),
                    Update::new(|engine: &mut Engine| engine.is_job_running = false),
                )
                .await?;
            if let Some(engine) = engine {
                let engine_id = engine.id.clone();
                let current = engine.job_revision;
                purged += self
                    .results
                    .delete_all(
                        Some(&tx),
                        Filter::new(move |r: &R| {
                            r.engine_ref() == engine_id && r.job_revision() > current
                        }),
                    )
                    .await?;
            }
        }
        let job_id = job.id.clone();
        purged += self
            .results
            .delete_all(
                Some(&tx),
                Filter::new(move |r: &R| r.job_ref() == Some(job_id.as_str())),
            )
            .await?;
        tx.commit();

        debug!(job_id = %job.id, purged, "Deleted job");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssessmentResult, JobState};
    use crate::store::{MemoryDataAccessContext, MemoryRepository};

    struct Harness {
        engines: MemoryRepository<Engine>,
        jobs: MemoryRepository<Job>,
        results: MemoryRepository<AssessmentResult>,
        service: JobService<AssessmentResult>,
    }

    async fn harness(long_poll_timeout: Duration) -> Harness {
        let engines = MemoryRepository::new();
        let jobs = MemoryRepository::new();
        let results = MemoryRepository::new();
        let mut engine = Engine::new("client1", "quality").with_id("e0");
        engine.is_job_running = true;
        engines.insert(None, engine).await.unwrap();
        jobs.insert(None, Job::new("e0").with_id("b0")).await.unwrap();

        let service = JobService::new(
            Arc::new(MemoryDataAccessContext::new()),
            Arc::new(engines.clone()),
            Arc::new(jobs.clone()),
            Arc::new(results.clone()),
            PlatformConfig::builder()
                .long_poll_timeout(long_poll_timeout)
                .build(),
        );
        Harness {
            engines,
            jobs,
            results,
            service,
        }
    }

    fn assessment(job_ref: &str, job_revision: i64) -> AssessmentResult {
        AssessmentResult {
            engine_ref: "e0".to_string(),
            job_revision,
            job_ref: job_ref.to_string(),
            text_id: "MAT".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_job_without_revision_returns_current() {
        let h = harness(Duration::from_secs(40)).await;
        let job = h.service.get_job("b0", None).await.unwrap();
        assert_eq!(job.revision, 1);

        let err = h.service.get_job("missing", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "job", .. }));
    }

    #[tokio::test]
    async fn test_get_job_times_out() {
        let h = harness(Duration::from_millis(20)).await;
        let err = h.service.get_job("b0", Some(2)).await.unwrap_err();
        assert!(matches!(err, ServiceError::RequestTimeout { min_revision: 2 }));
    }

    #[tokio::test]
    async fn test_get_job_on_missing_job_is_not_found_without_waiting() {
        let h = harness(Duration::from_secs(60)).await;
        let start = std::time::Instant::now();
        let err = h.service.get_job("missing", Some(1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_get_active() {
        let h = harness(Duration::from_secs(40)).await;
        assert_eq!(h.service.get_active("e0").await.unwrap().unwrap().id, "b0");

        h.jobs
            .update(
                None,
                Filter::by_id("b0"),
                Update::new(|job: &mut Job| job.state = JobState::Canceled),
            )
            .await
            .unwrap();
        assert!(h.service.get_active("e0").await.unwrap().is_none());
        assert_eq!(h.service.get_all("e0").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_in_progress_job_releases_engine() {
        let h = harness(Duration::from_secs(40)).await;
        h.results
            .insert_all(
                None,
                vec![assessment("old", 0), assessment("b0", 1), assessment("other", 1)],
            )
            .await
            .unwrap();

        h.service.delete("b0").await.unwrap();

        assert!(h.jobs.get_by_id("b0").await.unwrap().is_none());
        assert!(!h.engines.get_by_id("e0").await.unwrap().unwrap().is_job_running);
        let remaining = h.results.get_all(Filter::all()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].job_ref, "old");
    }

    #[tokio::test]
    async fn test_delete_missing_job() {
        let h = harness(Duration::from_secs(40)).await;
        assert!(matches!(
            h.service.delete("missing").await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }
}
