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

//! Client-facing engine operations.

use std::sync::Arc;
use tracing::info;

use crate::error::ServiceError;
use crate::models::{Engine, Job, JobResult, JobState, ResultFilter};
use crate::store::{DataAccessContext, Filter, Repository};

fn engine_not_found(id: &str) -> ServiceError {
    ServiceError::NotFound {
        entity: "engine",
        id: id.to_string(),
    }
}

pub struct EngineService<R: JobResult> {
    context: Arc<dyn DataAccessContext>,
    engines: Arc<dyn Repository<Engine>>,
    jobs: Arc<dyn Repository<Job>>,
    results: Arc<dyn Repository<R>>,
}

impl<R: JobResult> EngineService<R> {
    pub fn new(
        context: Arc<dyn DataAccessContext>,
        engines: Arc<dyn Repository<Engine>>,
        jobs: Arc<dyn Repository<Job>>,
        results: Arc<dyn Repository<R>>,
    ) -> Self {
        Self {
            context,
            engines,
            jobs,
            results,
        }
    }

    pub async fn create(&self, engine: Engine) -> Result<Engine, ServiceError> {
        let engine = self.engines.insert(None, engine).await?;
        info!(engine_id = %engine.id, engine_type = %engine.engine_type, "Created engine");
        Ok(engine)
    }

    pub async fn get(&self, id: &str) -> Result<Engine, ServiceError> {
        self.engines
            .get_by_id(id)
            .await?
            .ok_or_else(|| engine_not_found(id))
    }

    pub async fn get_all(&self, owner: &str) -> Result<Vec<Engine>, ServiceError> {
        let owner = owner.to_string();
        Ok(self
            .engines
            .get_all(Filter::new(move |engine: &Engine| engine.owner == owner))
            .await?)
    }

    /// Inserts a Pending job for the engine.
    ///
    /// Fails with `JobAlreadyRunning` if the engine has a Pending or Active
    /// job. The check and the insert share a transaction, so two concurrent
    /// starts cannot both succeed.
    pub async fn start_job(&self, engine_id: &str, mut job: Job) -> Result<Job, ServiceError> {
        let tx = self.context.begin_transaction().await?;
        if !self.engines.exists(Filter::by_id(engine_id)).await? {
            return Err(engine_not_found(engine_id));
        }
        if self.jobs.exists(Job::active_filter(engine_id)).await? {
            return Err(ServiceError::JobAlreadyRunning {
                engine_id: engine_id.to_string(),
            });
        }

        job.engine_ref = engine_id.to_string();
        job.state = JobState::Pending;
        let job = self.jobs.insert(Some(&tx), job).await?;
        tx.commit();

        info!(engine_id, job_id = %job.id, "Started job");
        Ok(job)
    }

    /// Deletes the engine with all of its jobs and results.
    pub async fn delete(&self, id: &str) -> Result<Engine, ServiceError> {
        let tx = self.context.begin_transaction().await?;
        let engine = self
            .engines
            .delete(Some(&tx), Filter::by_id(id))
            .await?
            .ok_or_else(|| engine_not_found(id))?;

        let engine_id = engine.id.clone();
        let jobs = self
            .jobs
            .delete_all(
                Some(&tx),
                Filter::new(move |job: &Job| job.engine_ref == engine_id),
            )
            .await?;
        let engine_id = engine.id.clone();
        let results = self
            .results
            .delete_all(
                Some(&tx),
                Filter::new(move |r: &R| r.engine_ref() == engine_id),
            )
            .await?;
        tx.commit();

        info!(engine_id = %engine.id, jobs, results, "Deleted engine");
        Ok(engine)
    }

    /// The engine's current generation of results, optionally narrowed.
    pub async fn get_results(
        &self,
        engine_id: &str,
        filter: Option<ResultFilter>,
    ) -> Result<Vec<R>, ServiceError> {
        let engine = self.get(engine_id).await?;
        Ok(self
            .results
            .get_all(ResultFilter::for_engine(engine_id, engine.job_revision, filter))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pretranslation;
    use crate::store::{MemoryDataAccessContext, MemoryRepository};

    struct Harness {
        jobs: MemoryRepository<Job>,
        results: MemoryRepository<Pretranslation>,
        service: EngineService<Pretranslation>,
    }

    fn harness() -> Harness {
        let jobs = MemoryRepository::new();
        let results = MemoryRepository::new();
        let service = EngineService::new(
            Arc::new(MemoryDataAccessContext::new()),
            Arc::new(MemoryRepository::<Engine>::new()),
            Arc::new(jobs.clone()),
            Arc::new(results.clone()),
        );
        Harness {
            jobs,
            results,
            service,
        }
    }

    fn pretranslation(engine_id: &str, job_revision: i64, text_id: &str) -> Pretranslation {
        Pretranslation {
            engine_ref: engine_id.to_string(),
            job_revision,
            corpus_ref: "c0".to_string(),
            text_id: text_id.to_string(),
            refs: vec!["1:1".to_string()],
            translation: "x".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_only_one_job_in_progress() {
        let h = harness();
        let engine = h.service.create(Engine::new("client1", "nmt")).await.unwrap();

        let job = h.service.start_job(&engine.id, Job::new("")).await.unwrap();
        assert_eq!(job.engine_ref, engine.id);
        assert_eq!(job.state, JobState::Pending);

        let err = h
            .service
            .start_job(&engine.id, Job::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::JobAlreadyRunning { .. }));
        assert_eq!(h.jobs.get_all(Filter::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_job_on_missing_engine() {
        let h = harness();
        let err = h.service.start_job("missing", Job::new("")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "engine", .. }));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let h = harness();
        let engine = h
            .service
            .create(Engine::new("client1", "nmt").with_id("e0"))
            .await
            .unwrap();
        h.service.create(Engine::new("client1", "nmt").with_id("e1")).await.unwrap();
        h.service.start_job("e0", Job::new("")).await.unwrap();
        h.service.start_job("e1", Job::new("")).await.unwrap();
        h.results
            .insert_all(
                None,
                vec![pretranslation("e0", 0, "MAT"), pretranslation("e1", 0, "MAT")],
            )
            .await
            .unwrap();

        h.service.delete(&engine.id).await.unwrap();

        assert!(h.service.get("e0").await.is_err());
        assert_eq!(h.service.get_all("client1").await.unwrap().len(), 1);
        let jobs = h.jobs.get_all(Filter::all()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].engine_ref, "e1");
        let results = h.results.get_all(Filter::all()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].engine_ref, "e1");
    }

    #[tokio::test]
    async fn test_get_results_returns_current_generation() {
        let h = harness();
        h.service
            .create(Engine::new("client1", "nmt").with_id("e0"))
            .await
            .unwrap();
        h.results
            .insert_all(
                None,
                vec![
                    pretranslation("e0", 0, "MAT"),
                    pretranslation("e0", 0, "MRK"),
                    pretranslation("e0", 1, "MAT"),
                ],
            )
            .await
            .unwrap();

        let all = h.service.get_results("e0", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = h
            .service
            .get_results(
                "e0",
                Some(ResultFilter::TextIds {
                    text_ids: vec!["MRK".to_string()],
                }),
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text_id, "MRK");
    }
}
