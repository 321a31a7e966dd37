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

//! Lifecycle transitions and result generations, driven directly and through
//! the outbox.

use futures::StreamExt;
use jobrelay::models::DomainEventType;
use jobrelay::outbox::{
    ConsumerRegistry, MemoryOutboxStore, OutboxConsumer, OutboxDeliveryService, OutboxService,
    OutboxStore, PassOutcome, RecordStream,
};
use jobrelay::platform::api::{
    InsertResultsRequest, JobStatistics, PlatformMethod, ResultRequestStream,
};
use jobrelay::platform::{
    register_platform_consumers, PlatformApi, PlatformConsumer, PlatformOutbox,
};
use jobrelay::{JobState, OutboxConfig, Pretranslation};
use std::sync::Arc;

use crate::fixtures::{pretranslation_row, PlatformHarness};

fn rows(engine_id: &str, count: usize) -> ResultRequestStream {
    let requests: Vec<_> = (0..count)
        .map(|i| {
            Ok(InsertResultsRequest {
                engine_id: engine_id.to_string(),
                content: pretranslation_row("MAT", &format!("1:{}", i + 1)),
            })
        })
        .collect();
    futures::stream::iter(requests).boxed()
}

async fn insert_at_revision(h: &PlatformHarness, job_revision: i64) {
    let mut row: Pretranslation = serde_json::from_str(&pretranslation_row("MAT", "1:1")).unwrap();
    row.engine_ref = "e0".to_string();
    row.job_revision = job_revision;
    jobrelay::Repository::insert(&h.results, None, row).await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_example() {
    let h = PlatformHarness::new("e0", "b0").await;

    h.platform.job_started("b0").await.unwrap();
    assert_eq!(h.job("b0").await.state, JobState::Active);

    h.platform.job_canceled("b0").await.unwrap();
    assert_eq!(h.job("b0").await.state, JobState::Canceled);
    assert!(!h.engine("e0").await.is_job_running);

    h.platform.job_restarting("b0").await.unwrap();
    assert_eq!(h.job("b0").await.state, JobState::Pending);

    h.platform.insert_results(rows("e0", 1)).await.unwrap();
    let job_revision = h.engine("e0").await.job_revision;
    assert_eq!(h.result_revisions().await, vec![job_revision + 1]);

    h.platform.job_faulted("b0", "Out of memory").await.unwrap();
    let job = h.job("b0").await;
    assert_eq!(job.state, JobState::Faulted);
    assert_eq!(job.message.as_deref(), Some("Out of memory"));
    assert!(h.result_revisions().await.is_empty());
}

#[tokio::test]
async fn test_completion_keeps_only_newest_generation() {
    let h = PlatformHarness::new("e0", "b0").await;
    insert_at_revision(&h, 0).await;
    h.platform.job_started("b0").await.unwrap();
    h.platform.insert_results(rows("e0", 2)).await.unwrap();
    assert_eq!(h.result_revisions().await, vec![0, 1, 1]);

    h.platform
        .job_completed("b0", JobStatistics::default())
        .await
        .unwrap();

    assert_eq!(h.engine("e0").await.job_revision, 1);
    assert_eq!(h.result_revisions().await, vec![1, 1]);
    assert_eq!(h.engine_service.get_results("e0", None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancel_purges_only_in_flight_results() {
    let h = PlatformHarness::new("e0", "b0").await;
    insert_at_revision(&h, 0).await;
    h.platform.job_started("b0").await.unwrap();
    h.platform.insert_results(rows("e0", 3)).await.unwrap();

    h.platform.job_canceled("b0").await.unwrap();

    assert_eq!(h.engine("e0").await.job_revision, 0);
    assert_eq!(h.result_revisions().await, vec![0]);
}

#[tokio::test]
async fn test_fault_purges_only_in_flight_results() {
    let h = PlatformHarness::new("e0", "b0").await;
    insert_at_revision(&h, 0).await;
    h.platform.job_started("b0").await.unwrap();
    h.platform.insert_results(rows("e0", 2)).await.unwrap();

    h.platform.job_faulted("b0", "Out of memory").await.unwrap();

    assert_eq!(h.engine("e0").await.job_revision, 0);
    assert_eq!(h.result_revisions().await, vec![0]);
    assert_eq!(h.engine_service.get_results("e0", None).await.unwrap().len(), 1);
}

fn record_stream(verses: &[&str]) -> RecordStream {
    let rows: Vec<std::io::Result<String>> = verses
        .iter()
        .map(|verse| Ok(pretranslation_row("MAT", verse)))
        .collect();
    futures::stream::iter(rows).boxed()
}

#[tokio::test]
async fn test_redelivered_results_are_stored_once() {
    let h = PlatformHarness::new("e0", "b0").await;
    let consumer =
        PlatformConsumer::new("platform", PlatformMethod::InsertResults, h.platform.clone());
    h.platform.job_started("b0").await.unwrap();

    for _ in 0..2 {
        consumer
            .handle_message("e0", Some("\"e0\""), Some(record_stream(&["1:1", "1:2"])))
            .await
            .unwrap();
    }
    h.platform
        .job_completed("b0", JobStatistics::default())
        .await
        .unwrap();

    let mut refs: Vec<Vec<String>> = h
        .engine_service
        .get_results("e0", None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.refs)
        .collect();
    refs.sort();
    assert_eq!(refs, vec![vec!["1:1".to_string()], vec!["1:2".to_string()]]);
}

#[tokio::test]
async fn test_finish_events_are_published_after_commit() {
    let h = PlatformHarness::new("e0", "b0").await;
    let mut events = h.publisher.subscribe();

    h.platform.job_started("b0").await.unwrap();
    h.platform
        .job_completed("b0", JobStatistics::default())
        .await
        .unwrap();

    let started = events.recv().await.unwrap();
    assert_eq!(started.event_type(), DomainEventType::JobStarted);
    let finished = events.recv().await.unwrap();
    assert_eq!(finished.event_type(), DomainEventType::JobFinished);
    assert_eq!(finished.engine_id(), "e0");
}

#[tokio::test]
async fn test_not_found_leaves_state_untouched() {
    let h = PlatformHarness::new("e0", "b0").await;
    let before = h.job("b0").await;

    let status = PlatformApi::job_started(
        h.platform.as_ref(),
        jobrelay::platform::api::JobStartedRequest {
            job_id: "missing".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(status.message, "The job does not exist.");
    assert_eq!(h.job("b0").await, before);
}

#[tokio::test]
async fn test_worker_calls_reach_platform_through_outbox() {
    let dir = tempfile::tempdir().unwrap();
    let h = PlatformHarness::new("e0", "b0").await;
    let config = OutboxConfig::builder().outbox_dir(dir.path()).build();
    let store = Arc::new(MemoryOutboxStore::new());
    let outbox = OutboxService::new(store.clone(), config.clone());
    let api: Arc<dyn PlatformApi> = h.platform.clone();
    let worker = PlatformOutbox::new(outbox.clone(), api.clone());

    let mut registry = ConsumerRegistry::new();
    register_platform_consumers(&mut registry, worker.outbox_ref(), api);
    let delivery = OutboxDeliveryService::new(store.clone(), registry, config, outbox.signal());

    worker.job_started("e0", "b0").await.unwrap();
    let results: Vec<serde_json::Value> = (1..=2)
        .map(|verse| {
            serde_json::from_str(&pretranslation_row("MAT", &format!("1:{verse}"))).unwrap()
        })
        .collect();
    worker
        .insert_results("e0", futures::stream::iter(results))
        .await
        .unwrap();
    worker
        .job_completed(
            "e0",
            "b0",
            JobStatistics {
                confidence: Some(42.5),
                corpus_size: Some(1_000),
            },
        )
        .await
        .unwrap();

    // One message per pass for the single engine group.
    for _ in 0..3 {
        assert_eq!(
            delivery.process_messages().await.unwrap(),
            PassOutcome::Completed
        );
    }

    assert_eq!(store.count().await.unwrap(), 0);
    let engine = h.engine("e0").await;
    assert_eq!(engine.job_revision, 1);
    assert_eq!(engine.confidence, 42.5);
    assert_eq!(engine.corpus_size, 1_000);
    assert_eq!(h.job("b0").await.state, JobState::Completed);
    assert_eq!(h.result_revisions().await, vec![1, 1]);
}

#[tokio::test]
async fn test_redelivered_start_is_idempotent() {
    let h = PlatformHarness::new("e0", "b0").await;

    h.platform.job_started("b0").await.unwrap();
    h.platform.job_started("b0").await.unwrap();

    assert_eq!(h.job("b0").await.state, JobState::Active);
    assert!(h.engine("e0").await.is_job_running);
}
