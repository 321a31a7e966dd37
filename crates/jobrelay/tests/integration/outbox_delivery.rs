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

//! Dispatch pass behavior: ordering, failure classification and expiry.

use chrono::Utc;
use jobrelay::error::{RpcStatus, StatusCode};
use jobrelay::models::NewOutboxMessage;
use jobrelay::outbox::{OutboxStore, PassOutcome};
use jobrelay::OutboxConfig;
use std::time::Duration;

use crate::fixtures::OutboxHarness;

fn raw(group_id: &str, index: i64) -> jobrelay::OutboxMessage {
    NewOutboxMessage::new("platform", "m", group_id, Some(index.to_string())).into_message(index)
}

#[tokio::test]
async fn test_groups_deliver_in_index_order_across_passes() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["m"]);
    for (group_id, index) in [("a", 3), ("b", 2), ("a", 1), ("c", 1), ("b", 1), ("a", 2)] {
        h.store.insert_raw(raw(group_id, index));
    }

    let mut passes = 0;
    while h.store.count().await.unwrap() > 0 {
        assert_eq!(
            h.delivery.process_messages().await.unwrap(),
            PassOutcome::Completed
        );
        passes += 1;
    }

    // One head per group per pass.
    assert_eq!(passes, 3);
    for group_id in ["a", "b", "c"] {
        let indexes: Vec<String> = h
            .calls()
            .into_iter()
            .filter(|c| c.group_id == group_id)
            .filter_map(|c| c.content)
            .collect();
        let mut sorted = indexes.clone();
        sorted.sort();
        assert_eq!(indexes, sorted, "group {group_id}");
    }
}

#[tokio::test]
async fn test_enqueued_calls_keep_producer_order() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["job_started", "job_completed"]);
    h.outbox
        .enqueue("platform", "job_started", "e1", &"b1")
        .await
        .unwrap();
    h.outbox
        .enqueue("platform", "job_started", "e0", &"b0")
        .await
        .unwrap();
    h.outbox
        .enqueue("platform", "job_completed", "e1", &"b1")
        .await
        .unwrap();

    h.delivery.process_messages().await.unwrap();
    h.delivery.process_messages().await.unwrap();

    let calls: Vec<(String, String)> = h
        .calls()
        .into_iter()
        .map(|c| (c.method, c.group_id))
        .collect();
    assert_eq!(
        calls,
        vec![
            ("job_started".to_string(), "e1".to_string()),
            ("job_started".to_string(), "e0".to_string()),
            ("job_completed".to_string(), "e1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_unavailable_aborts_pass_without_counting_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["m"]);
    for group_id in ["g1", "g2", "g3"] {
        h.outbox.enqueue("platform", "m", group_id, &1).await.unwrap();
    }
    h.consumer("m")
        .fail_next(RpcStatus::unavailable("connection refused"));

    let outcome = h.delivery.process_messages().await.unwrap();

    assert_eq!(outcome, PassOutcome::Aborted);
    assert_eq!(h.calls().len(), 1);
    let pending = h.store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|m| m.attempts == 0));
}

#[tokio::test]
async fn test_transient_failure_skips_only_its_group() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["m"]);
    let failing = h.outbox.enqueue("platform", "m", "g1", &1).await.unwrap();
    h.outbox.enqueue("platform", "m", "g1", &2).await.unwrap();
    h.outbox.enqueue("platform", "m", "g2", &1).await.unwrap();
    h.outbox.enqueue("platform", "m", "g3", &1).await.unwrap();
    h.consumer("m").fail_next(RpcStatus::internal("boom"));

    let outcome = h.delivery.process_messages().await.unwrap();

    assert_eq!(outcome, PassOutcome::Completed);
    assert_eq!(h.delivered_groups(), vec!["g1", "g2", "g3"]);
    let pending = h.store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(h.store.get(&failing.id).unwrap().attempts, 1);

    // The failed head is retried before the rest of its group.
    h.delivery.process_messages().await.unwrap();
    assert!(h.store.get(&failing.id).is_none());
    assert_eq!(h.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_permanent_failure_drops_head_and_advances() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["m"]);
    h.outbox.enqueue("platform", "m", "g1", &1).await.unwrap();
    h.outbox.enqueue("platform", "m", "g1", &2).await.unwrap();
    h.consumer("m")
        .fail_next(RpcStatus::new(StatusCode::InvalidArgument, "bad payload"));

    h.delivery.process_messages().await.unwrap();

    assert_eq!(h.calls().len(), 2);
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expired_message_is_evicted_regardless_of_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::with_config(
        OutboxConfig::builder()
            .outbox_dir(dir.path())
            .message_expiration_timeout(Duration::from_secs(3_600))
            .build(),
        &["m"],
    );
    let mut stale = raw("g1", 1);
    stale.created_at = Utc::now() - chrono::Duration::hours(2);
    stale.attempts = 0;
    h.store.insert_raw(stale.clone());
    h.store.insert_raw(raw("g1", 2));

    let outcome = h.delivery.process_messages().await.unwrap();

    assert_eq!(outcome, PassOutcome::Completed);
    assert!(h.store.get(&stale.id).is_none());
    // The stale head was never delivered; its successor was.
    assert_eq!(h.calls().len(), 1);
    assert_eq!(h.calls()[0].content.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_content_stream_is_delivered_then_removed() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["insert_results"]);
    let rows = futures::stream::iter(vec![
        serde_json::json!({"text_id": "MAT"}),
        serde_json::json!({"text_id": "MRK"}),
    ]);
    let message = h
        .outbox
        .enqueue_with_stream("platform", "insert_results", "e0", "e0", rows)
        .await
        .unwrap();
    let blob = dir.path().join(&message.id);
    assert!(blob.exists());

    h.delivery.process_messages().await.unwrap();

    let calls = h.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].rows,
        vec![
            r#"{"text_id":"MAT"}"#.to_string(),
            r#"{"text_id":"MRK"}"#.to_string()
        ]
    );
    assert!(!blob.exists());
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_content_stream_is_permanent() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["insert_results"]);
    let message =
        NewOutboxMessage::new("platform", "insert_results", "e0", Some("\"e0\"".to_string()))
            .with_content_stream()
            .into_message(1);
    h.store.insert_raw(message);

    h.delivery.process_messages().await.unwrap();

    assert!(h.calls().is_empty());
    assert_eq!(h.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_loop_delivers_on_enqueue_and_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let h = OutboxHarness::new(dir.path(), &["m"]);
    let signal = h.delivery.signal();
    let handle = h.delivery.clone().spawn();

    h.outbox.enqueue("platform", "m", "g1", &1).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message delivered by the run loop");

    signal.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run loop stopped")
        .unwrap();
    assert_eq!(h.calls().len(), 1);
}

#[tokio::test]
async fn test_run_loop_drains_backlog_without_idling() {
    let dir = tempfile::tempdir().unwrap();
    let config = OutboxConfig::builder()
        .outbox_dir(dir.path())
        .poll_interval(Duration::from_secs(60))
        .build();
    let h = OutboxHarness::with_config(config, &["m"]);
    for index in 1..=3 {
        h.store.insert_raw(raw("g1", index));
    }

    let signal = h.delivery.signal();
    let handle = h.delivery.clone().spawn();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("backlog drained without waiting for the poll interval");

    signal.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run loop stopped")
        .unwrap();
    let contents: Vec<Option<String>> = h.calls().into_iter().map(|c| c.content).collect();
    assert_eq!(
        contents,
        vec![
            Some("1".to_string()),
            Some("2".to_string()),
            Some("3".to_string())
        ]
    );
}
