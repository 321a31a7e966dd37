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

use chrono::{Duration as ChronoDuration, Utc};
use jobrelay::database::Database;
use jobrelay::models::NewOutboxMessage;
use jobrelay::outbox::{
    ConsumerRegistry, OutboxDeliveryService, OutboxService, OutboxStore, PassOutcome,
    SqliteOutboxStore,
};
use jobrelay::OutboxConfig;
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::Arc;
use tempfile::TempDir;

use crate::fixtures::ScriptedConsumer;

async fn open_store() -> (TempDir, SqliteOutboxStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.db");
    let database = Database::new(path.to_str().unwrap()).unwrap();
    database.run_migrations().await.unwrap();
    (dir, SqliteOutboxStore::new(database))
}

fn message(group_id: &str, content: &str) -> NewOutboxMessage {
    NewOutboxMessage::new("platform", "job_started", group_id, Some(content.to_string()))
}

#[tokio::test]
#[serial]
async fn test_indexes_are_assigned_per_group() {
    let (_dir, store) = open_store().await;

    let mut indexes = Vec::new();
    for (group, content) in [("e0", "a"), ("e0", "b"), ("e1", "c"), ("e0", "d")] {
        indexes.push(store.enqueue(message(group, content)).await.unwrap().index);
    }

    assert_eq!(indexes, vec![1, 2, 1, 3]);
    assert_eq!(store.count().await.unwrap(), 4);
}

#[tokio::test]
#[serial]
async fn test_index_keeps_growing_after_deletes() {
    let (_dir, store) = open_store().await;
    let first = store.enqueue(message("e0", "a")).await.unwrap();
    assert!(store.delete(&first.id).await.unwrap());

    let second = store.enqueue(message("e0", "b")).await.unwrap();

    assert_eq!(second.index, 2);
}

#[tokio::test]
#[serial]
async fn test_stored_messages_load_back() {
    let (_dir, store) = open_store().await;
    let enqueued = store.enqueue(message("e0", "{\"job_id\":\"b0\"}")).await.unwrap();
    store.increment_attempts(&enqueued.id).await.unwrap();
    store.increment_attempts(&enqueued.id).await.unwrap();

    let pending = store.list_pending().await.unwrap();

    assert_eq!(pending.len(), 1);
    let loaded = &pending[0];
    assert_eq!(loaded.id, enqueued.id);
    assert_eq!(loaded.outbox_ref, "platform");
    assert_eq!(loaded.method, "job_started");
    assert_eq!(loaded.content.as_deref(), Some("{\"job_id\":\"b0\"}"));
    assert_eq!(loaded.attempts, 2);
    assert!(!loaded.has_content_stream);
}

#[tokio::test]
#[serial]
async fn test_delete_reports_missing_rows() {
    let (_dir, store) = open_store().await;
    let enqueued = store.enqueue(message("e0", "a")).await.unwrap();

    assert!(store.delete(&enqueued.id).await.unwrap());
    assert!(!store.delete(&enqueued.id).await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_list_created_before_cutoff() {
    let (_dir, store) = open_store().await;
    let mut old = message("e0", "old");
    old.created_at = Utc::now() - ChronoDuration::days(3);
    store.enqueue(old).await.unwrap();
    store.enqueue(message("e0", "new")).await.unwrap();

    let expired = store
        .list_created_before(Utc::now() - ChronoDuration::days(1))
        .await
        .unwrap();

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].content.as_deref(), Some("old"));
}

#[tokio::test]
#[serial]
async fn test_delivery_drains_sqlite_store() {
    let (dir, store) = open_store().await;
    let store = Arc::new(store);
    let config = OutboxConfig::builder().outbox_dir(dir.path()).build();
    let outbox = OutboxService::new(store.clone(), config.clone());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ConsumerRegistry::new();
    registry.register(Arc::new(ScriptedConsumer::new(
        "platform",
        "job_started",
        calls.clone(),
    )));
    let delivery = OutboxDeliveryService::new(store.clone(), registry, config, outbox.signal());

    for (group, job) in [("e0", "b0"), ("e1", "b1"), ("e0", "b2")] {
        outbox
            .enqueue("platform", "job_started", group, &job)
            .await
            .unwrap();
    }

    assert_eq!(
        delivery.process_messages().await.unwrap(),
        PassOutcome::Completed
    );
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(
        delivery.process_messages().await.unwrap(),
        PassOutcome::Completed
    );

    let mut contents: Vec<Option<String>> =
        calls.lock().iter().map(|c| c.content.clone()).collect();
    contents.sort();
    assert_eq!(
        contents,
        vec![
            Some("\"b0\"".to_string()),
            Some("\"b1\"".to_string()),
            Some("\"b2\"".to_string()),
        ]
    );
    assert_eq!(store.count().await.unwrap(), 0);
}
