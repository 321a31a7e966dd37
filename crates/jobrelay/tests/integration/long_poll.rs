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

use jobrelay::config::PlatformConfig;
use jobrelay::error::ServiceError;
use jobrelay::jobs::PollOutcome;
use jobrelay::{Job, JobState};
use std::time::Duration;

use crate::fixtures::PlatformHarness;

const SETTLE: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_get_job_without_revision_returns_current_state() {
    let h = PlatformHarness::new("e0", "b0").await;

    let job = h.job_service.get_job("b0", None).await.unwrap();

    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.revision, 1);
}

#[tokio::test]
async fn test_get_job_wakes_when_worker_reports_start() {
    let h = PlatformHarness::new("e0", "b0").await;

    let (job, _) = tokio::join!(h.job_service.get_job("b0", Some(2)), async {
        tokio::time::sleep(SETTLE).await;
        h.platform.job_started("b0").await.unwrap();
    });

    let job = job.unwrap();
    assert_eq!(job.state, JobState::Active);
    assert_eq!(job.revision, 2);
}

#[tokio::test]
async fn test_get_job_times_out() {
    let config = PlatformConfig::builder()
        .long_poll_timeout(Duration::from_millis(50))
        .build();
    let h = PlatformHarness::with_config("e0", "b0", config).await;

    let err = h.job_service.get_job("b0", Some(5)).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::RequestTimeout { min_revision: 5 }
    ));
}

#[tokio::test]
async fn test_deleted_job_ends_the_wait() {
    let h = PlatformHarness::new("e0", "b0").await;

    let (job, deleted) = tokio::join!(h.job_service.get_job("b0", Some(3)), async {
        tokio::time::sleep(SETTLE).await;
        h.job_service.delete("b0").await
    });

    assert_eq!(deleted.unwrap().id, "b0");
    assert!(matches!(job, Err(ServiceError::NotFound { entity: "job", .. })));
}

#[tokio::test]
async fn test_missing_job_is_reported_as_deleted() {
    let h = PlatformHarness::new("e0", "b0").await;

    let outcome = h
        .job_service
        .get_newer_revision("missing", 1, Duration::from_secs(5))
        .await
        .unwrap();

    match outcome {
        PollOutcome::Changed(change) => assert!(change.is_delete()),
        PollOutcome::TimedOut => panic!("expected an immediate delete"),
    }
}

#[tokio::test]
async fn test_active_job_poll_waits_for_next_job() {
    let h = PlatformHarness::new("e0", "b0").await;
    h.platform.job_faulted("b0", "Out of memory").await.unwrap();

    let (outcome, started) = tokio::join!(
        h.job_service
            .get_active_newer_revision("e0", 1, Duration::from_secs(5)),
        async {
            tokio::time::sleep(SETTLE).await;
            h.engine_service
                .start_job("e0", Job::new("e0").with_id("b1"))
                .await
        }
    );

    assert_eq!(started.unwrap().id, "b1");
    match outcome.unwrap() {
        PollOutcome::Changed(change) => {
            let job = change.entity.expect("active job");
            assert_eq!(job.id, "b1");
            assert_eq!(job.state, JobState::Pending);
        }
        PollOutcome::TimedOut => panic!("expected the new job"),
    }
}

#[tokio::test]
async fn test_active_job_poll_times_out_without_a_job() {
    let h = PlatformHarness::new("e0", "b0").await;
    h.platform.job_canceled("b0").await.unwrap();

    let outcome = h
        .job_service
        .get_active_newer_revision("e0", 1, Duration::from_millis(50))
        .await
        .unwrap();

    assert_eq!(outcome, PollOutcome::TimedOut);
}
