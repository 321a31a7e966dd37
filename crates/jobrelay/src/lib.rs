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

//! # jobrelay
//!
//! Reliable event delivery and job lifecycle coordination for long-running
//! worker engines.
//!
//! The crate has two halves that meet at the [`platform::PlatformApi`] seam:
//!
//! - **Producer side** (inside a worker): lifecycle calls are written to a
//!   durable [`outbox`] and delivered in per-group order by the
//!   [`outbox::OutboxDeliveryService`], which distinguishes an unreachable
//!   platform (abort the pass, retry later) from a rejected call (count the
//!   attempt) and eventually evicts poison messages.
//! - **Consumer side** (the platform): [`platform::EnginePlatformService`]
//!   applies each lifecycle call to the Engine/Job pair inside a single
//!   [`store::Transaction`], purges stale results, and publishes domain events
//!   after commit.
//!
//! Clients watch job progress through [`jobs::JobService`], whose long-poll
//! returns as soon as a job reaches a requested revision.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobrelay::config::OutboxConfig;
//! use jobrelay::outbox::{ConsumerRegistry, MemoryOutboxStore, OutboxDeliveryService, OutboxService};
//!
//! let config = OutboxConfig::builder().outbox_dir("/var/lib/worker/outbox").build();
//! let store = Arc::new(MemoryOutboxStore::new());
//! let outbox = OutboxService::new(store.clone(), config.clone());
//! let delivery = OutboxDeliveryService::new(store, registry, config, outbox.signal());
//! let handle = delivery.spawn();
//! ```

pub mod config;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod error;
pub mod jobs;
pub mod models;
pub mod outbox;
pub mod platform;
pub mod store;

pub use config::{OutboxConfig, PlatformConfig, RelayConfig};
pub use error::{
    ConfigError, DeliveryError, FailureKind, OutboxError, PlatformError, PublishError, RpcStatus,
    ServiceError, StatusCode, StoreError,
};
pub use models::{
    AssessmentResult, DomainEvent, Engine, Job, JobResult, JobState, OutboxMessage, Pretranslation,
    WordAlignment,
};
pub use store::{EntityChange, EntityChangeType, Filter, Repository, Transaction, Update};
