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

//! Durable, ordered, at-least-once outbox.
//!
//! Producers enqueue remote calls through [`OutboxService`]. The
//! [`OutboxDeliveryService`] drains the [`OutboxStore`] in passes, delivering
//! the head message of each group to the [`OutboxConsumer`] registered for its
//! `(outbox_ref, method)`.
//!
//! Failure handling per delivery:
//!
//! | Failure | Attempts | Effect |
//! |---|---|---|
//! | endpoint unreachable | unchanged | abort the whole pass |
//! | call rejected | +1 | skip the group for this pass |
//! | permanent, or message expired | n/a | drop the message |

mod consumer;
mod content;
mod delivery;
mod health;
pub mod metrics;
mod service;
mod signal;
#[cfg(feature = "sqlite")]
mod sqlite_store;
mod store;

pub use consumer::{decode_content, ConsumerRegistry, OutboxConsumer};
pub use content::{ContentStore, RecordStream};
pub use delivery::{OutboxDeliveryService, PassOutcome};
pub use health::{HealthReport, HealthStatus, OutboxHealthCheck};
pub use service::OutboxService;
pub use signal::DeliverySignal;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteOutboxStore;
pub use store::{MemoryOutboxStore, OutboxStore};
