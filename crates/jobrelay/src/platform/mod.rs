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

//! Engine/Job lifecycle platform.
//!
//! | Call | Job | Engine | Result cleanup | Event |
//! |---|---|---|---|---|
//! | `job_started` | Active | running | | `JobStarted` |
//! | `job_completed` | Completed | stopped, `job_revision + 1` | older than the new revision | `JobFinished` |
//! | `job_canceled` | Canceled | stopped | newer than `job_revision` | `JobFinished` |
//! | `job_faulted` | Faulted | stopped | newer than `job_revision` | `JobFinished` |
//! | `job_restarting` | Pending | | newer than `job_revision` | |
//!
//! Workers make these calls through a [`PlatformOutbox`]; the dispatcher
//! replays them through [`PlatformConsumer`]s against any [`PlatformApi`].

pub mod api;
mod client;
mod consumers;
mod events;
mod service;

pub use api::{PlatformApi, PlatformMethod};
pub use client::{PlatformOutbox, PLATFORM_OUTBOX};
pub use consumers::{register_platform_consumers, PlatformConsumer};
pub use events::{BroadcastPublisher, EventPublisher, OutboxEventPublisher};
pub use service::EnginePlatformService;
