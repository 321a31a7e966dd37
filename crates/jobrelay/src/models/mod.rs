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

//! Domain models.
//!
//! Engines, jobs and job results are stored through [`crate::store::Repository`];
//! outbox messages through [`crate::outbox::OutboxStore`].

pub mod domain_event;
pub mod engine;
pub mod job;
pub mod job_result;
pub mod outbox_message;

pub use domain_event::{DomainEvent, DomainEventType};
pub use engine::Engine;
pub use job::{Job, JobState};
pub use job_result::{
    AlignedWordPair, AssessmentResult, JobResult, Pretranslation, ResultFilter, WordAlignment,
};
pub use outbox_message::{NewOutboxMessage, OutboxMessage};
