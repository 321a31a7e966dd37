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

//! Outbox metrics.
//!
//! Dropped messages are a silent-loss path; the drop counter is how operators
//! see them alongside the error log.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Messages delivered and removed.
pub const MESSAGES_DELIVERED: &str = "jobrelay_outbox_messages_delivered_total";

/// Messages dropped without delivery, labelled by reason.
pub const MESSAGES_DROPPED: &str = "jobrelay_outbox_messages_dropped_total";

/// Deliveries rejected by the consumer and left for a later pass.
pub const DELIVERY_FAILURES: &str = "jobrelay_outbox_delivery_failures_total";

/// Passes aborted because the endpoint was unreachable.
pub const PASSES_ABORTED: &str = "jobrelay_outbox_passes_aborted_total";

/// Pending messages seen by the last health check.
pub const PENDING_MESSAGES: &str = "jobrelay_outbox_pending_messages";

/// Why a message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Expired,
    Permanent,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Expired => "expired",
            DropReason::Permanent => "permanent",
        }
    }
}

/// Registers all outbox metric descriptions.
///
/// Call this once at application startup after installing a metrics recorder.
pub fn register_metrics() {
    describe_counter!(MESSAGES_DELIVERED, "Total outbox messages delivered");
    describe_counter!(MESSAGES_DROPPED, "Total outbox messages dropped without delivery");
    describe_counter!(DELIVERY_FAILURES, "Total outbox deliveries rejected by a consumer");
    describe_counter!(PASSES_ABORTED, "Total dispatch passes aborted on an unreachable endpoint");
    describe_gauge!(PENDING_MESSAGES, "Pending outbox messages at the last health check");
}

pub fn record_delivered(outbox_ref: &str, method: &str) {
    counter!(
        MESSAGES_DELIVERED,
        "outbox" => outbox_ref.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

pub fn record_dropped(outbox_ref: &str, method: &str, reason: DropReason) {
    counter!(
        MESSAGES_DROPPED,
        "outbox" => outbox_ref.to_string(),
        "method" => method.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

pub fn record_delivery_failure(outbox_ref: &str, method: &str) {
    counter!(
        DELIVERY_FAILURES,
        "outbox" => outbox_ref.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

pub fn record_pass_aborted() {
    counter!(PASSES_ABORTED).increment(1);
}

pub fn record_pending(pending: usize) {
    gauge!(PENDING_MESSAGES).set(pending as f64);
}
