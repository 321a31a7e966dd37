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

//! Wake-up signal for the delivery loop.
//!
//! The producer notifies the signal on every enqueue so an idle dispatcher
//! starts a pass immediately instead of waiting out its poll interval. A
//! notification that arrives while a pass is running is kept, so the next
//! wait returns at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DeliverySignal {
    notify: Notify,
    shutdown: AtomicBool,
}

impl DeliverySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that new messages may be pending.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Waits until notified, `timeout` elapses, or shutdown is requested.
    pub async fn wait(&self, timeout: Duration) {
        if self.is_shutdown() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                debug!("Outbox poll interval elapsed");
            }
            _ = self.notify.notified() => {
                debug!("Outbox delivery signal received");
            }
        }
    }

    /// Stops the delivery loop after its current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
