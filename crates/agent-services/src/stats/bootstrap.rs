// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Placeholder stats service used until the real engine exists.
//!
//! Work submitted here is queued in submission order and replayed exactly
//! once into the real implementation. After the drain, nobody should still
//! hold this instance; late submissions are logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, error};

use super::{StatsService, StatsSnapshot, StatsWork};
use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::util::lock;

pub struct BootstrapStatsService {
    lifecycle: Lifecycle,
    pending: Mutex<Vec<StatsWork>>,
    drained: AtomicBool,
}

impl Default for BootstrapStatsService {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapStatsService {
    pub const NAME: &'static str = "Bootstrap stats service";

    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            pending: Mutex::new(Vec::new()),
            drained: AtomicBool::new(false),
        }
    }

    /// Appends a work item. Never fails.
    pub fn submit(&self, work: StatsWork) {
        let mut pending = lock(&self.pending);
        // Checked under the queue lock so a concurrent drain cannot miss it.
        if self.drained.load(Ordering::Acquire) {
            error!(
                metric = work.metric_name(),
                "Stats work submitted to the bootstrap stats service after it was drained; dropping it"
            );
            return;
        }
        pending.push(work);
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    /// Replays every queued item, in order, into `target` and clears the
    /// queue. Returns the number of items replayed. A second drain replays
    /// nothing.
    pub fn drain_into(&self, target: &dyn StatsService) -> usize {
        let queued = {
            let mut pending = lock(&self.pending);
            if self.drained.swap(true, Ordering::AcqRel) {
                error!("Bootstrap stats service drained more than once");
                return 0;
            }
            std::mem::take(&mut *pending)
        };
        let count = queued.len();
        for work in queued {
            target.do_stats_work(work);
        }
        debug!("Replayed {count} startup stats work items");
        count
    }
}

#[async_trait]
impl Service for BootstrapStatsService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_start(Self::NAME)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_stop(Self::NAME).map(|_| ())
    }
}

impl StatsService for BootstrapStatsService {
    fn do_stats_work(&self, work: StatsWork) {
        self.submit(work);
    }

    /// Nothing is aggregated before the real engine exists.
    fn harvest(&self) -> StatsSnapshot {
        StatsSnapshot::default()
    }
}
