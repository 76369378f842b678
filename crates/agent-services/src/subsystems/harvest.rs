// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic harvest cycle.
//!
//! Every `harvest.interval_ms` the harvest service takes a snapshot from the
//! current stats service and hands it to each registered listener.
//! Listeners may be added before or after the service starts.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SubsystemContext;
use crate::config::ConfigProvider;
use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::stats::{StatsSlot, StatsSnapshot};
use crate::util::lock;

const DEFAULT_HARVEST_INTERVAL: Duration = Duration::from_secs(60);

pub trait HarvestListener: Send + Sync {
    fn listener_name(&self) -> &str;

    fn after_harvest(&self, snapshot: &StatsSnapshot);
}

pub struct HarvestService {
    interval: Duration,
    stats: Arc<StatsSlot>,
    listeners: Arc<Mutex<Vec<Arc<dyn HarvestListener>>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Lifecycle,
}

impl HarvestService {
    pub const NAME: &'static str = "HarvestService";

    #[must_use]
    pub fn new(ctx: &SubsystemContext) -> Self {
        Self {
            interval: ctx
                .config
                .get_duration_ms("harvest.interval_ms", DEFAULT_HARVEST_INTERVAL),
            stats: Arc::clone(&ctx.stats),
            listeners: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn add_harvest_listener(&self, listener: Arc<dyn HarvestListener>) {
        debug!(listener = listener.listener_name(), "Adding harvest listener");
        lock(&self.listeners).push(listener);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Runs one harvest cycle immediately.
    pub fn harvest_now(&self) -> StatsSnapshot {
        run_harvest(&self.stats, &self.listeners)
    }
}

fn run_harvest(
    stats: &StatsSlot,
    listeners: &Mutex<Vec<Arc<dyn HarvestListener>>>,
) -> StatsSnapshot {
    let snapshot = stats.current().harvest();
    // Listeners run outside the lock so they can register further listeners.
    let listeners: Vec<Arc<dyn HarvestListener>> = lock(listeners).clone();
    for listener in listeners {
        listener.after_harvest(&snapshot);
    }
    debug!("Harvest complete: {} metrics", snapshot.metrics.len());
    snapshot
}

#[async_trait]
impl Service for HarvestService {
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
        self.lifecycle.begin_start(Self::NAME)?;

        let stats = Arc::clone(&self.stats);
        let listeners = Arc::clone(&self.listeners);
        let cancel = self.cancel.clone();
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // discard first tick
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        run_harvest(&stats, &listeners);
                    }
                }
            }
        });
        *lock(&self.task) = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if !self.lifecycle.begin_stop(Self::NAME)? {
            return Ok(());
        }
        self.cancel.cancel();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Harvest task ended abnormally: {e}");
                return Err(ServiceError::stop_failed(Self::NAME, e));
            }
        }
        Ok(())
    }
}
