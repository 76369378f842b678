// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Statistics collection.
//!
//! The stats subsystem is reachable before anything else exists: the manager
//! publishes a [`BootstrapStatsService`] at construction time, which queues
//! work until the real [`StatsEngineService`] is swapped in through the
//! [`StatsSlot`].

pub mod bootstrap;
pub mod slot;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::util::lock;

pub use bootstrap::BootstrapStatsService;
pub use slot::StatsSlot;

/// A unit of work submitted to the stats subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsWork {
    Increment { name: String, count: u64 },
    RecordValue { name: String, value: f64 },
    RecordResponseTime { name: String, duration: Duration },
}

impl StatsWork {
    pub fn increment(name: impl Into<String>) -> Self {
        StatsWork::Increment {
            name: name.into(),
            count: 1,
        }
    }

    pub fn record_value(name: impl Into<String>, value: f64) -> Self {
        StatsWork::RecordValue {
            name: name.into(),
            value,
        }
    }

    #[must_use]
    pub fn metric_name(&self) -> &str {
        match self {
            StatsWork::Increment { name, .. }
            | StatsWork::RecordValue { name, .. }
            | StatsWork::RecordResponseTime { name, .. } => name,
        }
    }
}

/// Aggregated values for one metric name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricStats {
    pub name: String,
    pub call_count: u64,
    pub total: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

impl MetricStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, value: f64, count: u64) {
        if self.call_count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.call_count += count;
        self.total += value;
        self.last = value;
    }
}

/// Harvested metrics, in the order each name was first seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub metrics: Vec<MetricStats>,
}

impl StatsSnapshot {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricStats> {
        self.metrics.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// The stats subsystem interface callers see through the manager.
pub trait StatsService: Service {
    /// Accepts a unit of work. Never blocks on I/O and never fails.
    fn do_stats_work(&self, work: StatsWork);

    /// Takes everything aggregated since the previous harvest.
    fn harvest(&self) -> StatsSnapshot;
}

#[derive(Default)]
struct Aggregates {
    index: HashMap<String, usize>,
    metrics: Vec<MetricStats>,
}

impl Aggregates {
    fn entry(&mut self, name: &str) -> &mut MetricStats {
        let position = match self.index.get(name) {
            Some(position) => *position,
            None => {
                self.metrics.push(MetricStats::new(name));
                let position = self.metrics.len() - 1;
                self.index.insert(name.to_string(), position);
                position
            }
        };
        &mut self.metrics[position]
    }
}

/// The real stats aggregator.
pub struct StatsEngineService {
    lifecycle: Lifecycle,
    aggregates: Mutex<Aggregates>,
}

impl Default for StatsEngineService {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsEngineService {
    pub const NAME: &'static str = "StatsService";

    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            aggregates: Mutex::new(Aggregates::default()),
        }
    }
}

#[async_trait]
impl Service for StatsEngineService {
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

impl StatsService for StatsEngineService {
    fn do_stats_work(&self, work: StatsWork) {
        let mut aggregates = lock(&self.aggregates);
        match work {
            StatsWork::Increment { name, count } => {
                aggregates.entry(&name).record(count as f64, count);
            }
            StatsWork::RecordValue { name, value } => {
                aggregates.entry(&name).record(value, 1);
            }
            StatsWork::RecordResponseTime { name, duration } => {
                aggregates.entry(&name).record(duration.as_secs_f64(), 1);
            }
        }
    }

    fn harvest(&self) -> StatsSnapshot {
        let mut aggregates = lock(&self.aggregates);
        let taken = std::mem::take(&mut *aggregates);
        debug!("Harvested {} metrics", taken.metrics.len());
        StatsSnapshot {
            metrics: taken.metrics,
        }
    }
}
