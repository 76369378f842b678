// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host facts reported with the first connection.
//!
//! Collection runs on a background task as soon as the service starts, which
//! for an instrumented process is during the construction phase, so the facts
//! are usually ready before the connection is established.

use std::env;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SubsystemContext;
use crate::config::ConfigProvider;
use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::util::lock;

const PROC_MEMINFO_PATH: &str = "/proc/meminfo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtilizationData {
    pub hostname: String,
    pub logical_processors: usize,
    pub physical_processors: usize,
    pub total_ram_mib: Option<u64>,
}

pub struct UtilizationService {
    enabled: bool,
    data: Arc<Mutex<Option<UtilizationData>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Lifecycle,
}

impl UtilizationService {
    pub const NAME: &'static str = "UtilizationService";

    #[must_use]
    pub fn new(ctx: &SubsystemContext) -> Self {
        Self {
            enabled: ctx.config.get_bool("utilization.enabled", true),
            data: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
            lifecycle: Lifecycle::new(),
        }
    }

    /// The collected facts, once the background collection has finished.
    #[must_use]
    pub fn data(&self) -> Option<UtilizationData> {
        lock(&self.data).clone()
    }

    /// Waits for an in-flight collection, if any.
    pub async fn wait_collected(&self) {
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Utilization collection failed: {e}");
            }
        }
    }
}

#[async_trait]
impl Service for UtilizationService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_start(Self::NAME)?;
        if !self.enabled {
            return Ok(());
        }
        let data = Arc::clone(&self.data);
        let handle = tokio::task::spawn_blocking(move || {
            let collected = collect();
            debug!(
                hostname = %collected.hostname,
                processors = collected.logical_processors,
                "Utilization data collected"
            );
            *lock(&data) = Some(collected);
        });
        *lock(&self.task) = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if self.lifecycle.begin_stop(Self::NAME)? {
            // Collection is short and not cancellable; let it finish.
            self.wait_collected().await;
        }
        Ok(())
    }
}

fn collect() -> UtilizationData {
    UtilizationData {
        hostname: hostname(),
        logical_processors: num_cpus::get(),
        physical_processors: num_cpus::get_physical(),
        total_ram_mib: fs::read_to_string(PROC_MEMINFO_PATH)
            .ok()
            .and_then(|contents| parse_mem_total_kb(&contents))
            .map(|kb| kb / 1024),
    }
}

/// `AGENT_HOSTNAME`, then `HOSTNAME`, then the system hostname.
fn hostname() -> String {
    for var in ["AGENT_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    system_hostname().unwrap_or_else(|| {
        warn!("Could not determine hostname, using 'unknown'");
        "unknown".to_string()
    })
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name
            .to_str()
            .filter(|n| !n.is_empty())
            .map(ToString::to_string),
        Err(e) => {
            warn!("Failed to get system hostname: {e}");
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    None
}

fn parse_mem_total_kb(contents: &str) -> Option<u64> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}
