// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Name-keyed registry for services added at runtime (extensions, plugins).
//!
//! Registering a name twice replaces the earlier entry: last registration
//! wins and no warning is emitted. Iteration order across entries is
//! unspecified; registered services are independent of each other.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::error::FailureReport;
use crate::service::Service;

#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the service under its own name. Returns the
    /// service it replaced, if any.
    pub fn register(&self, service: Arc<dyn Service>) -> Option<Arc<dyn Service>> {
        let name = service.name().to_string();
        debug!(service = %name, "Registering dynamic service");
        self.services.insert(name, service)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.get(name).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Point-in-time copy of the entries. Shard locks are released before the
    /// copy is returned, so callers may await while holding it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Service>> {
        self.services
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Starts every registered service. One failing entry does not prevent
    /// the remaining entries from being started.
    pub async fn start_all(&self) -> FailureReport {
        let mut report = FailureReport::default();
        for service in self.snapshot() {
            debug!(service = service.name(), "Starting dynamic service");
            if let Err(e) = service.start().await {
                error!(service = service.name(), "Dynamic service failed to start: {e}");
                report.record(service.name(), e);
            }
        }
        report
    }

    /// Stops every registered service, collecting failures.
    pub async fn stop_all(&self) -> FailureReport {
        let mut report = FailureReport::default();
        for service in self.snapshot() {
            debug!(service = service.name(), "Stopping dynamic service");
            if let Err(e) = service.stop().await {
                error!(service = service.name(), "Dynamic service failed to stop: {e}");
                report.record(service.name(), e);
            }
        }
        report
    }
}
