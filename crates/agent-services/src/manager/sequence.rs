// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Start and stop sweeps over an ordered list of services.
//!
//! Starting fails fast: the first error stops the sweep and is returned as
//! is. Stopping is best effort: every service gets its stop call and
//! failures are collected.

use std::sync::Arc;

use tracing::{debug, warn};

use super::timing::StartupTimings;
use crate::error::{FailureReport, ManagerError};
use crate::service::Service;

pub(crate) async fn run_start_sequence(
    services: &[Arc<dyn Service>],
    timings: &mut StartupTimings,
) -> Result<(), ManagerError> {
    for service in services {
        let name = service.name().to_string();
        debug!("Starting {name}");
        timings
            .time(name.clone(), service.start())
            .await
            .map_err(|source| ManagerError::SubsystemStart { name, source })?;
    }
    Ok(())
}

pub(crate) async fn run_stop_sequence(services: &[Arc<dyn Service>]) -> FailureReport {
    let mut report = FailureReport::default();
    for service in services {
        debug!("Stopping {}", service.name());
        if let Err(e) = service.stop().await {
            warn!("Error stopping {}: {e}", service.name());
            report.record(service.name(), e);
        }
    }
    report
}
