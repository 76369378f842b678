// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Subsystems that hook into class transformation.
//!
//! Both are constructed before anything that could load instrumented types
//! and are started early, during the construction phase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::harvest::HarvestListener;
use super::SubsystemContext;
use crate::config::ConfigProvider;
use crate::core_service::Instrumentation;
use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::stats::StatsSnapshot;

const TRANSFORMER_NAME: &str = "agent-class-transformer";

/// Installs the agent's transformer into the live attachment.
///
/// Without an attachment the service still follows the lifecycle but has
/// nothing to install into.
pub struct ClassTransformerService {
    enabled: bool,
    instrumentation: Option<Arc<dyn Instrumentation>>,
    lifecycle: Lifecycle,
}

impl ClassTransformerService {
    pub const NAME: &'static str = "ClassTransformerService";

    #[must_use]
    pub fn new(ctx: &SubsystemContext) -> Self {
        Self {
            enabled: ctx.config.get_bool("class_transformer.enabled", true),
            instrumentation: ctx.instrumentation.clone(),
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn transformer_name(&self) -> &'static str {
        TRANSFORMER_NAME
    }
}

#[async_trait]
impl Service for ClassTransformerService {
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
        match (&self.instrumentation, self.enabled) {
            (Some(instrumentation), true) => {
                instrumentation.add_transformer(TRANSFORMER_NAME);
                debug!("Installed {TRANSFORMER_NAME}");
            }
            _ => debug!("No transformer installed"),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if self.lifecycle.begin_stop(Self::NAME)? {
            if let Some(instrumentation) = &self.instrumentation {
                instrumentation.remove_transformer(TRANSFORMER_NAME);
            }
        }
        Ok(())
    }
}

/// Hosts agent extensions; observes every harvest cycle.
pub struct ExtensionService {
    enabled: bool,
    harvests: AtomicU64,
    lifecycle: Lifecycle,
}

impl ExtensionService {
    pub const NAME: &'static str = "ExtensionService";

    #[must_use]
    pub fn new(config: &dyn ConfigProvider) -> Self {
        Self {
            enabled: config.get_bool("extensions.enabled", true),
            harvests: AtomicU64::new(0),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Harvest cycles observed while started.
    #[must_use]
    pub fn harvests_seen(&self) -> u64 {
        self.harvests.load(Ordering::Acquire)
    }
}

impl HarvestListener for ExtensionService {
    fn listener_name(&self) -> &str {
        Self::NAME
    }

    fn after_harvest(&self, snapshot: &StatsSnapshot) {
        if self.lifecycle.state() != ServiceState::Started || !self.enabled {
            return;
        }
        self.harvests.fetch_add(1, Ordering::AcqRel);
        debug!("Extensions saw {} harvested metrics", snapshot.metrics.len());
    }
}

#[async_trait]
impl Service for ExtensionService {
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
        self.lifecycle.begin_start(Self::NAME)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_stop(Self::NAME).map(|_| ())
    }
}
