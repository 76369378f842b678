// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The service manager: owns every subsystem and sequences their lifecycle.
//!
//! ## Start
//!
//! 1. Validate the ordering tables
//! 2. Start the core service; nothing proceeds without it
//! 3. Construct the static subsystems (publishing the real stats engine and
//!    performing the early starts on the way)
//! 4. Start the static subsystems in [`ordering::START_ORDER`]
//! 5. Start the dynamic services, tolerating individual failures
//! 6. Start [`ordering::START_AFTER_DYNAMIC`]
//!
//! A failure in steps 2-4 or 6 aborts startup and is returned unchanged.
//! Nothing that already started is rolled back.
//!
//! ## Stop
//!
//! Dynamic services first, then [`ordering::STOP_ORDER`], then the core
//! service. Every stop is attempted; failures are logged and collected.

pub mod ordering;
pub mod sequence;
pub mod services;
pub mod timing;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, ConfigProvider, ConfigService};
use crate::core_service::CoreService;
use crate::error::{FailureReport, ManagerError, ServiceError};
use crate::registry::ServiceRegistry;
use crate::service::{Service, ServiceState};
use crate::stats::{StatsService, StatsSlot};
use crate::subsystems::SubsystemContext;
use crate::util::lock;
use ordering::{check_ordering, SubsystemId, CONSTRUCTION_ORDER, START_AFTER_DYNAMIC, START_ORDER, STOP_ORDER};
use sequence::{run_start_sequence, run_stop_sequence};
use services::{construct, StaticServices};
use timing::StartupTimings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManagerState {
    Created,
    Starting,
    Running,
    /// Startup aborted. Only `stop()` is accepted.
    Failed,
    Stopping,
    Stopped,
}

/// Per-service entry of [`ServiceManager::services_configuration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub enabled: bool,
}

pub struct ServiceManager {
    core: Arc<dyn CoreService>,
    config: Arc<ConfigService>,
    stats: Arc<StatsSlot>,
    registry: ServiceRegistry,
    services: OnceLock<StaticServices>,
    state: Mutex<ManagerState>,
    timings: Mutex<StartupTimings>,
}

impl ServiceManager {
    pub const NAME: &'static str = "ServiceManager";

    /// Creates a manager in `Created` state. Stats work may be submitted
    /// through [`ServiceManager::stats_service`] from here on.
    pub fn new(core: Arc<dyn CoreService>, config: AgentConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        Ok(Self {
            core,
            config: Arc::new(ConfigService::new(config)),
            stats: Arc::new(StatsSlot::new()),
            registry: ServiceRegistry::new(),
            services: OnceLock::new(),
            state: Mutex::new(ManagerState::Created),
            timings: Mutex::new(StartupTimings::default()),
        })
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        *lock(&self.state)
    }

    /// Step timings of the last startup, complete or not.
    #[must_use]
    pub fn timings(&self) -> StartupTimings {
        lock(&self.timings).clone()
    }

    /// The static subsystems, available once construction finished.
    #[must_use]
    pub fn services(&self) -> Option<&StaticServices> {
        self.services.get()
    }

    /// The live stats service. Before the real engine is published this is
    /// the bootstrap buffer.
    #[must_use]
    pub fn stats_service(&self) -> Arc<dyn StatsService> {
        self.stats.current()
    }

    #[must_use]
    pub fn config_service(&self) -> &Arc<ConfigService> {
        &self.config
    }

    #[must_use]
    pub fn core_service(&self) -> &Arc<dyn CoreService> {
        &self.core
    }

    /// Registers a dynamic service. A service registered under an existing
    /// name replaces it.
    pub fn add_service(&self, service: Arc<dyn Service>) -> Option<Arc<dyn Service>> {
        let replaced = self.registry.register(service);
        if let Some(old) = &replaced {
            debug!("Replaced dynamic service {}", old.name());
        }
        replaced
    }

    #[must_use]
    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.registry.lookup(name)
    }

    /// Enabled flag per static subsystem and per dynamic service, keyed by
    /// service name. Static subsystems are listed once constructed.
    #[must_use]
    pub fn services_configuration(&self) -> BTreeMap<String, ServiceSummary> {
        let mut summary = BTreeMap::new();
        if let Some(services) = self.services.get() {
            for id in SubsystemId::ALL {
                let service = services.service(id);
                summary.insert(
                    service.name().to_string(),
                    ServiceSummary {
                        enabled: service.is_enabled(),
                    },
                );
            }
        }
        for service in self.registry.snapshot() {
            summary.insert(
                service.name().to_string(),
                ServiceSummary {
                    enabled: service.is_enabled(),
                },
            );
        }
        summary
    }

    pub async fn start(&self) -> Result<(), ManagerError> {
        self.transition("start", &[ManagerState::Created], ManagerState::Starting)?;
        info!("Starting services");

        let started = Instant::now();
        let mut timings = StartupTimings::default();
        let result = self.run_start(&mut timings).await;

        let next = match &result {
            Ok(()) => {
                timings.finish(started.elapsed());
                timings.log();
                ManagerState::Running
            }
            Err(e) => {
                error!("Service manager failed to start: {e}");
                ManagerState::Failed
            }
        };
        *lock(&self.timings) = timings;
        *lock(&self.state) = next;
        result
    }

    async fn run_start(&self, timings: &mut StartupTimings) -> Result<(), ManagerError> {
        check_ordering()?;

        timings
            .time(self.core.name().to_string(), self.core.start())
            .await
            .map_err(ManagerError::CoreStart)?;

        let config: Arc<dyn ConfigProvider> = self.config.clone();
        let ctx = SubsystemContext {
            config,
            stats: Arc::clone(&self.stats),
            instrumentation: self.core.instrumentation(),
        };
        if !ctx.is_real_agent() {
            info!("No instrumentation attached, samplers run as no-ops");
        }

        let built = construct(CONSTRUCTION_ORDER, &ctx, Arc::clone(&self.config), timings).await?;
        // `start` runs once, so the set is always empty here.
        let services = self.services.get_or_init(|| built);

        run_start_sequence(&ordered(services, START_ORDER), timings).await?;

        let dynamic = timings
            .time("dynamic services", self.registry.start_all())
            .await;
        if !dynamic.is_clean() {
            warn!(
                "{} dynamic services failed to start",
                dynamic.failures().len()
            );
        }

        run_start_sequence(&ordered(services, START_AFTER_DYNAMIC), timings).await
    }

    /// Stops everything. Only fails on misuse; individual stop failures are
    /// returned in the report.
    pub async fn stop(&self) -> Result<FailureReport, ManagerError> {
        self.transition(
            "stop",
            &[ManagerState::Running, ManagerState::Failed],
            ManagerState::Stopping,
        )?;
        info!("Stopping services");

        let mut report = self.registry.stop_all().await;
        if let Some(services) = self.services.get() {
            report.extend(run_stop_sequence(&ordered(services, STOP_ORDER)).await);
        }
        if let Err(e) = self.core.stop().await {
            warn!("Error stopping {}: {e}", self.core.name());
            report.record(self.core.name(), e);
        }

        *lock(&self.state) = ManagerState::Stopped;
        if report.is_clean() {
            info!("Services stopped");
        } else {
            warn!(
                "Services stopped with {} failures",
                report.failures().len()
            );
        }
        Ok(report)
    }

    fn transition(
        &self,
        action: &'static str,
        from: &[ManagerState],
        to: ManagerState,
    ) -> Result<(), ManagerError> {
        let mut state = lock(&self.state);
        if !from.contains(&*state) {
            return Err(ManagerError::InvalidState {
                action,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }
}

fn ordered(services: &StaticServices, order: &[SubsystemId]) -> Vec<Arc<dyn Service>> {
    order.iter().map(|id| services.service(*id)).collect()
}

/// The manager as a lifecycle participant of an embedding runtime.
#[async_trait]
impl Service for ServiceManager {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        match ServiceManager::state(self) {
            ManagerState::Created => ServiceState::Created,
            ManagerState::Starting | ManagerState::Running | ManagerState::Failed => {
                ServiceState::Started
            }
            ManagerState::Stopping | ManagerState::Stopped => ServiceState::Stopped,
        }
    }

    async fn start(&self) -> Result<(), ServiceError> {
        ServiceManager::start(self)
            .await
            .map_err(|e| ServiceError::start_failed(Self::NAME, e))
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        let report = ServiceManager::stop(self)
            .await
            .map_err(|e| ServiceError::stop_failed(Self::NAME, e))?;
        if report.is_clean() {
            Ok(())
        } else {
            Err(ServiceError::stop_failed(
                Self::NAME,
                format!("{} services failed to stop", report.failures().len()),
            ))
        }
    }
}
