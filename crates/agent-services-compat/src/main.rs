// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use agent_services::{
    logger::Formatter, AgentConfig, AttachedCore, ConfigProvider, CoreService, ServiceManager,
};

#[tokio::main]
pub async fn main() {
    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading agent configuration: {e}");
            return;
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(config.log_level.as_filter_directive())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(Formatter)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
        return;
    }

    debug!("Logging subsystem enabled");

    let core: Arc<dyn CoreService> = if config.get_bool("detached", false) {
        info!("Running without instrumentation");
        Arc::new(AttachedCore::detached())
    } else {
        Arc::new(AttachedCore::instrumented())
    };

    let manager = match ServiceManager::new(core, config) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Error creating service manager: {e}");
            return;
        }
    };

    match manager.start().await {
        Ok(()) => {
            match serde_json::to_string(&manager.services_configuration()) {
                Ok(summary) => info!("Services configuration: {summary}"),
                Err(e) => warn!("Unable to serialize services configuration: {e}"),
            }
            shutdown_signal().await;
            info!("Shutdown requested");
        }
        Err(e) => error!("Error starting services: {e}"),
    }

    match manager.stop().await {
        Ok(report) => {
            for (name, e) in report.failures() {
                warn!("{name} did not stop cleanly: {e}");
            }
        }
        Err(e) => error!("Error stopping services: {e}"),
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for ctrl-c: {e}");
            }
            return;
        }
    };
    tokio::select! {
        _ = terminate.recv() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Unable to listen for ctrl-c: {e}");
            }
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for ctrl-c: {e}");
    }
}
