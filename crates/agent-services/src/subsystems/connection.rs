// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection management towards the collector.
//!
//! The service manager for the collector connection is started after every
//! other service, dynamic ones included, so late registrants can still add
//! connection listeners before the connection is established.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::SubsystemContext;
use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::util::lock;

/// Established connection details handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub app_name: String,
    pub run_id: String,
}

pub trait ConnectionListener: Send + Sync {
    fn on_established(&self, connection: &ConnectionInfo);
}

pub struct RpmServiceManager {
    app_name: String,
    listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
    connection: Mutex<Option<ConnectionInfo>>,
    connects: AtomicU64,
    lifecycle: Lifecycle,
}

impl RpmServiceManager {
    pub const NAME: &'static str = "RPMServiceManager";

    #[must_use]
    pub fn new(ctx: &SubsystemContext) -> Self {
        Self {
            app_name: ctx.config.get("app_name").unwrap_or_default(),
            listeners: Mutex::new(Vec::new()),
            connection: Mutex::new(None),
            connects: AtomicU64::new(0),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Listeners added after the connection was established are notified
    /// immediately.
    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        let established = {
            let mut listeners = lock(&self.listeners);
            let established = lock(&self.connection).clone();
            if established.is_none() {
                listeners.push(Arc::clone(&listener));
            }
            established
        };
        if let Some(connection) = established {
            listener.on_established(&connection);
        }
    }

    #[must_use]
    pub fn connection(&self) -> Option<ConnectionInfo> {
        lock(&self.connection).clone()
    }

    fn establish(&self) -> ConnectionInfo {
        let attempt = self.connects.fetch_add(1, Ordering::AcqRel);
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        ConnectionInfo {
            app_name: self.app_name.clone(),
            run_id: format!("{epoch:x}-{attempt}"),
        }
    }
}

#[async_trait]
impl Service for RpmServiceManager {
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
        let connection = self.establish();
        let listeners = {
            // Same lock order as add_connection_listener.
            let mut listeners = lock(&self.listeners);
            *lock(&self.connection) = Some(connection.clone());
            std::mem::take(&mut *listeners)
        };
        debug!("Notifying {} connection listeners", listeners.len());
        for listener in listeners {
            listener.on_established(&connection);
        }
        info!(app_name = %connection.app_name, run_id = %connection.run_id, "Connection established");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if self.lifecycle.begin_stop(Self::NAME)? {
            lock(&self.connection).take();
        }
        Ok(())
    }
}
