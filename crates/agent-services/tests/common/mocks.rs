// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fake services and core implementations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use agent_services::core_service::TransformerTable;
use agent_services::subsystems::connection::{ConnectionInfo, ConnectionListener};
use agent_services::{
    CoreService, Instrumentation, Service, ServiceError, ServiceManager, ServiceState,
};

use super::helpers::Journal;

/// Dynamic service that journals its lifecycle calls and can be told to fail.
pub struct RecordingService {
    name: String,
    journal: Journal,
    fail_start: bool,
    fail_stop: bool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    state: Mutex<ServiceState>,
}

impl RecordingService {
    pub fn new(name: &str, journal: &Journal) -> Arc<Self> {
        Self::build(name, journal, false, false)
    }

    pub fn failing_start(name: &str, journal: &Journal) -> Arc<Self> {
        Self::build(name, journal, true, false)
    }

    pub fn failing_stop(name: &str, journal: &Journal) -> Arc<Self> {
        Self::build(name, journal, false, true)
    }

    fn build(name: &str, journal: &Journal, fail_start: bool, fail_stop: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            journal: Arc::clone(journal),
            fail_start,
            fail_stop,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            state: Mutex::new(ServiceState::Created),
        })
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Service for RecordingService {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push(format!("start {}", self.name));
        if self.fail_start {
            return Err(ServiceError::start_failed(&self.name, "boom"));
        }
        *self.state.lock().unwrap() = ServiceState::Started;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push(format!("stop {}", self.name));
        *self.state.lock().unwrap() = ServiceState::Stopped;
        if self.fail_stop {
            return Err(ServiceError::stop_failed(&self.name, "port busy"));
        }
        Ok(())
    }
}

/// Core service fake with a configurable start outcome.
pub struct MockCore {
    instrumentation: Option<Arc<TransformerTable>>,
    start_error: Option<ServiceError>,
    journal: Journal,
    state: Mutex<ServiceState>,
}

impl MockCore {
    pub fn instrumented(journal: &Journal) -> Arc<Self> {
        Self::build(Some(Arc::new(TransformerTable::new())), None, journal)
    }

    pub fn detached(journal: &Journal) -> Arc<Self> {
        Self::build(None, None, journal)
    }

    pub fn failing(error: ServiceError, journal: &Journal) -> Arc<Self> {
        Self::build(Some(Arc::new(TransformerTable::new())), Some(error), journal)
    }

    fn build(
        instrumentation: Option<Arc<TransformerTable>>,
        start_error: Option<ServiceError>,
        journal: &Journal,
    ) -> Arc<Self> {
        Arc::new(Self {
            instrumentation,
            start_error,
            journal: Arc::clone(journal),
            state: Mutex::new(ServiceState::Created),
        })
    }

    pub fn transformers(&self) -> Vec<String> {
        self.instrumentation
            .as_ref()
            .map(|table| table.transformers())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Service for MockCore {
    fn name(&self) -> &str {
        "CoreService"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        *self.state.lock().unwrap()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.journal.lock().unwrap().push("start CoreService".to_string());
        if let Some(error) = &self.start_error {
            return Err(error.clone());
        }
        *self.state.lock().unwrap() = ServiceState::Started;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.journal.lock().unwrap().push("stop CoreService".to_string());
        *self.state.lock().unwrap() = ServiceState::Stopped;
        Ok(())
    }
}

impl CoreService for MockCore {
    fn instrumentation(&self) -> Option<Arc<dyn Instrumentation>> {
        self.instrumentation
            .as_ref()
            .map(|table| Arc::clone(table) as Arc<dyn Instrumentation>)
    }
}

/// Records connections it is told about.
#[derive(Default)]
pub struct RecordingListener {
    pub seen: Mutex<Vec<ConnectionInfo>>,
}

impl ConnectionListener for RecordingListener {
    fn on_established(&self, connection: &ConnectionInfo) {
        self.seen.lock().unwrap().push(connection.clone());
    }
}

/// Dynamic service that, when started, inspects the connection manager and
/// subscribes a listener to it.
pub struct LateSubscriber {
    manager: Mutex<Weak<ServiceManager>>,
    pub listener: Arc<RecordingListener>,
    pub connection_manager_state: Mutex<Option<ServiceState>>,
}

impl LateSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            manager: Mutex::new(Weak::new()),
            listener: Arc::new(RecordingListener::default()),
            connection_manager_state: Mutex::new(None),
        })
    }

    pub fn attach(&self, manager: &Arc<ServiceManager>) {
        *self.manager.lock().unwrap() = Arc::downgrade(manager);
    }
}

#[async_trait::async_trait]
impl Service for LateSubscriber {
    fn name(&self) -> &str {
        "LateSubscriber"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        ServiceState::Created
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let manager = self
            .manager
            .lock()
            .unwrap()
            .upgrade()
            .ok_or_else(|| ServiceError::start_failed("LateSubscriber", "manager dropped"))?;
        let services = manager
            .services()
            .ok_or_else(|| ServiceError::start_failed("LateSubscriber", "not constructed"))?;
        let connection_manager = services.rpm_service_manager();
        *self.connection_manager_state.lock().unwrap() = Some(connection_manager.state());
        connection_manager.add_connection_listener(Arc::clone(&self.listener) as Arc<dyn ConnectionListener>);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
