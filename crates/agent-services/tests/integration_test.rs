// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the service manager lifecycle

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_services::manager::ordering::SubsystemId;
use agent_services::stats::BootstrapStatsService;
use agent_services::subsystems::sampling::SamplerService;
use agent_services::{
    ManagerError, ManagerState, Service, ServiceError, ServiceManager, ServiceState, StatsWork,
};
use common::helpers::{entries, journal, manager_with, position};
use common::mocks::{LateSubscriber, MockCore, RecordingService};

#[tokio::test]
async fn test_every_static_subsystem_started_when_instrumented() {
    let journal = journal();
    let core = MockCore::instrumented(&journal);
    let manager = manager_with(core.clone());

    manager.start().await.expect("start");
    assert_eq!(manager.state(), ManagerState::Running);
    assert_eq!(core.state(), ServiceState::Started);

    let services = manager.services().expect("constructed");
    for id in SubsystemId::ALL {
        assert_eq!(
            services.service(id).state(),
            ServiceState::Started,
            "{id:?} not started"
        );
    }
    assert_eq!(core.transformers(), vec!["agent-class-transformer"]);

    let report = manager.stop().await.expect("stop");
    assert!(report.is_clean(), "{:?}", report.failures());
    for id in SubsystemId::ALL {
        assert_eq!(services.service(id).state(), ServiceState::Stopped);
    }
    assert!(core.transformers().is_empty());
    assert_eq!(core.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_bootstrap_work_replayed_in_submission_order() {
    let journal = journal();
    let manager = manager_with(MockCore::detached(&journal));

    let bootstrap = manager.stats_service();
    assert_eq!(bootstrap.name(), BootstrapStatsService::NAME);
    bootstrap.do_stats_work(StatsWork::increment("Supportability/First"));
    bootstrap.do_stats_work(StatsWork::record_value("Supportability/Second", 2.0));
    bootstrap.do_stats_work(StatsWork::increment("Supportability/Third"));

    manager.start().await.expect("start");

    let stats = manager.stats_service();
    assert_ne!(stats.name(), BootstrapStatsService::NAME);
    let snapshot = stats.harvest();
    assert_eq!(
        snapshot.names(),
        vec![
            "Supportability/First",
            "Supportability/Second",
            "Supportability/Third"
        ]
    );
    for metric in &snapshot.metrics {
        assert_eq!(metric.call_count, 1, "{} replayed twice", metric.name);
    }

    // A stale handle to the bootstrap buffer no longer reaches the engine.
    bootstrap.do_stats_work(StatsWork::increment("Supportability/Late"));
    assert!(stats.harvest().is_empty());
    assert!(bootstrap.harvest().is_empty());

    manager.stop().await.expect("stop");
}

#[tokio::test]
async fn test_second_start_is_rejected_without_restarting() {
    let journal = journal();
    let manager = manager_with(MockCore::instrumented(&journal));
    let plugin = RecordingService::new("Plugin", &journal);
    manager.add_service(plugin.clone());

    manager.start().await.expect("start");
    let result = manager.start().await;
    assert!(matches!(
        result,
        Err(ManagerError::InvalidState {
            action: "start",
            state: ManagerState::Running
        })
    ));
    assert_eq!(plugin.starts(), 1);
    assert_eq!(
        entries(&journal)
            .iter()
            .filter(|e| *e == "start CoreService")
            .count(),
        1
    );

    manager.stop().await.expect("stop");
}

#[tokio::test]
async fn test_core_start_failure_aborts_startup() {
    let journal = journal();
    let cause = ServiceError::start_failed("CoreService", "attach refused");
    let manager = manager_with(MockCore::failing(cause.clone(), &journal));
    let plugin = RecordingService::new("Plugin", &journal);
    manager.add_service(plugin.clone());

    match manager.start().await {
        Err(ManagerError::CoreStart(source)) => assert_eq!(source, cause),
        other => panic!("expected CoreStart, got {other:?}"),
    }
    assert_eq!(manager.state(), ManagerState::Failed);
    assert!(manager.services().is_none());
    assert_eq!(plugin.starts(), 0);
    assert_eq!(manager.stats_service().name(), BootstrapStatsService::NAME);

    // A failed manager can still be shut down.
    let report = manager.stop().await.expect("stop");
    assert!(report.is_clean());
    assert_eq!(plugin.stops(), 1);
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(
        entries(&journal).last().map(String::as_str),
        Some("stop CoreService")
    );
}

#[tokio::test]
async fn test_dynamic_registration_last_wins() {
    let journal = journal();
    let manager = manager_with(MockCore::detached(&journal));
    let first = RecordingService::new("Plugin", &journal);
    let second = RecordingService::new("Plugin", &journal);

    assert!(manager.add_service(first.clone()).is_none());
    assert!(manager.add_service(second.clone()).is_some());

    let found = manager.get_service("Plugin").expect("registered");
    assert!(Arc::ptr_eq(
        &found,
        &(second.clone() as Arc<dyn Service>)
    ));
    assert!(manager.get_service("Missing").is_none());

    manager.start().await.expect("start");
    assert_eq!(first.starts(), 0);
    assert_eq!(second.starts(), 1);
    manager.stop().await.expect("stop");
}

#[tokio::test]
async fn test_dynamic_start_failure_is_tolerated() {
    let journal = journal();
    let manager = manager_with(MockCore::instrumented(&journal));
    let broken = RecordingService::failing_start("Broken", &journal);
    let healthy = RecordingService::new("Healthy", &journal);
    manager.add_service(broken.clone());
    manager.add_service(healthy.clone());

    manager.start().await.expect("dynamic failures do not abort startup");
    assert_eq!(manager.state(), ManagerState::Running);
    assert_eq!(broken.starts(), 1);
    assert_eq!(healthy.state(), ServiceState::Started);

    let services = manager.services().expect("constructed");
    assert_eq!(
        services.rpm_service_manager().state(),
        ServiceState::Started
    );
    manager.stop().await.expect("stop");
}

#[tokio::test]
async fn test_connection_manager_starts_after_dynamic_services() {
    let journal = journal();
    let manager = Arc::new(manager_with(MockCore::instrumented(&journal)));
    let subscriber = LateSubscriber::new();
    subscriber.attach(&manager);
    manager.add_service(subscriber.clone());

    manager.start().await.expect("start");

    assert_eq!(
        *subscriber.connection_manager_state.lock().unwrap(),
        Some(ServiceState::Created)
    );
    let seen = subscriber.listener.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].app_name, "My Application");
    let connection = manager
        .services()
        .and_then(|s| s.rpm_service_manager().connection());
    assert_eq!(connection.as_ref(), Some(&seen[0]));

    manager.stop().await.expect("stop");
}

#[tokio::test]
async fn test_detached_mode_uses_noop_samplers() {
    let journal = journal();
    let manager = ServiceManager::new(
        MockCore::detached(&journal),
        common::helpers::quiet_config().with_setting("sampler.interval_ms", "5"),
    )
    .unwrap();

    manager.start().await.expect("start");
    let services = manager.services().expect("constructed");

    for sampler in [
        services.gc_service(),
        services.cpu_sampler_service(),
        services.sampler_service(),
    ] {
        assert!(sampler.is_enabled());
        assert_eq!(sampler.state(), ServiceState::Started);
        assert_eq!(sampler.samples_taken(), 0);
    }
    assert_eq!(services.gc_service().name(), "GCService");
    assert_eq!(services.cpu_sampler_service().name(), "CPUSamplerService");
    assert_eq!(services.sampler_service().name(), "SamplerService");

    // Host facts are only collected for an instrumented process.
    assert_eq!(
        services.utilization_service().state(),
        ServiceState::Created
    );
    assert!(services.utilization_service().data().is_none());

    tokio::time::sleep(Duration::from_millis(30)).await;
    let snapshot = manager.stats_service().harvest();
    assert!(
        snapshot.get("Memory/Physical").is_none() && snapshot.get("CPU/User Time").is_none(),
        "{:?}",
        snapshot.names()
    );

    let report = manager.stop().await.expect("stop");
    assert!(report.is_clean(), "{:?}", report.failures());
}

#[tokio::test]
async fn test_stop_continues_past_failures() {
    let journal = journal();
    let manager = manager_with(MockCore::instrumented(&journal));
    let stubborn = RecordingService::failing_stop("Stubborn", &journal);
    let polite = RecordingService::new("Polite", &journal);
    manager.add_service(stubborn.clone());
    manager.add_service(polite.clone());

    manager.start().await.expect("start");
    let report = manager.stop().await.expect("stop");

    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(report.failures().len(), 1);
    let (name, error) = &report.failures()[0];
    assert_eq!(name, "Stubborn");
    assert!(matches!(error, ServiceError::StopFailed { .. }));

    assert_eq!(stubborn.stops(), 1);
    assert_eq!(polite.stops(), 1);
    let services = manager.services().expect("constructed");
    assert_eq!(services.harvest_service().state(), ServiceState::Stopped);
    assert_eq!(services.stats_engine().state(), ServiceState::Stopped);

    // Dynamic services go down first and the core service last.
    assert!(position(&journal, "stop Stubborn") < position(&journal, "stop CoreService"));
    assert!(position(&journal, "stop Polite") < position(&journal, "stop CoreService"));
    assert_eq!(
        entries(&journal).last().map(String::as_str),
        Some("stop CoreService")
    );

    assert!(matches!(
        manager.stop().await,
        Err(ManagerError::InvalidState {
            action: "stop",
            state: ManagerState::Stopped
        })
    ));
}

#[tokio::test]
async fn test_services_configuration_serializes() {
    let journal = journal();
    let manager = ServiceManager::new(
        MockCore::instrumented(&journal),
        common::helpers::quiet_config().with_setting("jmx.enabled", "false"),
    )
    .unwrap();
    manager.add_service(RecordingService::new("Plugin", &journal));
    manager.start().await.expect("start");

    let json = serde_json::to_value(manager.services_configuration()).unwrap();
    assert_eq!(json["JmxService"]["enabled"], serde_json::Value::Bool(false));
    assert_eq!(json["HarvestService"]["enabled"], serde_json::Value::Bool(true));
    assert_eq!(json["Plugin"]["enabled"], serde_json::Value::Bool(true));

    let timings = serde_json::to_value(manager.timings()).unwrap();
    assert!(timings["steps"].as_array().is_some_and(|s| !s.is_empty()));

    manager.stop().await.expect("stop");
}
