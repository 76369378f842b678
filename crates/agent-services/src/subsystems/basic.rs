// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Subsystems whose only manager-visible behavior is their lifecycle.

use super::simple_service;

simple_service!(
    /// Tracks agent-owned threads so they are excluded from profiling.
    ThreadService,
    "ThreadService"
);

simple_service!(
    /// Trips instrumentation off when the host is under memory pressure.
    CircuitBreakerService,
    "CircuitBreakerService",
    enabled_by = "circuitbreaker.enabled"
);

simple_service!(JmxService, "JmxService", enabled_by = "jmx.enabled");

simple_service!(
    JarCollectorService,
    "JarCollectorService",
    enabled_by = "jar_collector.enabled"
);

simple_service!(SourceLanguageService, "SourceLanguageService");

simple_service!(ExpirationService, "ExpirationService");

simple_service!(TracerService, "TracerService");

simple_service!(
    /// Lets asynchronous parts of a transaction register themselves. Must
    /// exist before the first class transformation happens.
    AsyncTransactionService,
    "AsyncTransactionService"
);

simple_service!(
    /// Called when a transaction finishes; must exist before the first
    /// class transformation happens.
    EnvironmentService,
    "EnvironmentService"
);

simple_service!(CacheService, "CacheService");

simple_service!(RpmConnectionService, "RPMConnectionService");

simple_service!(TransactionService, "TransactionService");

simple_service!(
    DistributedTraceService,
    "DistributedTraceService",
    enabled_by = "distributed_tracing.enabled"
);

simple_service!(NormalizationService, "NormalizationService");

simple_service!(
    TransactionTraceService,
    "TransactionTraceService",
    enabled_by = "transaction_tracer.enabled"
);

simple_service!(
    TransactionEventsService,
    "TransactionEventsService",
    enabled_by = "transaction_events.enabled"
);

simple_service!(
    ProfilerService,
    "ProfilerService",
    enabled_by = "thread_profiler.enabled"
);

simple_service!(CommandParser, "CommandParser");

simple_service!(
    DeadlockDetectorService,
    "DeadlockService",
    enabled_by = "deadlock_detector.enabled"
);

simple_service!(
    SqlTraceService,
    "SqlTraceService",
    enabled_by = "slow_sql.enabled"
);

simple_service!(DatabaseService, "DatabaseService");

simple_service!(
    BrowserService,
    "BrowserService",
    enabled_by = "browser_monitoring.auto_instrument"
);

simple_service!(
    RemoteInstrumentationService,
    "RemoteInstrumentationService"
);

simple_service!(
    AttributesService,
    "AttributesService",
    enabled_by = "attributes.enabled"
);

simple_service!(
    InsightsService,
    "InsightsService",
    enabled_by = "custom_insights_events.enabled"
);

simple_service!(
    SpanEventsService,
    "SpanEventsService",
    enabled_by = "span_events.enabled"
);
