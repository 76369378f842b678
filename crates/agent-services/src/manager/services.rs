// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The static service set: one typed slot per built-in subsystem.

use std::sync::Arc;

use tracing::debug;

use super::ordering::{ConstructStep, SubsystemId};
use super::timing::StartupTimings;
use crate::config::ConfigService;
use crate::error::{ManagerError, ServiceError};
use crate::service::Service;
use crate::stats::StatsEngineService;
use crate::subsystems::basic::{
    AsyncTransactionService, AttributesService, BrowserService, CacheService,
    CircuitBreakerService, CommandParser, DatabaseService, DeadlockDetectorService,
    DistributedTraceService, EnvironmentService, ExpirationService, InsightsService,
    JarCollectorService, JmxService, NormalizationService, ProfilerService,
    RemoteInstrumentationService, RpmConnectionService, SourceLanguageService, SpanEventsService,
    SqlTraceService, ThreadService, TracerService, TransactionEventsService,
    TransactionService, TransactionTraceService,
};
use crate::subsystems::connection::RpmServiceManager;
use crate::subsystems::harvest::HarvestService;
use crate::subsystems::sampling::{
    NoopSamplerService, PeriodicSampler, SamplerService, CPU_SAMPLER_SERVICE, GC_SERVICE,
    SAMPLER_SERVICE,
};
use crate::subsystems::transform::{ClassTransformerService, ExtensionService};
use crate::subsystems::utilization::UtilizationService;
use crate::subsystems::SubsystemContext;

/// Declares [`StaticServices`] and the partially built set used while
/// construction is in progress.
macro_rules! static_services {
    ($($field:ident: $ty:ty => $id:ident),+ $(,)?) => {
        /// Fully constructed static subsystems.
        ///
        /// Slots never change once the set exists. Sampler slots hold a no-op
        /// variant when the process is not instrumented.
        pub struct StaticServices {
            $($field: Arc<$ty>,)+
        }

        impl StaticServices {
            $(
                #[must_use]
                pub fn $field(&self) -> &Arc<$ty> {
                    &self.$field
                }
            )+

            /// The slot as a plain lifecycle participant.
            #[must_use]
            pub fn service(&self, id: SubsystemId) -> Arc<dyn Service> {
                match id {
                    $(SubsystemId::$id => Arc::clone(&self.$field) as Arc<dyn Service>,)+
                }
            }
        }

        #[derive(Default)]
        struct PartialServices {
            $($field: Option<Arc<$ty>>,)+
        }

        impl PartialServices {
            fn built(&self, id: SubsystemId) -> Option<Arc<dyn Service>> {
                match id {
                    $(SubsystemId::$id => self
                        .$field
                        .as_ref()
                        .map(|s| Arc::clone(s) as Arc<dyn Service>),)+
                }
            }

            fn finish(self) -> Result<StaticServices, ServiceError> {
                Ok(StaticServices {
                    $($field: self.$field.ok_or(ServiceError::MissingDependency {
                        service: "ServiceManager",
                        dependency: SubsystemId::$id.service_name(),
                    })?,)+
                })
            }
        }
    };
}

static_services! {
    thread_service: ThreadService => Thread,
    circuit_breaker_service: CircuitBreakerService => CircuitBreaker,
    class_transformer_service: ClassTransformerService => ClassTransformer,
    jmx_service: JmxService => Jmx,
    extension_service: ExtensionService => Extension,
    jar_collector_service: JarCollectorService => JarCollector,
    source_language_service: SourceLanguageService => SourceLanguage,
    expiration_service: ExpirationService => Expiration,
    tracer_service: TracerService => Tracer,
    async_transaction_service: AsyncTransactionService => AsyncTransaction,
    environment_service: EnvironmentService => Environment,
    cache_service: CacheService => Cache,
    stats_engine: StatsEngineService => Stats,
    utilization_service: UtilizationService => Utilization,
    rpm_connection_service: RpmConnectionService => RpmConnection,
    transaction_service: TransactionService => Transaction,
    distributed_trace_service: DistributedTraceService => DistributedTrace,
    rpm_service_manager: RpmServiceManager => RpmServiceManager,
    normalization_service: NormalizationService => Normalization,
    harvest_service: HarvestService => Harvest,
    gc_service: dyn SamplerService => Gc,
    transaction_trace_service: TransactionTraceService => TransactionTrace,
    transaction_events_service: TransactionEventsService => TransactionEvents,
    profiler_service: ProfilerService => Profiler,
    command_parser: CommandParser => CommandParser,
    cpu_sampler_service: dyn SamplerService => CpuSampler,
    deadlock_detector_service: DeadlockDetectorService => Deadlock,
    sampler_service: dyn SamplerService => Sampler,
    sql_trace_service: SqlTraceService => SqlTrace,
    database_service: DatabaseService => Database,
    browser_service: BrowserService => Browser,
    remote_instrumentation_service: RemoteInstrumentationService => RemoteInstrumentation,
    attributes_service: AttributesService => Attributes,
    insights_service: InsightsService => Insights,
    span_events_service: SpanEventsService => SpanEvents,
    config_service: ConfigService => Config,
}

impl PartialServices {
    fn build(&mut self, id: SubsystemId, ctx: &SubsystemContext) -> Result<(), ServiceError> {
        for dependency in id.dependencies() {
            if self.built(*dependency).is_none() {
                return Err(ServiceError::MissingDependency {
                    service: id.service_name(),
                    dependency: dependency.service_name(),
                });
            }
        }

        let config = &*ctx.config;
        let real = ctx.is_real_agent();
        match id {
            SubsystemId::Thread => self.thread_service = Some(Arc::new(ThreadService::new(config))),
            SubsystemId::CircuitBreaker => {
                self.circuit_breaker_service = Some(Arc::new(CircuitBreakerService::new(config)));
            }
            SubsystemId::ClassTransformer => {
                self.class_transformer_service = Some(Arc::new(ClassTransformerService::new(ctx)));
            }
            SubsystemId::Jmx => self.jmx_service = Some(Arc::new(JmxService::new(config))),
            SubsystemId::Extension => {
                self.extension_service = Some(Arc::new(ExtensionService::new(config)));
            }
            SubsystemId::JarCollector => {
                self.jar_collector_service = Some(Arc::new(JarCollectorService::new(config)));
            }
            SubsystemId::SourceLanguage => {
                self.source_language_service = Some(Arc::new(SourceLanguageService::new(config)));
            }
            SubsystemId::Expiration => {
                self.expiration_service = Some(Arc::new(ExpirationService::new(config)));
            }
            SubsystemId::Tracer => self.tracer_service = Some(Arc::new(TracerService::new(config))),
            SubsystemId::AsyncTransaction => {
                self.async_transaction_service =
                    Some(Arc::new(AsyncTransactionService::new(config)));
            }
            SubsystemId::Environment => {
                self.environment_service = Some(Arc::new(EnvironmentService::new(config)));
            }
            SubsystemId::Cache => self.cache_service = Some(Arc::new(CacheService::new(config))),
            SubsystemId::Stats => {
                let engine = Arc::new(StatsEngineService::new());
                ctx.stats.publish(Arc::clone(&engine));
                self.stats_engine = Some(engine);
            }
            SubsystemId::Utilization => {
                self.utilization_service = Some(Arc::new(UtilizationService::new(ctx)));
            }
            SubsystemId::RpmConnection => {
                self.rpm_connection_service = Some(Arc::new(RpmConnectionService::new(config)));
            }
            SubsystemId::Transaction => {
                self.transaction_service = Some(Arc::new(TransactionService::new(config)));
            }
            SubsystemId::DistributedTrace => {
                self.distributed_trace_service =
                    Some(Arc::new(DistributedTraceService::new(config)));
            }
            SubsystemId::RpmServiceManager => {
                self.rpm_service_manager = Some(Arc::new(RpmServiceManager::new(ctx)));
            }
            SubsystemId::Normalization => {
                self.normalization_service = Some(Arc::new(NormalizationService::new(config)));
            }
            SubsystemId::Harvest => {
                let harvest = HarvestService::new(ctx);
                // The extension service started before harvest existed.
                if let Some(extension) = &self.extension_service {
                    harvest.add_harvest_listener(extension.clone());
                }
                self.harvest_service = Some(Arc::new(harvest));
            }
            SubsystemId::Gc => {
                let sampler: Arc<dyn SamplerService> = if real {
                    Arc::new(PeriodicSampler::gc(ctx))
                } else {
                    Arc::new(NoopSamplerService::new(GC_SERVICE))
                };
                self.gc_service = Some(sampler);
            }
            SubsystemId::TransactionTrace => {
                self.transaction_trace_service =
                    Some(Arc::new(TransactionTraceService::new(config)));
            }
            SubsystemId::TransactionEvents => {
                self.transaction_events_service =
                    Some(Arc::new(TransactionEventsService::new(config)));
            }
            SubsystemId::Profiler => {
                self.profiler_service = Some(Arc::new(ProfilerService::new(config)));
            }
            SubsystemId::CommandParser => {
                self.command_parser = Some(Arc::new(CommandParser::new(config)));
            }
            SubsystemId::CpuSampler => {
                let sampler: Arc<dyn SamplerService> = if real {
                    Arc::new(PeriodicSampler::cpu(ctx))
                } else {
                    Arc::new(NoopSamplerService::new(CPU_SAMPLER_SERVICE))
                };
                self.cpu_sampler_service = Some(sampler);
            }
            SubsystemId::Deadlock => {
                self.deadlock_detector_service =
                    Some(Arc::new(DeadlockDetectorService::new(config)));
            }
            SubsystemId::Sampler => {
                let sampler: Arc<dyn SamplerService> = if real {
                    Arc::new(PeriodicSampler::memory(ctx))
                } else {
                    Arc::new(NoopSamplerService::new(SAMPLER_SERVICE))
                };
                self.sampler_service = Some(sampler);
            }
            SubsystemId::SqlTrace => {
                self.sql_trace_service = Some(Arc::new(SqlTraceService::new(config)));
            }
            SubsystemId::Database => {
                self.database_service = Some(Arc::new(DatabaseService::new(config)));
            }
            SubsystemId::Browser => {
                self.browser_service = Some(Arc::new(BrowserService::new(config)));
            }
            SubsystemId::RemoteInstrumentation => {
                self.remote_instrumentation_service =
                    Some(Arc::new(RemoteInstrumentationService::new(config)));
            }
            SubsystemId::Attributes => {
                self.attributes_service = Some(Arc::new(AttributesService::new(config)));
            }
            SubsystemId::Insights => {
                self.insights_service = Some(Arc::new(InsightsService::new(config)));
            }
            SubsystemId::SpanEvents => {
                self.span_events_service = Some(Arc::new(SpanEventsService::new(config)));
            }
            // Provided by the manager before construction begins.
            SubsystemId::Config => {}
        }
        Ok(())
    }
}

/// Runs the construction phase over `steps`.
///
/// Builds every subsystem, publishes the real stats engine (replaying the
/// bootstrap queue) and performs the early starts. Nothing else is started.
pub(crate) async fn construct(
    steps: &[ConstructStep],
    ctx: &SubsystemContext,
    config: Arc<ConfigService>,
    timings: &mut StartupTimings,
) -> Result<StaticServices, ManagerError> {
    let mut partial = PartialServices {
        config_service: Some(config),
        ..PartialServices::default()
    };

    for step in steps {
        let id = step.id();
        let aborted = |source: ServiceError| ManagerError::SubsystemStart {
            name: id.service_name().to_string(),
            source,
        };
        match step {
            ConstructStep::Build(_) => {
                debug!("Constructing {}", id.service_name());
                partial.build(id, ctx).map_err(aborted)?;
            }
            ConstructStep::StartEarly(_) => start_early(&partial, id, timings).await?,
            ConstructStep::StartEarlyIfInstrumented(_) => {
                if ctx.is_real_agent() {
                    start_early(&partial, id, timings).await?;
                } else {
                    debug!("Not instrumented, {} stays unstarted", id.service_name());
                }
            }
        }
    }

    partial.finish().map_err(|source| ManagerError::SubsystemStart {
        name: "ServiceManager".to_string(),
        source,
    })
}

async fn start_early(
    partial: &PartialServices,
    id: SubsystemId,
    timings: &mut StartupTimings,
) -> Result<(), ManagerError> {
    let aborted = |source: ServiceError| ManagerError::SubsystemStart {
        name: id.service_name().to_string(),
        source,
    };
    let service = partial.built(id).ok_or_else(|| {
        aborted(ServiceError::MissingDependency {
            service: "ServiceManager",
            dependency: id.service_name(),
        })
    })?;
    debug!("Starting {} early", id.service_name());
    timings
        .time(id.service_name(), service.start())
        .await
        .map_err(aborted)
}
