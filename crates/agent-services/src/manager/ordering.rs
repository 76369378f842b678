// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Construction, start and stop orders of the static subsystems.
//!
//! The three orders are independent on purpose. A subsystem may be built
//! early and started late, and teardown is not the reverse of startup.
//! The hazards behind the orders are written down as
//! [`ORDERING_CONSTRAINTS`] and [`SubsystemId::dependencies`];
//! [`check_ordering`] rejects tables that break any of them.

use std::collections::HashMap;

use crate::config::ConfigService;
use crate::error::ManagerError;
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
use crate::subsystems::sampling::{CPU_SAMPLER_SERVICE, GC_SERVICE, SAMPLER_SERVICE};
use crate::subsystems::transform::{ClassTransformerService, ExtensionService};
use crate::subsystems::utilization::UtilizationService;

/// One slot of the static service set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubsystemId {
    Thread,
    CircuitBreaker,
    ClassTransformer,
    Jmx,
    Extension,
    JarCollector,
    SourceLanguage,
    Expiration,
    Tracer,
    AsyncTransaction,
    Environment,
    Cache,
    Stats,
    Utilization,
    RpmConnection,
    Transaction,
    DistributedTrace,
    RpmServiceManager,
    Normalization,
    Harvest,
    Gc,
    TransactionTrace,
    TransactionEvents,
    Profiler,
    CommandParser,
    CpuSampler,
    Deadlock,
    Sampler,
    SqlTrace,
    Database,
    Browser,
    RemoteInstrumentation,
    Attributes,
    Insights,
    SpanEvents,
    Config,
}

impl SubsystemId {
    pub const ALL: [SubsystemId; 36] = [
        SubsystemId::Thread,
        SubsystemId::CircuitBreaker,
        SubsystemId::ClassTransformer,
        SubsystemId::Jmx,
        SubsystemId::Extension,
        SubsystemId::JarCollector,
        SubsystemId::SourceLanguage,
        SubsystemId::Expiration,
        SubsystemId::Tracer,
        SubsystemId::AsyncTransaction,
        SubsystemId::Environment,
        SubsystemId::Cache,
        SubsystemId::Stats,
        SubsystemId::Utilization,
        SubsystemId::RpmConnection,
        SubsystemId::Transaction,
        SubsystemId::DistributedTrace,
        SubsystemId::RpmServiceManager,
        SubsystemId::Normalization,
        SubsystemId::Harvest,
        SubsystemId::Gc,
        SubsystemId::TransactionTrace,
        SubsystemId::TransactionEvents,
        SubsystemId::Profiler,
        SubsystemId::CommandParser,
        SubsystemId::CpuSampler,
        SubsystemId::Deadlock,
        SubsystemId::Sampler,
        SubsystemId::SqlTrace,
        SubsystemId::Database,
        SubsystemId::Browser,
        SubsystemId::RemoteInstrumentation,
        SubsystemId::Attributes,
        SubsystemId::Insights,
        SubsystemId::SpanEvents,
        SubsystemId::Config,
    ];

    /// The name the slot's service reports.
    #[must_use]
    pub const fn service_name(self) -> &'static str {
        match self {
            SubsystemId::Thread => ThreadService::NAME,
            SubsystemId::CircuitBreaker => CircuitBreakerService::NAME,
            SubsystemId::ClassTransformer => ClassTransformerService::NAME,
            SubsystemId::Jmx => JmxService::NAME,
            SubsystemId::Extension => ExtensionService::NAME,
            SubsystemId::JarCollector => JarCollectorService::NAME,
            SubsystemId::SourceLanguage => SourceLanguageService::NAME,
            SubsystemId::Expiration => ExpirationService::NAME,
            SubsystemId::Tracer => TracerService::NAME,
            SubsystemId::AsyncTransaction => AsyncTransactionService::NAME,
            SubsystemId::Environment => EnvironmentService::NAME,
            SubsystemId::Cache => CacheService::NAME,
            SubsystemId::Stats => StatsEngineService::NAME,
            SubsystemId::Utilization => UtilizationService::NAME,
            SubsystemId::RpmConnection => RpmConnectionService::NAME,
            SubsystemId::Transaction => TransactionService::NAME,
            SubsystemId::DistributedTrace => DistributedTraceService::NAME,
            SubsystemId::RpmServiceManager => RpmServiceManager::NAME,
            SubsystemId::Normalization => NormalizationService::NAME,
            SubsystemId::Harvest => HarvestService::NAME,
            SubsystemId::Gc => GC_SERVICE,
            SubsystemId::TransactionTrace => TransactionTraceService::NAME,
            SubsystemId::TransactionEvents => TransactionEventsService::NAME,
            SubsystemId::Profiler => ProfilerService::NAME,
            SubsystemId::CommandParser => CommandParser::NAME,
            SubsystemId::CpuSampler => CPU_SAMPLER_SERVICE,
            SubsystemId::Deadlock => DeadlockDetectorService::NAME,
            SubsystemId::Sampler => SAMPLER_SERVICE,
            SubsystemId::SqlTrace => SqlTraceService::NAME,
            SubsystemId::Database => DatabaseService::NAME,
            SubsystemId::Browser => BrowserService::NAME,
            SubsystemId::RemoteInstrumentation => RemoteInstrumentationService::NAME,
            SubsystemId::Attributes => AttributesService::NAME,
            SubsystemId::Insights => InsightsService::NAME,
            SubsystemId::SpanEvents => SpanEventsService::NAME,
            SubsystemId::Config => ConfigService::NAME,
        }
    }

    /// Slots that must already be built when this one is constructed.
    #[must_use]
    pub const fn dependencies(self) -> &'static [SubsystemId] {
        match self {
            SubsystemId::Harvest => &[SubsystemId::Stats, SubsystemId::Extension],
            SubsystemId::Gc | SubsystemId::CpuSampler | SubsystemId::Sampler => {
                &[SubsystemId::Stats]
            }
            SubsystemId::TransactionEvents => &[SubsystemId::DistributedTrace],
            SubsystemId::SpanEvents => &[
                SubsystemId::RpmServiceManager,
                SubsystemId::Transaction,
                SubsystemId::Environment,
            ],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Construct,
    Start,
    Stop,
}

/// One step of the construction phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructStep {
    Build(SubsystemId),
    /// Starts an already built subsystem during construction.
    StartEarly(SubsystemId),
    /// Like [`ConstructStep::StartEarly`], but only with a live
    /// instrumentation attachment. Otherwise the subsystem is never started.
    StartEarlyIfInstrumented(SubsystemId),
}

impl ConstructStep {
    #[must_use]
    pub const fn id(self) -> SubsystemId {
        match self {
            ConstructStep::Build(id)
            | ConstructStep::StartEarly(id)
            | ConstructStep::StartEarlyIfInstrumented(id) => id,
        }
    }

    const fn is_early_start(self) -> bool {
        !matches!(self, ConstructStep::Build(_))
    }
}

/// The configuration slot exists before the manager does and is not built
/// here.
pub const CONSTRUCTION_ORDER: &[ConstructStep] = &[
    ConstructStep::Build(SubsystemId::Thread),
    ConstructStep::Build(SubsystemId::CircuitBreaker),
    ConstructStep::Build(SubsystemId::ClassTransformer),
    ConstructStep::Build(SubsystemId::Jmx),
    ConstructStep::Build(SubsystemId::Extension),
    ConstructStep::Build(SubsystemId::JarCollector),
    ConstructStep::Build(SubsystemId::SourceLanguage),
    ConstructStep::Build(SubsystemId::Expiration),
    ConstructStep::Build(SubsystemId::Tracer),
    ConstructStep::Build(SubsystemId::AsyncTransaction),
    ConstructStep::Build(SubsystemId::Environment),
    // Nothing built from here until the transformer starts may load
    // instrumented types.
    ConstructStep::Build(SubsystemId::Cache),
    ConstructStep::StartEarly(SubsystemId::Extension),
    ConstructStep::StartEarly(SubsystemId::ClassTransformer),
    ConstructStep::Build(SubsystemId::Stats),
    ConstructStep::Build(SubsystemId::Utilization),
    ConstructStep::StartEarlyIfInstrumented(SubsystemId::Utilization),
    ConstructStep::Build(SubsystemId::RpmConnection),
    ConstructStep::Build(SubsystemId::Transaction),
    ConstructStep::Build(SubsystemId::DistributedTrace),
    ConstructStep::Build(SubsystemId::RpmServiceManager),
    ConstructStep::Build(SubsystemId::Normalization),
    ConstructStep::Build(SubsystemId::Harvest),
    ConstructStep::Build(SubsystemId::Gc),
    ConstructStep::Build(SubsystemId::TransactionTrace),
    ConstructStep::Build(SubsystemId::TransactionEvents),
    ConstructStep::Build(SubsystemId::Profiler),
    ConstructStep::Build(SubsystemId::CommandParser),
    ConstructStep::Build(SubsystemId::CpuSampler),
    ConstructStep::Build(SubsystemId::Deadlock),
    ConstructStep::Build(SubsystemId::Sampler),
    ConstructStep::Build(SubsystemId::SqlTrace),
    ConstructStep::Build(SubsystemId::Database),
    ConstructStep::Build(SubsystemId::Browser),
    ConstructStep::Build(SubsystemId::RemoteInstrumentation),
    ConstructStep::Build(SubsystemId::Attributes),
    ConstructStep::Build(SubsystemId::Insights),
    ConstructStep::Build(SubsystemId::SpanEvents),
];

/// Static start pass. Subsystems started during construction are absent,
/// as are those in [`START_AFTER_DYNAMIC`].
pub const START_ORDER: &[SubsystemId] = &[
    SubsystemId::AsyncTransaction,
    SubsystemId::Thread,
    SubsystemId::Stats,
    SubsystemId::Environment,
    SubsystemId::RpmConnection,
    SubsystemId::Tracer,
    SubsystemId::JarCollector,
    SubsystemId::SourceLanguage,
    SubsystemId::Expiration,
    SubsystemId::Harvest,
    SubsystemId::Gc,
    SubsystemId::Transaction,
    SubsystemId::TransactionTrace,
    SubsystemId::TransactionEvents,
    SubsystemId::Profiler,
    SubsystemId::CommandParser,
    SubsystemId::Jmx,
    SubsystemId::CpuSampler,
    SubsystemId::Deadlock,
    SubsystemId::Sampler,
    SubsystemId::SqlTrace,
    SubsystemId::Browser,
    SubsystemId::Cache,
    SubsystemId::Normalization,
    SubsystemId::Database,
    SubsystemId::Config,
    SubsystemId::RemoteInstrumentation,
    SubsystemId::Attributes,
    SubsystemId::Insights,
    SubsystemId::CircuitBreaker,
    SubsystemId::DistributedTrace,
    SubsystemId::SpanEvents,
];

/// Started once the dynamic services are up, so late registrants can still
/// add connection listeners.
pub const START_AFTER_DYNAMIC: &[SubsystemId] = &[SubsystemId::RpmServiceManager];

/// Static stop pass. Runs after the dynamic services are stopped and before
/// the core service.
pub const STOP_ORDER: &[SubsystemId] = &[
    SubsystemId::Insights,
    SubsystemId::CircuitBreaker,
    SubsystemId::RemoteInstrumentation,
    SubsystemId::Config,
    SubsystemId::ClassTransformer,
    SubsystemId::RpmConnection,
    SubsystemId::Deadlock,
    SubsystemId::JarCollector,
    SubsystemId::Harvest,
    SubsystemId::CpuSampler,
    SubsystemId::Sampler,
    SubsystemId::SqlTrace,
    SubsystemId::Normalization,
    SubsystemId::Database,
    SubsystemId::Extension,
    SubsystemId::Transaction,
    SubsystemId::Tracer,
    SubsystemId::Thread,
    SubsystemId::TransactionTrace,
    SubsystemId::TransactionEvents,
    SubsystemId::Profiler,
    SubsystemId::CommandParser,
    SubsystemId::Jmx,
    SubsystemId::RpmServiceManager,
    SubsystemId::Environment,
    SubsystemId::Stats,
    SubsystemId::Browser,
    SubsystemId::Cache,
    SubsystemId::Attributes,
    SubsystemId::SourceLanguage,
    SubsystemId::Expiration,
    SubsystemId::Utilization,
    SubsystemId::AsyncTransaction,
    SubsystemId::Gc,
    SubsystemId::DistributedTrace,
    SubsystemId::SpanEvents,
];

/// `before` must precede `after` in `sequence`.
///
/// In the construction sequence a subsystem's position is its last step, so
/// a subsystem that is started early counts from its early start.
#[derive(Debug, Clone, Copy)]
pub struct OrderingConstraint {
    pub sequence: Sequence,
    pub before: SubsystemId,
    pub after: SubsystemId,
    pub reason: &'static str,
}

const fn constraint(
    sequence: Sequence,
    before: SubsystemId,
    after: SubsystemId,
    reason: &'static str,
) -> OrderingConstraint {
    OrderingConstraint {
        sequence,
        before,
        after,
        reason,
    }
}

pub const ORDERING_CONSTRAINTS: &[OrderingConstraint] = &[
    constraint(
        Sequence::Construct,
        SubsystemId::AsyncTransaction,
        SubsystemId::ClassTransformer,
        "transformed code registers async work from the first transformation",
    ),
    constraint(
        Sequence::Construct,
        SubsystemId::Environment,
        SubsystemId::ClassTransformer,
        "transaction finish reads the environment from the first transformation",
    ),
    constraint(
        Sequence::Construct,
        SubsystemId::ClassTransformer,
        SubsystemId::Harvest,
        "harvest spawns tasks that would load instrumented types before the transformer is installed",
    ),
    constraint(
        Sequence::Construct,
        SubsystemId::Utilization,
        SubsystemId::RpmConnection,
        "host facts are collected as early as possible for the first connection",
    ),
    constraint(
        Sequence::Start,
        SubsystemId::Stats,
        SubsystemId::Harvest,
        "harvest reads the published stats engine",
    ),
    constraint(
        Sequence::Start,
        SubsystemId::Stats,
        SubsystemId::Gc,
        "samplers submit to the published stats engine",
    ),
    constraint(
        Sequence::Start,
        SubsystemId::Stats,
        SubsystemId::CpuSampler,
        "samplers submit to the published stats engine",
    ),
    constraint(
        Sequence::Start,
        SubsystemId::Stats,
        SubsystemId::Sampler,
        "samplers submit to the published stats engine",
    ),
    constraint(
        Sequence::Stop,
        SubsystemId::ClassTransformer,
        SubsystemId::Transaction,
        "no new code is instrumented while transaction state is torn down",
    ),
    constraint(
        Sequence::Stop,
        SubsystemId::Harvest,
        SubsystemId::Stats,
        "the last harvest cycle reads stats",
    ),
    constraint(
        Sequence::Stop,
        SubsystemId::Harvest,
        SubsystemId::RpmServiceManager,
        "the last harvest cycle may still need the connection",
    ),
    constraint(
        Sequence::Stop,
        SubsystemId::Sampler,
        SubsystemId::Stats,
        "samplers submit to stats until stopped",
    ),
    constraint(
        Sequence::Stop,
        SubsystemId::CpuSampler,
        SubsystemId::Stats,
        "samplers submit to stats until stopped",
    ),
];

/// Validates the built-in tables.
pub fn check_ordering() -> Result<(), ManagerError> {
    check_tables(
        CONSTRUCTION_ORDER,
        START_ORDER,
        START_AFTER_DYNAMIC,
        STOP_ORDER,
        ORDERING_CONSTRAINTS,
    )
}

/// Checks that
/// - every slot but configuration is built exactly once, and early starts
///   follow their build,
/// - every slot is started exactly once across construction, the static pass
///   and the post-dynamic pass (conditional early starts count),
/// - every slot is stopped exactly once,
/// - dependencies are built before their dependents,
/// - every constraint holds.
pub(crate) fn check_tables(
    construct: &[ConstructStep],
    start: &[SubsystemId],
    start_after_dynamic: &[SubsystemId],
    stop: &[SubsystemId],
    constraints: &[OrderingConstraint],
) -> Result<(), ManagerError> {
    let mut built: HashMap<SubsystemId, usize> = HashMap::new();
    let mut construct_pos: HashMap<SubsystemId, usize> = HashMap::new();
    let mut starts: HashMap<SubsystemId, usize> = HashMap::new();

    for (index, step) in construct.iter().enumerate() {
        let id = step.id();
        if step.is_early_start() {
            if !built.contains_key(&id) {
                return Err(coverage(Sequence::Construct, id, "starts a subsystem before building it"));
            }
            *starts.entry(id).or_default() += 1;
        } else {
            if built.insert(id, index).is_some() {
                return Err(coverage(Sequence::Construct, id, "builds a subsystem twice"));
            }
            for dependency in id.dependencies() {
                if !built.contains_key(dependency) {
                    return Err(ManagerError::OrderViolation {
                        sequence: Sequence::Construct,
                        before: *dependency,
                        after: id,
                        reason: "construction dependency",
                    });
                }
            }
        }
        construct_pos.insert(id, index);
    }

    for id in start.iter().chain(start_after_dynamic) {
        *starts.entry(*id).or_default() += 1;
    }

    let mut stops: HashMap<SubsystemId, usize> = HashMap::new();
    for id in stop {
        *stops.entry(*id).or_default() += 1;
    }

    for id in SubsystemId::ALL {
        let expected_builds = usize::from(id != SubsystemId::Config);
        if usize::from(built.contains_key(&id)) != expected_builds {
            return Err(coverage(Sequence::Construct, id, "is missing a subsystem"));
        }
        match starts.get(&id).copied().unwrap_or(0) {
            1 => {}
            0 => return Err(coverage(Sequence::Start, id, "is missing a subsystem")),
            _ => return Err(coverage(Sequence::Start, id, "starts a subsystem twice")),
        }
        match stops.get(&id).copied().unwrap_or(0) {
            1 => {}
            0 => return Err(coverage(Sequence::Stop, id, "is missing a subsystem")),
            _ => return Err(coverage(Sequence::Stop, id, "stops a subsystem twice")),
        }
    }

    let start_pos = positions(start);
    let stop_pos = positions(stop);
    for c in constraints {
        let table = match c.sequence {
            Sequence::Construct => &construct_pos,
            Sequence::Start => &start_pos,
            Sequence::Stop => &stop_pos,
        };
        let holds = matches!(
            (table.get(&c.before), table.get(&c.after)),
            (Some(before), Some(after)) if before < after
        );
        if !holds {
            return Err(ManagerError::OrderViolation {
                sequence: c.sequence,
                before: c.before,
                after: c.after,
                reason: c.reason,
            });
        }
    }
    Ok(())
}

fn positions(order: &[SubsystemId]) -> HashMap<SubsystemId, usize> {
    order
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, index))
        .collect()
}

fn coverage(sequence: Sequence, id: SubsystemId, problem: &'static str) -> ManagerError {
    ManagerError::OrderCoverage {
        sequence,
        id,
        problem,
    }
}
