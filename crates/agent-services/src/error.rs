// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::manager::ordering::{Sequence, SubsystemId};
use crate::manager::ManagerState;

/// Errors returned by a single service's lifecycle methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} has already been started")]
    AlreadyStarted(String),

    #[error("{0} has already been stopped")]
    AlreadyStopped(String),

    #[error("{name} failed to start: {reason}")]
    StartFailed { name: String, reason: String },

    #[error("{name} failed to stop: {reason}")]
    StopFailed { name: String, reason: String },

    #[error("{service} requires {dependency}, which has not been constructed")]
    MissingDependency {
        service: &'static str,
        dependency: &'static str,
    },
}

impl ServiceError {
    pub fn start_failed(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::StartFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn stop_failed(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::StopFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors returned by the service manager.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Lifecycle misuse, e.g. calling `start()` twice.
    #[error("cannot {action} service manager while {state:?}")]
    InvalidState {
        action: &'static str,
        state: ManagerState,
    },

    #[error("core service failed to start: {0}")]
    CoreStart(#[source] ServiceError),

    /// A static subsystem failed during construction or start. The original
    /// error is carried unchanged.
    #[error("{name} aborted startup: {source}")]
    SubsystemStart {
        name: String,
        #[source]
        source: ServiceError,
    },

    #[error("{sequence:?} order violation: {before:?} must come before {after:?} ({reason})")]
    OrderViolation {
        sequence: Sequence,
        before: SubsystemId,
        after: SubsystemId,
        reason: &'static str,
    },

    /// An ordering table lists a subsystem zero or several times, or starts
    /// one early before building it.
    #[error("{sequence:?} order {problem}: {id:?}")]
    OrderCoverage {
        sequence: Sequence,
        id: SubsystemId,
        problem: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-service failures collected by a best-effort sweep.
///
/// Stop and the dynamic start sweep never fail fast; every step is attempted
/// and failures end up here.
#[derive(Debug, Default)]
pub struct FailureReport {
    failures: Vec<(String, ServiceError)>,
}

impl FailureReport {
    pub(crate) fn record(&mut self, name: impl Into<String>, error: ServiceError) {
        self.failures.push((name.into(), error));
    }

    pub(crate) fn extend(&mut self, other: FailureReport) {
        self.failures.extend(other.failures);
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn failures(&self) -> &[(String, ServiceError)] {
        &self.failures
    }
}
