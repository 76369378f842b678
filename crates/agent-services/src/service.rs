// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The lifecycle contract shared by every subsystem.
//!
//! A service moves through `Created -> Started -> Stopped` and never back.
//! `start()` runs at most once; `stop()` runs at most once and is tolerated
//! on a service that never started (it simply becomes `Stopped`).

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use crate::error::ServiceError;

/// Lifecycle state of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Started,
    Stopped,
}

impl ServiceState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ServiceState::Created,
            1 => ServiceState::Started,
            _ => ServiceState::Stopped,
        }
    }
}

/// Uniform lifecycle capability implemented by every subsystem.
///
/// Implementations take `&self` so they can be shared as `Arc<dyn Service>`
/// between the manager and the rest of the runtime; mutable state lives
/// behind interior mutability.
#[async_trait]
pub trait Service: Send + Sync {
    /// Stable identity used for registry lookups and diagnostics.
    fn name(&self) -> &str;

    /// Pure query, callable at any point in the lifecycle.
    fn is_enabled(&self) -> bool;

    fn state(&self) -> ServiceState;

    async fn start(&self) -> Result<(), ServiceError>;

    /// Releases whatever `start()` acquired. Must tolerate a partial or
    /// missing start.
    async fn stop(&self) -> Result<(), ServiceError>;
}

/// Atomic state holder enforcing the at-most-once transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves `Created -> Started`.
    pub fn begin_start(&self, name: &str) -> Result<(), ServiceError> {
        match self
            .state
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(1) => Err(ServiceError::AlreadyStarted(name.to_string())),
            Err(_) => Err(ServiceError::AlreadyStopped(name.to_string())),
        }
    }

    /// Moves to `Stopped`. Returns whether the service had been started, so
    /// callers know whether there is anything to release.
    pub fn begin_stop(&self, name: &str) -> Result<bool, ServiceError> {
        match self.state.swap(2, Ordering::AcqRel) {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ServiceError::AlreadyStopped(name.to_string())),
        }
    }
}
