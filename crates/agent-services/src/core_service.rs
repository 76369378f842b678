// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The instrumentation attachment the manager depends on.
//!
//! The core service is started before anything else and stopped last. Its
//! [`CoreService::instrumentation`] answer decides whether subsystems that
//! need a live attachment get their real or their no-op implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::util::lock;

/// A live class-transformation capability.
pub trait Instrumentation: Send + Sync {
    fn add_transformer(&self, transformer: &str);

    fn remove_transformer(&self, transformer: &str) -> bool;

    fn transformers(&self) -> Vec<String>;
}

pub trait CoreService: Service {
    /// `None` when the process is not truly instrumented (dry run, disabled
    /// deployment).
    fn instrumentation(&self) -> Option<Arc<dyn Instrumentation>>;
}

/// In-process transformer table.
#[derive(Debug, Default)]
pub struct TransformerTable {
    transformers: Mutex<Vec<String>>,
}

impl TransformerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Instrumentation for TransformerTable {
    fn add_transformer(&self, transformer: &str) {
        lock(&self.transformers).push(transformer.to_string());
    }

    fn remove_transformer(&self, transformer: &str) -> bool {
        let mut transformers = lock(&self.transformers);
        let before = transformers.len();
        transformers.retain(|t| t != transformer);
        transformers.len() != before
    }

    fn transformers(&self) -> Vec<String> {
        lock(&self.transformers).clone()
    }
}

/// Core service backed by an optional attachment.
pub struct AttachedCore {
    instrumentation: Option<Arc<dyn Instrumentation>>,
    lifecycle: Lifecycle,
}

impl AttachedCore {
    pub const NAME: &'static str = "CoreService";

    #[must_use]
    pub fn new(instrumentation: Option<Arc<dyn Instrumentation>>) -> Self {
        Self {
            instrumentation,
            lifecycle: Lifecycle::new(),
        }
    }

    /// A core with a fresh [`TransformerTable`] attached.
    #[must_use]
    pub fn instrumented() -> Self {
        Self::new(Some(Arc::new(TransformerTable::new())))
    }

    /// A core with no attachment; subsystems fall back to no-op variants.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Service for AttachedCore {
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
        debug!(
            instrumented = self.instrumentation.is_some(),
            "Core service started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_stop(Self::NAME).map(|_| ())
    }
}

impl CoreService for AttachedCore {
    fn instrumentation(&self) -> Option<Arc<dyn Instrumentation>> {
        self.instrumentation.clone()
    }
}
