// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Built-in subsystems held by the static service set.
//!
//! How each subsystem computes its own data is outside this crate's concern;
//! what lives here is the part the manager relies on: names, enabled flags,
//! lifecycle, the listener hooks other subsystems register into, and the
//! real/no-op split for subsystems that need a live attachment.

pub mod basic;
pub mod connection;
pub mod harvest;
pub mod sampling;
pub mod transform;
pub mod utilization;

use std::sync::Arc;

use crate::config::ConfigProvider;
use crate::core_service::Instrumentation;
use crate::stats::StatsSlot;

/// What a subsystem may consult while it is being constructed.
#[derive(Clone)]
pub struct SubsystemContext {
    pub config: Arc<dyn ConfigProvider>,
    pub stats: Arc<StatsSlot>,
    pub instrumentation: Option<Arc<dyn Instrumentation>>,
}

impl SubsystemContext {
    /// Whether a live class-transformation capability is attached.
    #[must_use]
    pub fn is_real_agent(&self) -> bool {
        self.instrumentation.is_some()
    }
}

/// Declares a subsystem with no behavior beyond the lifecycle contract.
///
/// With `enabled_by`, the enabled flag is read from that configuration key
/// (default `true`) when the subsystem is built.
macro_rules! simple_service {
    ($(#[$meta:meta])* $ty:ident, $name:literal) => {
        simple_service!(@define $(#[$meta])* $ty, $name, |_config| true);
    };
    ($(#[$meta:meta])* $ty:ident, $name:literal, enabled_by = $key:literal) => {
        simple_service!(@define $(#[$meta])* $ty, $name, |config: &dyn $crate::config::ConfigProvider| {
            config.get_bool($key, true)
        });
    };
    (@define $(#[$meta:meta])* $ty:ident, $name:literal, $enabled:expr) => {
        $(#[$meta])*
        pub struct $ty {
            enabled: bool,
            lifecycle: $crate::service::Lifecycle,
        }

        impl $ty {
            pub const NAME: &'static str = $name;

            #[must_use]
            pub fn new(config: &dyn $crate::config::ConfigProvider) -> Self {
                let enabled_for: fn(&dyn $crate::config::ConfigProvider) -> bool = $enabled;
                Self {
                    enabled: enabled_for(config),
                    lifecycle: $crate::service::Lifecycle::new(),
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::service::Service for $ty {
            fn name(&self) -> &str {
                Self::NAME
            }

            fn is_enabled(&self) -> bool {
                self.enabled
            }

            fn state(&self) -> $crate::service::ServiceState {
                self.lifecycle.state()
            }

            async fn start(&self) -> Result<(), $crate::error::ServiceError> {
                self.lifecycle.begin_start(Self::NAME)?;
                if !self.enabled {
                    tracing::debug!("{} is disabled", Self::NAME);
                }
                Ok(())
            }

            async fn stop(&self) -> Result<(), $crate::error::ServiceError> {
                self.lifecycle.begin_stop(Self::NAME).map(|_| ())
            }
        }
    };
}

pub(crate) use simple_service;
