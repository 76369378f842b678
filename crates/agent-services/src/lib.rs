// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Agent Services
//!
//! Lifecycle orchestration for the subsystems of a monitoring agent.
//!
//! ## Overview
//!
//! - [`service`]: the lifecycle contract every subsystem implements
//! - [`registry`]: name-keyed registry for services added at runtime
//! - [`stats`]: the stats subsystem, its bootstrap buffer and the published
//!   reference callers go through
//! - [`manager`]: the [`ServiceManager`], its ordering tables and the static
//!   service set
//! - [`subsystems`]: the built-in subsystems
//! - [`core_service`]: the instrumentation attachment started before anything else
//! - [`config`]: configuration provider and `AGENT_*` environment loading
//! - [`logger`]: log line formatter
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agent_services::{AgentConfig, AttachedCore, ServiceManager};
//!
//! let manager = ServiceManager::new(Arc::new(AttachedCore::instrumented()), AgentConfig::from_env()?)?;
//! manager.start().await?;
//! // ...
//! let report = manager.stop().await?;
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core_service;
pub mod error;
pub mod logger;
pub mod manager;
pub mod registry;
pub mod service;
pub mod stats;
pub mod subsystems;
mod util;

pub use config::{AgentConfig, ConfigProvider};
pub use core_service::{AttachedCore, CoreService, Instrumentation};
pub use error::{FailureReport, ManagerError, ServiceError};
pub use manager::{ManagerState, ServiceManager, ServiceSummary};
pub use registry::ServiceRegistry;
pub use service::{Service, ServiceState};
pub use stats::{StatsService, StatsWork};
