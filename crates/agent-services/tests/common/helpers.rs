// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::sync::{Arc, Mutex};

use agent_services::{AgentConfig, CoreService, ServiceManager};

/// Ordered record of lifecycle calls, shared between fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Position of `entry` in the journal; panics when absent.
pub fn position(journal: &Journal, entry: &str) -> usize {
    entries(journal)
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} not in journal: {:?}", entries(journal)))
}

/// Test configuration with background loops slowed down so they never fire
/// during a test.
pub fn quiet_config() -> AgentConfig {
    AgentConfig::default()
        .with_setting("harvest.interval_ms", "3600000")
        .with_setting("sampler.interval_ms", "3600000")
}

pub fn manager_with(core: Arc<dyn CoreService>) -> ServiceManager {
    ServiceManager::new(core, quiet_config()).unwrap()
}
