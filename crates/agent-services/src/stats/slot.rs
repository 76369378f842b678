// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, RwLock};

use tracing::{error, info};

use super::{BootstrapStatsService, StatsEngineService, StatsService};

/// The published stats reference.
///
/// Holds the bootstrap placeholder until [`StatsSlot::publish`] swaps in the
/// real engine. The swap happens once; the replay runs under the write lock,
/// so no reader can see the real engine before the queued work reached it.
pub struct StatsSlot {
    bootstrap: Arc<BootstrapStatsService>,
    current: RwLock<Arc<dyn StatsService>>,
}

impl Default for StatsSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSlot {
    #[must_use]
    pub fn new() -> Self {
        let bootstrap = Arc::new(BootstrapStatsService::new());
        let current: Arc<dyn StatsService> = bootstrap.clone();
        Self {
            bootstrap,
            current: RwLock::new(current),
        }
    }

    /// The live stats service: the bootstrap placeholder before startup, the
    /// real engine afterwards.
    #[must_use]
    pub fn current(&self) -> Arc<dyn StatsService> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.bootstrap.is_drained()
    }

    /// Replays the bootstrap queue into `real` and makes it the current
    /// service. Returns the number of replayed items.
    pub fn publish(&self, real: Arc<StatsEngineService>) -> usize {
        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.bootstrap.is_drained() {
            error!("Stats service already published; keeping the existing engine");
            return 0;
        }
        let replayed = self.bootstrap.drain_into(real.as_ref());
        *current = real as Arc<dyn StatsService>;
        info!("Stats service published, replayed {replayed} startup work items");
        replayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsWork;

    #[test]
    fn test_publish_swaps_once() {
        let slot = StatsSlot::new();
        slot.current().do_stats_work(StatsWork::increment("early"));
        assert!(!slot.is_published());
        assert_eq!(slot.current().name(), BootstrapStatsService::NAME);

        let real = Arc::new(StatsEngineService::new());
        assert_eq!(slot.publish(Arc::clone(&real)), 1);
        assert!(slot.is_published());
        assert_eq!(slot.current().name(), StatsEngineService::NAME);

        let other = Arc::new(StatsEngineService::new());
        assert_eq!(slot.publish(other), 0);

        slot.current().do_stats_work(StatsWork::increment("later"));
        assert_eq!(real.harvest().names(), vec!["early", "later"]);
    }

    #[test]
    fn test_concurrent_readers_see_a_service() {
        let slot = Arc::new(StatsSlot::new());
        let readers: Vec<_> = (0..4)
            .map(|i| {
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        slot.current()
                            .do_stats_work(StatsWork::increment(format!("reader-{i}")));
                    }
                })
            })
            .collect();
        for reader in readers {
            reader.join().unwrap();
        }

        let real = Arc::new(StatsEngineService::new());
        slot.publish(Arc::clone(&real));
        let snapshot = real.harvest();
        let total: u64 = snapshot.metrics.iter().map(|m| m.call_count).sum();
        assert_eq!(total, 400);
    }
}
