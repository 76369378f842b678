// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-step startup timings, kept to spot slow subsystem startups.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTiming {
    pub step: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StartupTimings {
    steps: Vec<StepTiming>,
    total: Option<Duration>,
}

impl StartupTimings {
    pub(crate) fn record(&mut self, step: impl Into<String>, elapsed: Duration) {
        self.steps.push(StepTiming {
            step: step.into(),
            elapsed,
        });
    }

    /// Times `f` and records it under `step`.
    pub(crate) async fn time<F, T>(&mut self, step: impl Into<String>, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let started = Instant::now();
        let result = f.await;
        self.record(step, started.elapsed());
        result
    }

    pub(crate) fn finish(&mut self, total: Duration) {
        self.total = Some(total);
    }

    #[must_use]
    pub fn steps(&self) -> &[StepTiming] {
        &self.steps
    }

    /// Set once startup completed.
    #[must_use]
    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    #[must_use]
    pub fn slowest(&self) -> Option<&StepTiming> {
        self.steps.iter().max_by_key(|s| s.elapsed)
    }

    pub fn log(&self) {
        for timing in &self.steps {
            debug!(
                "Service timing: {} took {}ms",
                timing.step,
                timing.elapsed.as_millis()
            );
        }
        if let Some(total) = self.total {
            match self.slowest() {
                Some(slowest) => info!(
                    "Services started in {}ms (slowest: {} at {}ms)",
                    total.as_millis(),
                    slowest.step,
                    slowest.elapsed.as_millis()
                ),
                None => info!("Services started in {}ms", total.as_millis()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_records_step() {
        let mut timings = StartupTimings::default();
        let value = timings
            .time("slow", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                7
            })
            .await;
        timings.record("fast", Duration::from_millis(1));

        assert_eq!(value, 7);
        assert_eq!(timings.steps().len(), 2);
        assert_eq!(timings.slowest().map(|s| s.step.as_str()), Some("slow"));
        assert!(timings.total().is_none());

        timings.finish(Duration::from_millis(25));
        assert_eq!(timings.total(), Some(Duration::from_millis(25)));
    }
}
