// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic process samplers.
//!
//! Real samplers only exist when a live instrumentation attachment is present.
//! Otherwise their slots hold a [`NoopSamplerService`], which is enabled but
//! never samples.
//!
//! Readings come from `/proc/self` on Linux. On other platforms, or when a
//! file cannot be read, a cycle submits nothing but still counts as taken.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SubsystemContext;
use crate::config::ConfigProvider;
use crate::error::ServiceError;
use crate::service::{Lifecycle, Service, ServiceState};
use crate::stats::{StatsSlot, StatsWork};
use crate::util::lock;

pub const SAMPLER_SERVICE: &str = "SamplerService";
pub const CPU_SAMPLER_SERVICE: &str = "CPUSamplerService";
pub const GC_SERVICE: &str = "GCService";

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
const PROC_STATUS_PATH: &str = "/proc/self/status";
const PROC_STAT_PATH: &str = "/proc/self/stat";
// USER_HZ is 100 on every mainstream Linux target.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

pub trait SamplerService: Service {
    /// Completed sampling cycles.
    fn samples_taken(&self) -> u64;
}

/// One reading per cycle. Probes own whatever state they need between
/// cycles, such as the previous counter value for deltas.
trait Probe: Send + 'static {
    fn sample(&mut self) -> Vec<StatsWork>;
}

pub struct PeriodicSampler {
    name: &'static str,
    interval: Duration,
    stats: Arc<StatsSlot>,
    probe: Mutex<Option<Box<dyn Probe>>>,
    samples: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    lifecycle: Lifecycle,
}

impl PeriodicSampler {
    /// Resident memory and thread count.
    #[must_use]
    pub fn memory(ctx: &SubsystemContext) -> Self {
        Self::new(SAMPLER_SERVICE, ctx, Box::new(MemoryProbe))
    }

    /// Process CPU time and utilization across all cores.
    #[must_use]
    pub fn cpu(ctx: &SubsystemContext) -> Self {
        Self::new(CPU_SAMPLER_SERVICE, ctx, Box::new(CpuProbe::default()))
    }

    /// Page fault activity, the closest process-level signal to collector
    /// pressure.
    #[must_use]
    pub fn gc(ctx: &SubsystemContext) -> Self {
        Self::new(GC_SERVICE, ctx, Box::new(FaultProbe::default()))
    }

    fn new(name: &'static str, ctx: &SubsystemContext, probe: Box<dyn Probe>) -> Self {
        Self {
            name,
            interval: ctx
                .config
                .get_duration_ms("sampler.interval_ms", DEFAULT_SAMPLE_INTERVAL),
            stats: Arc::clone(&ctx.stats),
            probe: Mutex::new(Some(probe)),
            samples: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            lifecycle: Lifecycle::new(),
        }
    }
}

impl SamplerService for PeriodicSampler {
    fn samples_taken(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Service for PeriodicSampler {
    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_start(self.name)?;
        let Some(mut probe) = lock(&self.probe).take() else {
            return Err(ServiceError::start_failed(self.name, "probe already taken"));
        };

        let stats = Arc::clone(&self.stats);
        let samples = Arc::clone(&self.samples);
        let cancel = self.cancel.clone();
        let period = self.interval;
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = stats.current();
                        for work in probe.sample() {
                            current.do_stats_work(work);
                        }
                        samples.fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
            debug!("{name} sampling loop exited");
        });
        *lock(&self.task) = Some(handle);
        debug!(interval_ms = period.as_millis(), "{name} started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if !self.lifecycle.begin_stop(self.name)? {
            return Ok(());
        }
        self.cancel.cancel();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("{} task ended abnormally: {e}", self.name);
                return Err(ServiceError::stop_failed(self.name, e));
            }
        }
        Ok(())
    }
}

/// Stand-in for a sampler when the process is not instrumented.
#[derive(Debug)]
pub struct NoopSamplerService {
    name: &'static str,
    lifecycle: Lifecycle,
}

impl NoopSamplerService {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lifecycle: Lifecycle::new(),
        }
    }
}

impl SamplerService for NoopSamplerService {
    fn samples_taken(&self) -> u64 {
        0
    }
}

#[async_trait]
impl Service for NoopSamplerService {
    fn name(&self) -> &str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_start(self.name)
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.lifecycle.begin_stop(self.name).map(|_| ())
    }
}

struct MemoryProbe;

impl Probe for MemoryProbe {
    fn sample(&mut self) -> Vec<StatsWork> {
        let Ok(contents) = fs::read_to_string(PROC_STATUS_PATH) else {
            debug!("Could not read {PROC_STATUS_PATH}");
            return Vec::new();
        };
        let status = parse_status(&contents);
        let mut work = Vec::with_capacity(2);
        if let Some(rss_kb) = status.rss_kb {
            work.push(StatsWork::record_value(
                "Memory/Physical",
                rss_kb as f64 / 1024.0,
            ));
        }
        if let Some(threads) = status.threads {
            work.push(StatsWork::record_value("Threads/all", threads as f64));
        }
        work
    }
}

#[derive(Default)]
struct CpuProbe {
    last: Option<(u64, Instant)>,
}

impl Probe for CpuProbe {
    fn sample(&mut self) -> Vec<StatsWork> {
        let Some(stat) = read_stat() else {
            return Vec::new();
        };
        let ticks = stat.utime + stat.stime;
        let now = Instant::now();
        let Some((last_ticks, last_at)) = self.last.replace((ticks, now)) else {
            return Vec::new();
        };

        let elapsed = now.duration_since(last_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Vec::new();
        }
        let cpu_secs = ticks.saturating_sub(last_ticks) as f64 / CLOCK_TICKS_PER_SEC;
        let utilization = cpu_secs / elapsed / num_cpus::get() as f64;
        vec![
            StatsWork::record_value("CPU/User Time", cpu_secs),
            StatsWork::record_value("CPU/User/Utilization", utilization),
        ]
    }
}

#[derive(Default)]
struct FaultProbe {
    last: Option<(u64, u64)>,
}

impl Probe for FaultProbe {
    fn sample(&mut self) -> Vec<StatsWork> {
        let Some(stat) = read_stat() else {
            return Vec::new();
        };
        let Some((minor, major)) = self.last.replace((stat.minflt, stat.majflt)) else {
            return Vec::new();
        };
        vec![
            StatsWork::record_value(
                "GC/Minor Faults",
                stat.minflt.saturating_sub(minor) as f64,
            ),
            StatsWork::record_value(
                "GC/Major Faults",
                stat.majflt.saturating_sub(major) as f64,
            ),
        ]
    }
}

#[derive(Debug, Default, PartialEq)]
struct ProcStatus {
    rss_kb: Option<u64>,
    threads: Option<u64>,
}

fn parse_status(contents: &str) -> ProcStatus {
    let mut status = ProcStatus::default();
    for line in contents.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let number = value
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match key {
            "VmRSS" => status.rss_kb = number,
            "Threads" => status.threads = number,
            _ => {}
        }
    }
    status
}

#[derive(Debug, PartialEq)]
struct ProcStat {
    minflt: u64,
    majflt: u64,
    utime: u64,
    stime: u64,
}

fn read_stat() -> Option<ProcStat> {
    let contents = fs::read_to_string(PROC_STAT_PATH).ok();
    let stat = contents.as_deref().and_then(parse_stat);
    if stat.is_none() {
        debug!("Could not read process counters from {PROC_STAT_PATH}");
    }
    stat
}

/// Parses `/proc/<pid>/stat`. The command field may contain spaces and
/// parentheses, so fields are counted from the last `)`.
fn parse_stat(contents: &str) -> Option<ProcStat> {
    let (_, rest) = contents.rsplit_once(')')?;
    // `rest` starts at field 3 (state).
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let field = |n: usize| -> Option<u64> { fields.get(n - 3)?.parse().ok() };
    Some(ProcStat {
        minflt: field(10)?,
        majflt: field(12)?,
        utime: field(14)?,
        stime: field(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::stats::StatsEngineService;

    const STAT_LINE: &str = "4242 (my (odd) proc) S 1 4242 4242 0 -1 4194560 1500 0 7 0 220 35 0 0 20 0 9 0 1234 1000000 2000 18446744073709551615";

    fn context() -> SubsystemContext {
        let stats = Arc::new(StatsSlot::new());
        stats.publish(Arc::new(StatsEngineService::new()));
        SubsystemContext {
            config: Arc::new(AgentConfig::default().with_setting("sampler.interval_ms", "10")),
            stats,
            instrumentation: None,
        }
    }

    #[test]
    fn test_parse_stat_with_parenthesised_command() {
        let stat = parse_stat(STAT_LINE).unwrap();
        assert_eq!(
            stat,
            ProcStat {
                minflt: 1500,
                majflt: 7,
                utime: 220,
                stime: 35,
            }
        );
    }

    #[test]
    fn test_parse_stat_truncated() {
        assert!(parse_stat("12 (short) S 1 2").is_none());
        assert!(parse_stat("no command field").is_none());
    }

    #[test]
    fn test_parse_status() {
        let status = parse_status("Name:\tagent\nVmRSS:\t  20480 kB\nThreads:\t12\nBogus\n");
        assert_eq!(
            status,
            ProcStatus {
                rss_kb: Some(20480),
                threads: Some(12),
            }
        );
    }

    #[tokio::test]
    async fn test_sampler_runs_until_stopped() {
        let ctx = context();
        let sampler = PeriodicSampler::memory(&ctx);
        assert_eq!(sampler.name(), SAMPLER_SERVICE);

        sampler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        sampler.stop().await.unwrap();

        let taken = sampler.samples_taken();
        assert!(taken >= 1, "expected at least one sample, got {taken}");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sampler.samples_taken(), taken);
    }

    #[tokio::test]
    async fn test_delta_probes_need_a_baseline() {
        let ctx = context();
        let cpu = PeriodicSampler::cpu(&ctx);
        let gc = PeriodicSampler::gc(&ctx);
        cpu.start().await.unwrap();
        gc.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        cpu.stop().await.unwrap();
        gc.stop().await.unwrap();

        assert!(cpu.samples_taken() >= 2);
        if cfg!(target_os = "linux") {
            let snapshot = ctx.stats.current().harvest();
            assert!(snapshot.get("CPU/User/Utilization").is_some());
            assert!(snapshot.get("GC/Minor Faults").is_some());
        }
    }

    #[tokio::test]
    async fn test_noop_sampler() {
        let noop = NoopSamplerService::new(CPU_SAMPLER_SERVICE);
        assert!(noop.is_enabled());
        noop.start().await.unwrap();
        assert_eq!(noop.samples_taken(), 0);
        noop.stop().await.unwrap();
        assert_eq!(noop.state(), ServiceState::Stopped);
    }
}
