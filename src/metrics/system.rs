//! Host CPU and memory sampling.
//!
//! CPU prefers the 1-minute load average normalised by logical core count.
//! Where the OS reports no load average (Windows), it falls back to the
//! process's own CPU time delta between two successive samples.

use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// `system.*` domain: one best-effort instantaneous reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub total_memory: u64,
    pub used_memory: u64,
}

pub struct SystemSampler {
    state: Mutex<SamplerState>,
}

struct SamplerState {
    system: System,
    pid: Option<Pid>,
    cpu: CpuDeltaTracker,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SamplerState {
                system: System::new(),
                pid: sysinfo::get_current_pid().ok(),
                cpu: CpuDeltaTracker::default(),
            }),
        }
    }

    /// Take a reading. Never fails; unmeasurable values read as zero.
    pub fn sample(&self) -> SystemMetrics {
        let mut state = self.state.lock();
        state.system.refresh_memory();

        let total_memory = state.system.total_memory();
        let free_memory = state.system.free_memory();
        let used_memory = total_memory.saturating_sub(free_memory);

        let load = System::load_average().one;
        let cpu_usage = match cpu_from_load_average(load, num_cpus::get()) {
            Some(cpu) => cpu,
            None => state.process_cpu_usage(),
        };

        SystemMetrics {
            cpu_usage: round2(cpu_usage),
            memory_usage: round2(memory_percent(total_memory, free_memory)),
            total_memory,
            used_memory,
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerState {
    fn process_cpu_usage(&mut self) -> f64 {
        let Some(pid) = self.pid else {
            self.cpu.reset();
            return 0.0;
        };
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_cpu(),
        );
        match self.system.process(pid) {
            Some(process) => self
                .cpu
                .observe(process.accumulated_cpu_time(), Instant::now()),
            None => {
                tracing::debug!(%pid, "current process not visible to sampler");
                self.cpu.reset();
                0.0
            }
        }
    }
}

/// Tracks cumulative process CPU time between calls.
#[derive(Debug, Default)]
pub(crate) struct CpuDeltaTracker {
    prior: Option<(u64, Instant)>,
}

impl CpuDeltaTracker {
    /// Feed cumulative CPU milliseconds observed at `now`. Returns the
    /// busy percentage since the previous call, or 0 with no prior reading.
    pub(crate) fn observe(&mut self, cpu_ms: u64, now: Instant) -> f64 {
        let usage = match self.prior {
            Some((prev_cpu, prev_at)) => {
                let wall_ms = now.saturating_duration_since(prev_at).as_secs_f64() * 1000.0;
                if wall_ms > 0.0 {
                    let busy_ms = cpu_ms.saturating_sub(prev_cpu) as f64;
                    (busy_ms / wall_ms * 100.0).clamp(0.0, 100.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.prior = Some((cpu_ms, now));
        usage
    }

    pub(crate) fn reset(&mut self) {
        self.prior = None;
    }
}

/// `load / cores × 100` when the OS reports a positive load average.
pub(crate) fn cpu_from_load_average(load_one: f64, cores: usize) -> Option<f64> {
    if load_one.is_finite() && load_one > 0.0 && cores > 0 {
        Some(load_one / cores as f64 * 100.0)
    } else {
        None
    }
}

pub(crate) fn memory_percent(total: u64, free: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(free) as f64 / total as f64 * 100.0
}

pub(crate) fn round2(v: f64) -> f64 {
    if v.is_finite() {
        (v * 100.0).round() / 100.0
    } else {
        0.0
    }
}
