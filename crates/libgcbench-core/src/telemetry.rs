//! Collector telemetry: point-in-time snapshots and the CPU-fraction sampler

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// CPU time counters in a unit shared by both fields (clock ticks on Linux)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuTime {
    /// Time spent by the collector
    pub collector: u64,
    /// Time spent by the whole machine
    pub total: u64,
}

/// Read-only view of the host's memory collector
pub trait CollectorTelemetry: Send + Sync {
    /// Completed collection cycles since boot
    fn cycle_count(&self) -> Result<u64>;

    /// Cumulative collection pause time in nanoseconds
    fn cycle_time_ns(&self) -> Result<u64>;

    /// Current heap footprint in bytes
    fn heap_bytes(&self) -> Result<u64>;

    /// Cumulative CPU time, used to bracket a window with `CpuFractionSampler`
    fn cpu_time(&self) -> Result<CpuTime>;

    fn snapshot(&self) -> Result<TelemetrySnapshot> {
        Ok(TelemetrySnapshot {
            cycles: self.cycle_count()?,
            cycle_time_ns: self.cycle_time_ns()?,
        })
    }
}

/// Cycle counters at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub cycles: u64,
    pub cycle_time_ns: u64,
}

impl TelemetrySnapshot {
    /// Counters accumulated between `before` and `self`.
    ///
    /// Saturates at zero so a counter that did not move (or was reset by the
    /// host) never underflows.
    pub fn since(&self, before: &TelemetrySnapshot) -> TelemetryDelta {
        TelemetryDelta {
            cycles: self.cycles.saturating_sub(before.cycles),
            cycle_time_ns: self.cycle_time_ns.saturating_sub(before.cycle_time_ns),
        }
    }
}

/// Difference between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TelemetryDelta {
    pub cycles: u64,
    pub cycle_time_ns: u64,
}

impl TelemetryDelta {
    pub fn cycle_time_ms(&self) -> u64 {
        self.cycle_time_ns / 1_000_000
    }
}

/// Measures the share of CPU time the collector used over a window
#[derive(Debug, Clone, Copy)]
pub struct CpuFractionSampler {
    start: CpuTime,
}

impl CpuFractionSampler {
    pub fn start(telemetry: &dyn CollectorTelemetry) -> Result<Self> {
        Ok(Self {
            start: telemetry.cpu_time()?,
        })
    }

    /// Percentage of CPU time spent collecting since `start`
    pub fn finish(self, telemetry: &dyn CollectorTelemetry) -> Result<f64> {
        let end = telemetry.cpu_time()?;
        Ok(cpu_fraction_percent(self.start, end))
    }
}

fn cpu_fraction_percent(start: CpuTime, end: CpuTime) -> f64 {
    let total = end.total.saturating_sub(start.total);
    if total == 0 {
        return 0.0;
    }
    let collector = end.collector.saturating_sub(start.collector);
    (collector as f64 / total as f64) * 100.0
}


#[cfg(test)]
mod tests {
    use super::fake::FakeTelemetry;
    use super::*;

    #[test]
    fn test_delta_of_idle_counters_is_zero() {
        let telemetry = FakeTelemetry::default();
        telemetry.advance(7, 1_500_000, 0, 0);
        let before = telemetry.snapshot().unwrap();
        let after = telemetry.snapshot().unwrap();
        assert_eq!(after.since(&before), TelemetryDelta::default());
    }

    #[test]
    fn test_delta_never_underflows() {
        let before = TelemetrySnapshot {
            cycles: 10,
            cycle_time_ns: 5_000,
        };
        let after = TelemetrySnapshot {
            cycles: 3,
            cycle_time_ns: 1_000,
        };
        assert_eq!(after.since(&before), TelemetryDelta::default());
    }

    #[test]
    fn test_delta_matches_after_minus_before() {
        let telemetry = FakeTelemetry::default();
        telemetry.advance(2, 100, 0, 0);
        let before = telemetry.snapshot().unwrap();
        telemetry.advance(5, 42_000_000, 0, 0);
        let delta = telemetry.snapshot().unwrap().since(&before);
        assert_eq!(delta.cycles, 5);
        assert_eq!(delta.cycle_time_ns, 42_000_000);
        assert_eq!(delta.cycle_time_ms(), 42);
    }

    #[test]
    fn test_cpu_fraction_covers_window_only() {
        let telemetry = FakeTelemetry::default();
        telemetry.advance(0, 0, 500, 1_000);
        let sampler = CpuFractionSampler::start(&telemetry).unwrap();
        telemetry.advance(0, 0, 25, 1_000);
        let pct = sampler.finish(&telemetry).unwrap();
        assert!((pct - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_fraction_empty_window() {
        let telemetry = FakeTelemetry::default();
        let sampler = CpuFractionSampler::start(&telemetry).unwrap();
        assert_eq!(sampler.finish(&telemetry).unwrap(), 0.0);
    }
}
