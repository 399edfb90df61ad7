use crate::core::block::BLOCK_SIZE_BYTES;
use crate::core::error::ProbeError;

/// Raw bytes read from the host: total free memory summed across the
/// observed NUMA nodes, and bytes currently consumed by the online
/// workload class. Produced by [`crate::core::probe::Probe`] (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReadings {
    pub total_free_bytes: u64,
    pub online_used_bytes: u64,
}

/// Derived capacity snapshot (C2's output). Ephemeral — recomputed every
/// control tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub total_free_bytes: u64,
    pub online_used_bytes: u64,
    pub safety_margin_bytes: u64,
    pub colocation_capacity_bytes: u64,
    pub target_blocks: u64,
}

/// Pure function: converts raw readings into a capacity snapshot. No side
/// effects, no I/O — this is C2 in its entirety.
pub fn calculate(readings: RawReadings, safety_ratio: f64) -> CapacitySnapshot {
    let safety_margin_bytes = (readings.total_free_bytes as f64 * safety_ratio) as u64;
    let colocation_capacity_bytes = readings
        .total_free_bytes
        .saturating_sub(readings.online_used_bytes)
        .saturating_sub(safety_margin_bytes);
    let target_blocks = colocation_capacity_bytes / BLOCK_SIZE_BYTES;

    CapacitySnapshot {
        total_free_bytes: readings.total_free_bytes,
        online_used_bytes: readings.online_used_bytes,
        safety_margin_bytes,
        colocation_capacity_bytes,
        target_blocks,
    }
}

/// C1: reads host and online-workload memory usage and returns a single
/// snapshot. A failed probe must be treated by the caller as "no decision
/// this tick," never as zero capacity.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn snapshot(&self) -> Result<RawReadings, ProbeError>;
}
