//! A node-local device-plugin daemon that advertises surplus host memory
//! as fixed-size, schedulable blocks and keeps the advertised count in
//! step with actual host capacity — growing it as memory frees up,
//! shrinking it (migrating workloads to a fallback NUMA tier when free
//! blocks alone can't cover the loss) as it doesn't.

pub mod config;

pub mod core {
    pub mod adapter;
    pub mod block;
    pub mod block_registry;
    pub mod container_runtime;
    pub mod controller;
    pub mod controller_state;
    pub mod error;
    pub mod migration;
    pub mod orchestrator;
    pub mod probe;
    pub mod reclaim;
    pub mod registries;
    pub mod snapshot;
    pub mod watcher;
    pub mod workload;
    pub mod workload_registry;
}

pub use config::Config;
pub use core::controller::{CapacityController, ControllerTuning, TickOutcome};
pub use core::error::{AgentError, Result};
pub use core::reclaim::{ReclaimLoop, ReclaimTuning};
pub use core::watcher::{WatcherTuning, WorkloadWatcher};
