use std::time::Duration;

use clap::Parser;

use crate::core::adapter::DEFAULT_ALLOCATION_ENV_VAR;

/// Configuration surface for the colocation memory agent: CLI arguments
/// with env-var fallbacks, so the daemon can be driven from a pod spec's
/// `env` block as easily as from a command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "colocation-memory-agent", version, about)]
pub struct Config {
    /// Resource name advertised to the orchestrator's device manager.
    #[arg(long, env = "COLOC_RESOURCE_NAME", default_value = "vendor/colocation-memory")]
    pub resource_name: String,

    /// NUMA node ids treated as "local" for capacity accounting and as
    /// migration sources.
    #[arg(long, env = "COLOC_NUMA_NODES", value_delimiter = ',', default_value = "0,1")]
    pub numa_nodes: Vec<u32>,

    /// NUMA node id treated as the fallback tier for evicted workloads.
    #[arg(long, env = "COLOC_FALLBACK_NODE", default_value_t = 2)]
    pub fallback_node: u32,

    /// Path to the cgroup `memory.current` file for the online workload
    /// class, whose usage is subtracted from total capacity.
    #[arg(
        long,
        env = "COLOC_ONLINE_CGROUP_PATH",
        default_value = "/sys/fs/cgroup/kubepods.slice/kubepods-burstable.slice/memory.current"
    )]
    pub online_cgroup_path: String,

    /// Fraction of total free memory withheld as a safety margin.
    #[arg(long, env = "COLOC_SAFETY_RATIO", default_value_t = 0.10)]
    pub safety_ratio: f64,

    /// Capacity controller tick interval.
    #[arg(long, env = "COLOC_REFRESH_INTERVAL_SECS", default_value_t = 10)]
    pub refresh_interval_secs: u64,

    /// Reclaim loop tick interval.
    #[arg(long, env = "COLOC_RECLAIM_INTERVAL_SECS", default_value_t = 13)]
    pub reclaim_interval_secs: u64,

    /// Anti-oscillation gate: minimum |delta| to act on.
    #[arg(long, env = "COLOC_DEBOUNCE_THRESHOLD", default_value_t = 1)]
    pub debounce_threshold: i64,

    /// Anti-oscillation gate: minimum time between applied adjustments.
    #[arg(long, env = "COLOC_MIN_ADJUSTMENT_INTERVAL_SECS", default_value_t = 60)]
    pub min_adjustment_interval_secs: u64,

    /// Disables the anti-oscillation gate entirely, for deterministic
    /// tests and scenario replay.
    #[arg(long, env = "COLOC_DEBOUNCE_DISABLED", default_value_t = false)]
    pub debounce_disabled: bool,

    /// Kubernetes-style namespace the watcher observes for workload
    /// add/delete events.
    #[arg(long, env = "COLOC_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Environment variable name through which the orchestrator's
    /// allocation decision is disclosed to the workload.
    #[arg(long, env = "COLOC_ALLOCATION_ENV_VAR", default_value = DEFAULT_ALLOCATION_ENV_VAR)]
    pub allocation_env_var: String,

    /// Container label used to match a running container back to its
    /// pod name during PID discovery.
    #[arg(long, env = "COLOC_POD_LABEL", default_value = "io.kubernetes.pod.name")]
    pub pod_label: String,

    /// Path to orchestrator client credentials (kubeconfig), if any.
    #[arg(long, env = "COLOC_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Deadline for a newly added workload to reach a live state.
    #[arg(long, env = "COLOC_LIVE_DEADLINE_SECS", default_value_t = 60)]
    pub live_deadline_secs: u64,

    /// Poll cadence while waiting for a workload to become live.
    #[arg(long, env = "COLOC_LIVE_POLL_INTERVAL_SECS", default_value_t = 2)]
    pub live_poll_interval_secs: u64,

    /// Poll cadence for the namespace-wide workload add/delete diff.
    #[arg(long, env = "COLOC_WATCH_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub watch_poll_interval_secs: u64,
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn min_adjustment_interval(&self) -> Duration {
        Duration::from_secs(self.min_adjustment_interval_secs)
    }

    pub fn live_deadline(&self) -> Duration {
        Duration::from_secs(self.live_deadline_secs)
    }

    pub fn live_poll_interval(&self) -> Duration {
        Duration::from_secs(self.live_poll_interval_secs)
    }

    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_secs(self.watch_poll_interval_secs)
    }
}
