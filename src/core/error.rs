use std::time::Duration;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error type, composed from the per-subsystem kinds in this
/// module the same way a layered error enum is built up elsewhere: each
/// variant wraps one subsystem's error and carries no logic of its own.
/// This is the error `main` propagates out of startup.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Runtime(#[from] RuntimeInspectError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// C1 host memory probe failures. A probe failure means "no decision this
/// tick", never "zero capacity" — callers must not fold this into a target
/// of zero.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to read NUMA meminfo for node {node}: {source}")]
    NumaMeminfo { node: u32, source: std::io::Error },
    #[error("NUMA meminfo for node {node} is missing field {field}")]
    NumaMeminfoMalformed { node: u32, field: &'static str },
    #[error("failed to read cgroup usage at {path}: {source}")]
    CgroupUsage {
        path: String,
        source: std::io::Error,
    },
    #[error("cgroup usage file at {path} did not contain a valid integer")]
    CgroupUsageMalformed { path: String },
}

/// C5 workload lifecycle watcher failures.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("workload {name} did not become live within {deadline:?}")]
    WorkloadNotLive { name: String, deadline: Duration },
    #[error("workload {name} env is missing variable {var}")]
    EnvMissing { name: String, var: String },
    #[error("failed to discover PID for workload {name}: {source}")]
    RuntimeInspect {
        name: String,
        #[source]
        source: RuntimeInspectError,
    },
    #[error("failed to apply cgroup cap for workload {name} at {path}: {source}")]
    CgroupWrite {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("orchestrator watch stream ended unexpectedly: {0}")]
    OrchestratorWatch(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeInspectError {
    #[error("no running container found with pod-name label {pod_name}")]
    NotFound { pod_name: String },
    #[error("container runtime API error: {0}")]
    Backend(#[from] bollard::errors::Error),
    #[error("container cgroup file at {path} was not in the expected unified-hierarchy form")]
    CgroupPathMalformed { path: String },
}

/// C8 migration effector failures.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(
        "migratepages failed for workload {workload} (pid {pid}): exit status {status:?}\n{output}"
    )]
    ToolFailed {
        workload: String,
        pid: i32,
        status: Option<i32>,
        output: String,
    },
    #[error("failed to spawn migration tool for workload {workload}: {source}")]
    Spawn {
        workload: String,
        source: std::io::Error,
    },
}
