use bollard::query_parameters::{InspectContainerOptions, ListContainersOptionsBuilder};
use bollard::secret::ContainerSummaryStateEnum;
use bollard::Docker;

use crate::core::error::RuntimeInspectError;

/// The cgroup path resolved for a workload's container, split into the
/// container-scope leaf and its parent pod-scope directory. The capacity
/// cap is written to the pod-scope directory so a container restart
/// (which gets a fresh container-scope cgroup) does not reset it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodScopeCgroup {
    pub pod_scope_dir: String,
}

/// C5 step 4: discovers a workload's container PID by enumerating running
/// containers on the host runtime and selecting the one whose pod-name
/// label matches and whose state is running.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn discover_pid(&self, pod_name: &str) -> Result<i32, RuntimeInspectError>;

    /// Resolves the pod-scope cgroup directory for a given PID by reading
    /// `/proc/<pid>/cgroup` and walking one level up from the
    /// container-scope path found under the unified hierarchy `0::`.
    async fn pod_scope_cgroup(&self, pid: i32) -> Result<PodScopeCgroup, RuntimeInspectError>;
}

/// Production adapter: talks to the container runtime's API via `bollard`
/// instead of shelling out to a CLI and parsing text — the same channel
/// used elsewhere in this crate's ancestry to watch containers come up,
/// generalized here to "the container backing a colocated workload."
pub struct BollardContainerRuntime {
    docker: Docker,
    pod_label: String,
}

impl BollardContainerRuntime {
    pub fn new(docker: Docker, pod_label: impl Into<String>) -> Self {
        Self {
            docker,
            pod_label: pod_label.into(),
        }
    }

    pub fn connect_local(pod_label: impl Into<String>) -> Result<Self, RuntimeInspectError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker, pod_label))
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for BollardContainerRuntime {
    async fn discover_pid(&self, pod_name: &str) -> Result<i32, RuntimeInspectError> {
        let filter_value = format!("{}={pod_name}", self.pod_label);
        let options = ListContainersOptionsBuilder::new()
            .filters(&std::collections::HashMap::from([(
                "label",
                vec![filter_value.as_str()],
            )]))
            .build();

        let containers = self.docker.list_containers(Some(options)).await?;
        let running = containers
            .into_iter()
            .find(|c| c.state == Some(ContainerSummaryStateEnum::RUNNING))
            .ok_or_else(|| RuntimeInspectError::NotFound {
                pod_name: pod_name.to_string(),
            })?;

        let id = running.id.ok_or_else(|| RuntimeInspectError::NotFound {
            pod_name: pod_name.to_string(),
        })?;

        let details = self
            .docker
            .inspect_container(&id, None::<InspectContainerOptions>)
            .await?;

        details
            .state
            .and_then(|s| s.pid)
            .filter(|pid| *pid > 0)
            .map(|pid| pid as i32)
            .ok_or(RuntimeInspectError::NotFound {
                pod_name: pod_name.to_string(),
            })
    }

    async fn pod_scope_cgroup(&self, pid: i32) -> Result<PodScopeCgroup, RuntimeInspectError> {
        let path = format!("/proc/{pid}/cgroup");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| RuntimeInspectError::CgroupPathMalformed { path: path.clone() })?;
        parse_pod_scope_cgroup(&contents)
    }
}

/// Parses the unified-hierarchy (`0::`) line of `/proc/<pid>/cgroup` and
/// walks one level up to the pod-scope directory.
fn parse_pod_scope_cgroup(contents: &str) -> Result<PodScopeCgroup, RuntimeInspectError> {
    let line = contents
        .lines()
        .find(|l| l.starts_with("0::"))
        .ok_or_else(|| RuntimeInspectError::CgroupPathMalformed {
            path: contents.to_string(),
        })?;
    let rel_path = line.trim_start_matches("0::");
    let full_path = format!("/sys/fs/cgroup{rel_path}");
    let container_dir = std::path::Path::new(&full_path);
    let pod_scope_dir = container_dir
        .parent()
        .ok_or_else(|| RuntimeInspectError::CgroupPathMalformed {
            path: full_path.clone(),
        })?
        .to_string_lossy()
        .to_string();

    Ok(PodScopeCgroup { pod_scope_dir })
}
