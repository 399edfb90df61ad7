use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::Command;

use crate::core::error::WatcherError;

/// A workload lifecycle event, as observed from the orchestrator watch
/// stream for a fixed namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadEvent {
    Added { name: String },
    Deleted { name: String },
}

/// C5's collaborator for orchestrator lifecycle events and in-container
/// environment reads. The wire protocol used to obtain these (watch API,
/// `exec`) is an external contract — this trait models only the two
/// operations the watcher needs.
#[async_trait::async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Polls whether the named workload has reached a live state.
    async fn is_live(&self, namespace: &str, name: &str) -> Result<bool, WatcherError>;

    /// Reads the in-container environment of a live workload.
    async fn read_env(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HashMap<String, String>, WatcherError>;

    /// Lists the workload names currently present in the namespace. C5
    /// diffs successive calls into [`WorkloadEvent`]s itself; the watch
    /// API this would otherwise stream from is external to this crate.
    async fn list_pod_names(&self, namespace: &str) -> Result<Vec<String>, WatcherError>;
}

/// Production adapter: shells out to the orchestrator's CLI
/// (`exec <pod> -n <ns> -- env`).
pub struct CliOrchestratorClient {
    binary: String,
    kubeconfig: Option<String>,
}

impl CliOrchestratorClient {
    pub fn new(binary: impl Into<String>, kubeconfig: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd
    }
}

#[async_trait::async_trait]
impl OrchestratorClient for CliOrchestratorClient {
    async fn is_live(&self, namespace: &str, name: &str) -> Result<bool, WatcherError> {
        let output = self
            .base_command()
            .args([
                "get",
                "pod",
                name,
                "-n",
                namespace,
                "-o",
                "jsonpath={.status.phase}",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WatcherError::OrchestratorWatch(e.to_string()))?;

        let phase = String::from_utf8_lossy(&output.stdout);
        Ok(phase.trim() == "Running")
    }

    async fn read_env(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HashMap<String, String>, WatcherError> {
        let output = self
            .base_command()
            .args(["exec", name, "-n", namespace, "--", "env"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WatcherError::OrchestratorWatch(e.to_string()))?;

        Ok(parse_env_output(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn list_pod_names(&self, namespace: &str) -> Result<Vec<String>, WatcherError> {
        let output = self
            .base_command()
            .args([
                "get",
                "pods",
                "-n",
                namespace,
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WatcherError::OrchestratorWatch(e.to_string()))?;

        let names = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(names)
    }
}

fn parse_env_output(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
