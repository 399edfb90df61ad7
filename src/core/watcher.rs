use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::core::adapter::Adapter;
use crate::core::block::BLOCK_SIZE_BYTES;
use crate::core::container_runtime::ContainerRuntime;
use crate::core::error::WatcherError;
use crate::core::orchestrator::{OrchestratorClient, WorkloadEvent};
use crate::core::registries::Registries;

/// Tunables C5 needs beyond the registries and its collaborators.
#[derive(Debug, Clone)]
pub struct WatcherTuning {
    pub namespace: String,
    pub allocation_env_var: String,
    pub live_deadline: Duration,
    pub live_poll_interval: Duration,
    pub watch_poll_interval: Duration,
}

/// C5: the workload lifecycle watcher. Diffs successive namespace listings
/// into add/delete events, then for each addition waits for the workload
/// to become live, reads its block allocation out of its environment,
/// binds the blocks, discovers its PID, and writes the cgroup cap. All of
/// this runs under the wiring flag so C6 and C7 do not observe a
/// partially-wired workload.
pub struct WorkloadWatcher<O, R> {
    registries: Registries,
    orchestrator: Arc<O>,
    runtime: Arc<R>,
    adapter: Arc<Adapter>,
    tuning: WatcherTuning,
    known: HashSet<String>,
}

impl<O, R> WorkloadWatcher<O, R>
where
    O: OrchestratorClient + 'static,
    R: ContainerRuntime + 'static,
{
    pub fn new(
        registries: Registries,
        orchestrator: Arc<O>,
        runtime: Arc<R>,
        adapter: Arc<Adapter>,
        tuning: WatcherTuning,
    ) -> Self {
        Self {
            registries,
            orchestrator,
            runtime,
            adapter,
            tuning,
            known: HashSet::new(),
        }
    }

    /// Runs the watch loop until the process is asked to shut down.
    /// Each `Added` workload is wired on its own task so a slow
    /// live-wait never blocks the diff loop from observing other events.
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = interval(self.tuning.watch_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for event in self.diff_once().await {
                        self.dispatch(event);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("workload watcher shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn diff_once(&mut self) -> Vec<WorkloadEvent> {
        let names = match self.orchestrator.list_pod_names(&self.tuning.namespace).await {
            Ok(names) => names,
            Err(err) => {
                warn!("failed to list workloads: {err}");
                return Vec::new();
            }
        };
        let current: HashSet<String> = names.into_iter().collect();

        let mut events = Vec::new();
        for name in current.difference(&self.known) {
            events.push(WorkloadEvent::Added { name: name.clone() });
        }
        for name in self.known.difference(&current) {
            events.push(WorkloadEvent::Deleted { name: name.clone() });
        }
        self.known = current;
        events
    }

    fn dispatch(&self, event: WorkloadEvent) {
        match event {
            WorkloadEvent::Added { name } => {
                let registries = self.registries.clone();
                let orchestrator = self.orchestrator.clone();
                let runtime = self.runtime.clone();
                let adapter = self.adapter.clone();
                let tuning = self.tuning.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        wire_workload(&registries, orchestrator.as_ref(), runtime.as_ref(), &adapter, &tuning, &name)
                            .await
                    {
                        warn!("failed to wire workload {name}: {err}");
                    }
                });
            }
            WorkloadEvent::Deleted { name } => {
                let registries = self.registries.clone();
                let adapter = self.adapter.clone();
                tokio::spawn(async move {
                    unwire_workload(&registries, &adapter, &name).await;
                });
            }
        }
    }
}

/// Live-wait, env read, PID discovery, and cgroup cap application,
/// serialized under the wiring flag.
async fn wire_workload<O, R>(
    registries: &Registries,
    orchestrator: &O,
    runtime: &R,
    adapter: &Adapter,
    tuning: &WatcherTuning,
    name: &str,
) -> Result<(), WatcherError>
where
    O: OrchestratorClient,
    R: ContainerRuntime,
{
    let _guard = registries.wiring_guard();

    wait_for_live(orchestrator, &tuning.namespace, name, tuning.live_deadline, tuning.live_poll_interval)
        .await?;

    let env = orchestrator.read_env(&tuning.namespace, name).await?;
    let raw = env
        .get(&tuning.allocation_env_var)
        .ok_or_else(|| WatcherError::EnvMissing {
            name: name.to_string(),
            var: tuning.allocation_env_var.clone(),
        })?;
    let block_ids: Vec<_> = raw
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string().into())
        .collect();

    let pid = runtime
        .discover_pid(name)
        .await
        .map_err(|source| WatcherError::RuntimeInspect {
            name: name.to_string(),
            source,
        })?;

    {
        let mut inner = registries.lock().await;
        for id in &block_ids {
            inner.blocks.mark_used(id, name);
        }
        inner.workloads.upsert(name, block_ids.clone(), Some(pid));
    }

    let pod_scope = runtime
        .pod_scope_cgroup(pid)
        .await
        .map_err(|source| WatcherError::RuntimeInspect {
            name: name.to_string(),
            source,
        })?;
    let cap_bytes = block_ids.len() as u64 * BLOCK_SIZE_BYTES;
    let cap_path = format!("{}/memory.max", pod_scope.pod_scope_dir);
    tokio::fs::write(&cap_path, cap_bytes.to_string())
        .await
        .map_err(|source| WatcherError::CgroupWrite {
            name: name.to_string(),
            path: cap_path,
            source,
        })?;

    let healthy = {
        let inner = registries.lock().await;
        inner.blocks.healthy_ids()
    };
    adapter.publish(healthy);

    info!("wired workload {name} to {} block(s)", block_ids.len());
    Ok(())
}

async fn unwire_workload(registries: &Registries, adapter: &Adapter, name: &str) {
    let mut inner = registries.lock().await;
    let bound = inner.workloads.clear_bound(name);
    for id in &bound {
        inner.blocks.mark_free(id);
    }
    inner.workloads.delete(name);
    let healthy = inner.blocks.healthy_ids();
    drop(inner);
    adapter.publish(healthy);
    info!("unwired workload {name}, released {} block(s)", bound.len());
}

async fn wait_for_live<O: OrchestratorClient>(
    orchestrator: &O,
    namespace: &str,
    name: &str,
    deadline: Duration,
    poll_interval: Duration,
) -> Result<(), WatcherError> {
    let poll = async {
        let mut ticker = interval(poll_interval);
        loop {
            ticker.tick().await;
            if orchestrator.is_live(namespace, name).await.unwrap_or(false) {
                return;
            }
        }
    };
    timeout(deadline, poll)
        .await
        .map_err(|_| WatcherError::WorkloadNotLive {
            name: name.to_string(),
            deadline,
        })
}
