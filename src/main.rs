use std::sync::Arc;

use clap::Parser;
use colocation_memory_agent::core::adapter::Adapter;
use colocation_memory_agent::core::container_runtime::BollardContainerRuntime;
use colocation_memory_agent::core::migration::MigratepagesEffector;
use colocation_memory_agent::core::orchestrator::CliOrchestratorClient;
use colocation_memory_agent::core::probe::SysfsProbe;
use colocation_memory_agent::core::registries::Registries;
use colocation_memory_agent::core::watcher::WatcherTuning;
use colocation_memory_agent::{CapacityController, Config, ControllerTuning, ReclaimLoop, ReclaimTuning, WorkloadWatcher};
use log::info;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> colocation_memory_agent::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    info!(
        "starting colocation-memory-agent, resource={} namespace={}",
        config.resource_name, config.namespace
    );

    let registries = Registries::new();
    let (adapter, _allocation_rx) = Adapter::new(config.allocation_env_var.clone());
    let adapter = Arc::new(adapter);

    let probe = Arc::new(SysfsProbe::new(
        config.numa_nodes.clone(),
        config.online_cgroup_path.clone(),
    ));
    let migration = Arc::new(MigratepagesEffector::new());
    let orchestrator = Arc::new(CliOrchestratorClient::new("kubectl", config.kubeconfig.clone()));
    let runtime = Arc::new(BollardContainerRuntime::connect_local(
        config.pod_label.clone(),
    )?);

    let local_node = *config.numa_nodes.first().unwrap_or(&0);

    let mut controller = CapacityController::new(
        registries.clone(),
        probe,
        migration.clone(),
        adapter.clone(),
        ControllerTuning {
            safety_ratio: config.safety_ratio,
            debounce_threshold: config.debounce_threshold,
            min_adjustment_interval: config.min_adjustment_interval(),
            debounce_disabled: config.debounce_disabled,
            local_node,
            fallback_node: config.fallback_node,
        },
    );

    let reclaim = ReclaimLoop::new(
        registries.clone(),
        migration,
        adapter.clone(),
        ReclaimTuning {
            local_node,
            fallback_node: config.fallback_node,
        },
    );

    let watcher = WorkloadWatcher::new(
        registries.clone(),
        orchestrator,
        runtime,
        adapter,
        WatcherTuning {
            namespace: config.namespace.clone(),
            allocation_env_var: config.allocation_env_var.clone(),
            live_deadline: config.live_deadline(),
            live_poll_interval: config.live_poll_interval(),
            watch_poll_interval: config.watch_poll_interval(),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_interval = config.refresh_interval();
    let reclaim_interval = config.reclaim_interval();

    let controller_shutdown = shutdown_rx.clone();
    let controller_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_interval);
        let mut shutdown = controller_shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    controller.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    let reclaim_shutdown = shutdown_rx.clone();
    let reclaim_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reclaim_interval);
        let mut shutdown = reclaim_shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    reclaim.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    let watcher_task = tokio::spawn(watcher.run(shutdown_rx));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining loops");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(controller_task, reclaim_task, watcher_task);
    info!("colocation-memory-agent stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}
