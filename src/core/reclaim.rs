use std::sync::Arc;

use log::{info, warn};

use crate::core::adapter::Adapter;
use crate::core::migration::MigrationEffector;
use crate::core::registries::Registries;

/// What a reclaim tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    Skipped,
    Reclaimed { workloads: Vec<String>, blocks: u64 },
}

/// Tunables mirroring [`crate::controller::ControllerTuning`]'s node pair,
/// reversed: reclaim migrates pages back from the fallback tier to local.
#[derive(Debug, Clone)]
pub struct ReclaimTuning {
    pub local_node: u32,
    pub fallback_node: u32,
}

/// C7: the reclaim loop. On every tick, finds workloads sitting on a
/// non-empty swapped set and restores as much of it as current free
/// capacity allows, migrating the workload's pages back from the
/// fallback tier as each block is restored.
pub struct ReclaimLoop {
    registries: Registries,
    migration: Arc<dyn MigrationEffector>,
    adapter: Arc<Adapter>,
    tuning: ReclaimTuning,
}

impl ReclaimLoop {
    pub fn new(
        registries: Registries,
        migration: Arc<dyn MigrationEffector>,
        adapter: Arc<Adapter>,
        tuning: ReclaimTuning,
    ) -> Self {
        Self {
            registries,
            migration,
            adapter,
            tuning,
        }
    }

    /// Runs one reclaim pass. Yields to workload wiring, same priority
    /// order the capacity controller observes.
    pub async fn tick(&self) -> ReclaimOutcome {
        if self.registries.is_wiring_in_progress() {
            return ReclaimOutcome::Skipped;
        }
        let _guard = self.registries.reclaim_guard();

        let mut reclaimed_workloads = Vec::new();
        let mut reclaimed_blocks: u64 = 0;

        loop {
            let candidate = {
                let inner = self.registries.lock().await;
                let free_count = inner.blocks.count_free() as u64;
                let found = inner
                    .workloads
                    .iter()
                    .find(|w| {
                        !w.swapped().is_empty() && free_count >= w.swapped().len() as u64
                    })
                    .map(|w| w.name.clone());
                found
            };

            let Some(name) = candidate else { break };

            let swapped_ids: Vec<_> = {
                let inner = self.registries.lock().await;
                inner
                    .workloads
                    .get(&name)
                    .map(|w| w.swapped().iter().cloned().collect())
                    .unwrap_or_default()
            };
            if swapped_ids.is_empty() {
                break;
            }

            let pid = {
                let inner = self.registries.lock().await;
                inner.workloads.get(&name).and_then(|w| w.pid)
            };

            {
                let mut inner = self.registries.lock().await;
                for id in &swapped_ids {
                    // Consume one free block's capacity slot, then restore
                    // this workload's block under its original identity.
                    let free_ids = inner.blocks.free_ids();
                    if let Some(donor) = free_ids.first() {
                        inner.blocks.delete(donor);
                    }
                    inner.blocks.recreate_bound(id.clone(), &name);
                    inner.workloads.move_swapped_to_bound(&name, id);
                }
            }

            if let Some(pid) = pid {
                if let Err(err) = self
                    .migration
                    .migrate(&name, pid, self.tuning.fallback_node, self.tuning.local_node)
                    .await
                {
                    warn!("reclaim migration failed for workload {name}: {err}");
                }
            } else {
                warn!("no PID known for reclaimed workload {name}; cannot migrate pages back");
            }

            reclaimed_blocks += swapped_ids.len() as u64;
            reclaimed_workloads.push(name);
        }

        if reclaimed_workloads.is_empty() {
            return ReclaimOutcome::Skipped;
        }

        let healthy = {
            let inner = self.registries.lock().await;
            inner.blocks.healthy_ids()
        };
        self.adapter.publish(healthy);

        info!(
            "reclaim restored {reclaimed_blocks} block(s) across {} workload(s)",
            reclaimed_workloads.len()
        );
        ReclaimOutcome::Reclaimed {
            workloads: reclaimed_workloads,
            blocks: reclaimed_blocks,
        }
    }
}
