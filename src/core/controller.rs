use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::core::adapter::Adapter;
use crate::core::block::BlockId;
use crate::core::controller_state::ControllerState;
use crate::core::migration::MigrationEffector;
use crate::core::registries::Registries;
use crate::core::snapshot::{calculate, Probe};

/// Why a tick produced no action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    WiringInProgress,
    ReclaimInProgress,
    ProbeFailed,
    Debounced,
}

/// What a tick actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Grown { delta: u64, created: Vec<BlockId> },
    Shrunk { deleted: u64, evicted: Vec<String> },
}

/// Tunables the controller needs that aren't part of [`crate::config::Config`]
/// verbatim (kept separate so `CapacityController` doesn't depend on `clap`).
#[derive(Debug, Clone)]
pub struct ControllerTuning {
    pub safety_ratio: f64,
    pub debounce_threshold: i64,
    pub min_adjustment_interval: std::time::Duration,
    pub debounce_disabled: bool,
    pub local_node: u32,
    pub fallback_node: u32,
}

/// C6, the core of this crate: the closed control loop that measures
/// capacity, diffs it against the last applied target, and either grows
/// the block pool or shrinks it — evicting workloads and driving
/// migration when free blocks alone aren't enough.
pub struct CapacityController {
    registries: Registries,
    probe: Arc<dyn Probe>,
    migration: Arc<dyn MigrationEffector>,
    adapter: Arc<Adapter>,
    tuning: ControllerTuning,
    state: ControllerState,
}

impl CapacityController {
    pub fn new(
        registries: Registries,
        probe: Arc<dyn Probe>,
        migration: Arc<dyn MigrationEffector>,
        adapter: Arc<Adapter>,
        tuning: ControllerTuning,
    ) -> Self {
        Self {
            registries,
            probe,
            migration,
            adapter,
            tuning,
            state: ControllerState::new(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Runs one control tick: measure, debounce, then grow or shrink.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.registries.is_wiring_in_progress() {
            debug!("controller tick skipped: workload wiring in progress");
            return TickOutcome::Skipped(SkipReason::WiringInProgress);
        }
        if self.registries.is_reclaim_in_progress() {
            debug!("controller tick skipped: reclaim in progress");
            return TickOutcome::Skipped(SkipReason::ReclaimInProgress);
        }

        let readings = match self.probe.snapshot().await {
            Ok(readings) => readings,
            Err(err) => {
                warn!("controller tick skipped: probe failed: {err}");
                return TickOutcome::Skipped(SkipReason::ProbeFailed);
            }
        };

        let snapshot = calculate(readings, self.tuning.safety_ratio);
        let target = snapshot.target_blocks;
        let now = Instant::now();

        if !self.tuning.debounce_disabled
            && self.state.should_debounce(
                target,
                self.tuning.debounce_threshold,
                self.tuning.min_adjustment_interval,
                now,
            )
        {
            debug!("controller tick debounced: target={target}");
            return TickOutcome::Skipped(SkipReason::Debounced);
        }

        let delta = target as i64 - self.state.previous_target as i64;
        let outcome = if delta > 0 {
            self.grow(delta as u64).await
        } else if delta < 0 {
            self.shrink((-delta) as u64).await
        } else {
            TickOutcome::Skipped(SkipReason::Debounced)
        };

        self.state.record_adjustment(target, now);
        self.publish_current_state().await;
        outcome
    }

    async fn grow(&self, delta: u64) -> TickOutcome {
        let mut inner = self.registries.lock().await;
        let mut created = Vec::with_capacity(delta as usize);
        for _ in 0..delta {
            created.push(inner.blocks.create_free());
        }
        info!("controller grew block pool by {delta}");
        TickOutcome::Grown { delta, created }
    }

    /// The central shrink policy: free-first, then most-blocks-first
    /// eviction, with replacement-on-overshoot so the block-count
    /// contract to the orchestrator always holds.
    async fn shrink(&self, target_deletions: u64) -> TickOutcome {
        let mut inner = self.registries.lock().await;
        let mut deletions: u64 = 0;
        let mut evicted_workloads = Vec::new();

        // Phase A: free-first.
        let free_ids = inner.blocks.free_ids();
        for id in free_ids.into_iter().take(target_deletions as usize) {
            inner.blocks.delete(&id);
            deletions += 1;
        }

        if deletions >= target_deletions {
            return TickOutcome::Shrunk {
                deleted: deletions,
                evicted: evicted_workloads,
            };
        }

        // Phase B: most-blocks-first victim selection. Retires the most
        // capacity per migration, minimizing orchestrator-visible
        // migrations per capacity-loss event.
        let victim_names: Vec<String> = inner
            .workloads
            .by_descending_bound_size()
            .into_iter()
            .map(|w| w.name.clone())
            .collect();

        for name in victim_names {
            if deletions >= target_deletions {
                break;
            }
            let bound_ids = inner.workloads.clear_bound(&name);
            if bound_ids.is_empty() {
                continue;
            }
            for id in &bound_ids {
                inner.blocks.delete(id);
                inner.workloads.append_swapped(&name, id.clone());
            }
            deletions += bound_ids.len() as u64;
            evicted_workloads.push(name.clone());

            // Overshoot: the victim had more blocks than still needed.
            // Create fresh free blocks for the excess so the published
            // count still matches the target exactly.
            if deletions > target_deletions {
                let excess = deletions - target_deletions;
                for _ in 0..excess {
                    inner.blocks.create_free();
                }
            }

            let pid = inner.workloads.get(&name).and_then(|w| w.pid);
            drop(inner);
            if let Some(pid) = pid {
                if let Err(err) = self
                    .migration
                    .migrate(&name, pid, self.tuning.local_node, self.tuning.fallback_node)
                    .await
                {
                    warn!("migration failed for evicted workload {name}: {err}");
                }
            } else {
                warn!("no PID known for evicted workload {name}; cannot migrate pages");
            }
            inner = self.registries.lock().await;
        }

        info!(
            "controller shrank block pool by {deletions} (evicted {} workload(s))",
            evicted_workloads.len()
        );
        TickOutcome::Shrunk {
            deleted: deletions,
            evicted: evicted_workloads,
        }
    }

    async fn publish_current_state(&self) {
        let inner = self.registries.lock().await;
        self.adapter.publish(inner.blocks.healthy_ids());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProbeError;
    use crate::core::snapshot::RawReadings;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct FixedProbe {
        total_free: AtomicU64,
        online_used: AtomicU64,
    }

    #[async_trait::async_trait]
    impl Probe for FixedProbe {
        async fn snapshot(&self) -> Result<RawReadings, ProbeError> {
            Ok(RawReadings {
                total_free_bytes: self.total_free.load(Ordering::SeqCst),
                online_used_bytes: self.online_used.load(Ordering::SeqCst),
            })
        }
    }

    struct NoopMigration;

    #[async_trait::async_trait]
    impl MigrationEffector for NoopMigration {
        async fn migrate(
            &self,
            _workload: &str,
            _pid: i32,
            _src: u32,
            _dst: u32,
        ) -> Result<(), crate::core::error::MigrationError> {
            Ok(())
        }
    }

    const GIB: u64 = 1024 * 1024 * 1024;

    fn make_controller(probe: Arc<FixedProbe>) -> CapacityController {
        let (adapter, _rx) = Adapter::new(crate::core::adapter::DEFAULT_ALLOCATION_ENV_VAR);
        CapacityController::new(
            Registries::new(),
            probe,
            Arc::new(NoopMigration),
            Arc::new(adapter),
            ControllerTuning {
                safety_ratio: 0.10,
                debounce_threshold: 1,
                min_adjustment_interval: Duration::ZERO,
                debounce_disabled: true,
                local_node: 0,
                fallback_node: 2,
            },
        )
    }

    #[tokio::test]
    async fn s1_steady_state_then_s2_growth() {
        let probe = Arc::new(FixedProbe {
            total_free: AtomicU64::new(20 * GIB),
            online_used: AtomicU64::new(0),
        });
        let mut controller = make_controller(probe.clone());

        let outcome = controller.tick().await;
        match outcome {
            TickOutcome::Grown { delta, created } => {
                assert_eq!(delta, 36);
                assert_eq!(created.len(), 36);
            }
            other => panic!("expected growth, got {other:?}"),
        }
        assert_eq!(controller.state().previous_target, 36);

        probe.total_free.store(22 * GIB, Ordering::SeqCst);
        let outcome = controller.tick().await;
        match outcome {
            TickOutcome::Grown { delta, .. } => assert_eq!(delta, 3),
            other => panic!("expected growth, got {other:?}"),
        }
        assert_eq!(controller.state().previous_target, 39);
    }

    #[tokio::test]
    async fn s3_shrink_free_only() {
        let probe = Arc::new(FixedProbe {
            total_free: AtomicU64::new(22 * GIB),
            online_used: AtomicU64::new(0),
        });
        let mut controller = make_controller(probe.clone());
        controller.tick().await; // establishes target 39

        probe.total_free.store(18 * GIB, Ordering::SeqCst);
        let outcome = controller.tick().await;
        match outcome {
            TickOutcome::Shrunk { deleted, evicted } => {
                assert_eq!(deleted, 7);
                assert!(evicted.is_empty());
            }
            other => panic!("expected shrink, got {other:?}"),
        }
        assert_eq!(controller.state().previous_target, 32);
    }

    #[tokio::test]
    async fn s4_s5_shrink_forces_eviction_with_overshoot_replacement() {
        let probe = Arc::new(FixedProbe {
            total_free: AtomicU64::new(20 * GIB),
            online_used: AtomicU64::new(0),
        });
        let mut controller = make_controller(probe.clone());
        controller.tick().await; // target 36, all free

        // Seed two workloads matching S4/S5: W1 bound={b1..b4}, W2 bound={b5,b6}.
        {
            let mut inner = controller.registries.lock().await;
            let free_ids = inner.blocks.free_ids();
            let mut iter = free_ids.into_iter();
            let w1_ids: Vec<_> = (0..4).map(|_| iter.next().unwrap()).collect();
            let w2_ids: Vec<_> = (0..2).map(|_| iter.next().unwrap()).collect();
            for id in &w1_ids {
                inner.blocks.mark_used(id, "w1");
            }
            for id in &w2_ids {
                inner.blocks.mark_used(id, "w2");
            }
            inner.workloads.upsert("w1", w1_ids, Some(111));
            inner.workloads.upsert("w2", w2_ids, Some(222));
        }

        // Shrink to 32 blocks; 30 free blocks absorb it with Phase A alone.
        probe.total_free.store(18 * GIB, Ordering::SeqCst);
        controller.tick().await;

        // Collapse free memory entirely: target drops to 0, exhausting all
        // 26 remaining free blocks and forcing Phase B to retire both
        // workloads' bound blocks to hit the target exactly.
        probe.total_free.store(GIB / 2, Ordering::SeqCst);
        let outcome = controller.tick().await;

        match outcome {
            TickOutcome::Shrunk { evicted, .. } => {
                assert!(evicted.contains(&"w1".to_string()));
            }
            other => panic!("expected shrink with eviction, got {other:?}"),
        }

        let inner = controller.registries.lock().await;
        assert!(inner.workloads.get("w1").unwrap().bound().is_empty());
        assert_eq!(inner.workloads.get("w1").unwrap().swapped().len(), 4);
    }
}
