//! End-to-end capacity controller scenarios, driven entirely through fake
//! collaborators so no sysfs, cgroup, or container runtime access is
//! required to run these.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colocation_memory_agent::core::adapter::{Adapter, DEFAULT_ALLOCATION_ENV_VAR};
use colocation_memory_agent::core::error::{MigrationError, ProbeError};
use colocation_memory_agent::core::migration::MigrationEffector;
use colocation_memory_agent::core::registries::Registries;
use colocation_memory_agent::core::snapshot::{Probe, RawReadings};
use colocation_memory_agent::core::reclaim::ReclaimOutcome;
use colocation_memory_agent::{CapacityController, ControllerTuning, ReclaimLoop, ReclaimTuning};

const GIB: u64 = 1024 * 1024 * 1024;

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

struct RecordingMigration {
    calls: std::sync::Mutex<Vec<(String, u32, u32)>>,
}

impl RecordingMigration {
    fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl MigrationEffector for RecordingMigration {
    async fn migrate(
        &self,
        workload: &str,
        _pid: i32,
        src: u32,
        dst: u32,
    ) -> Result<(), MigrationError> {
        self.calls
            .lock()
            .unwrap()
            .push((workload.to_string(), src, dst));
        Ok(())
    }
}

fn make_controller(
    probe: Arc<FixedProbe>,
    migration: Arc<RecordingMigration>,
) -> (CapacityController, Registries) {
    let registries = Registries::new();
    let (adapter, _rx) = Adapter::new(DEFAULT_ALLOCATION_ENV_VAR);
    let controller = CapacityController::new(
        registries.clone(),
        probe,
        migration,
        Arc::new(adapter),
        ControllerTuning {
            safety_ratio: 0.10,
            debounce_threshold: 1,
            min_adjustment_interval: Duration::ZERO,
            debounce_disabled: true,
            local_node: 0,
            fallback_node: 2,
        },
    );
    (controller, registries)
}

/// S1: a steady 20 GiB free with nothing online yields a 36-block pool.
#[tokio::test]
async fn s1_steady_state() {
    let probe = Arc::new(FixedProbe {
        total_free: AtomicU64::new(20 * GIB),
        online_used: AtomicU64::new(0),
    });
    let (mut controller, registries) = make_controller(probe, Arc::new(RecordingMigration::new()));
    controller.tick().await;

    let inner = registries.lock().await;
    assert_eq!(inner.blocks.count(), 36);
    assert_eq!(inner.blocks.count_free(), 36);
}

/// S2: free memory grows to 22 GiB; the pool grows to 39 blocks without
/// disturbing any already-bound block.
#[tokio::test]
async fn s2_growth_preserves_existing_blocks() {
    let probe = Arc::new(FixedProbe {
        total_free: AtomicU64::new(20 * GIB),
        online_used: AtomicU64::new(0),
    });
    let (mut controller, registries) = make_controller(probe.clone(), Arc::new(RecordingMigration::new()));
    controller.tick().await;
    let original_ids: std::collections::HashSet<_> = {
        let inner = registries.lock().await;
        inner.blocks.iter().map(|b| b.id.clone()).collect()
    };

    probe.total_free.store(22 * GIB, Ordering::SeqCst);
    controller.tick().await;

    let inner = registries.lock().await;
    assert_eq!(inner.blocks.count(), 39);
    for id in &original_ids {
        assert!(inner.blocks.lookup(id).is_some());
    }
}

/// S3: free memory contracts but the free pool alone absorbs the loss —
/// no workload is evicted and no migration is invoked.
#[tokio::test]
async fn s3_shrink_absorbed_by_free_pool() {
    let probe = Arc::new(FixedProbe {
        total_free: AtomicU64::new(22 * GIB),
        online_used: AtomicU64::new(0),
    });
    let migration = Arc::new(RecordingMigration::new());
    let (mut controller, registries) = make_controller(probe.clone(), migration.clone());
    controller.tick().await; // target 39, all free

    probe.total_free.store(18 * GIB, Ordering::SeqCst);
    controller.tick().await;

    let inner = registries.lock().await;
    assert_eq!(inner.blocks.count(), 32);
    assert!(migration.calls.lock().unwrap().is_empty());
}

/// S4/S5: the free pool can't absorb a large contraction; the controller
/// evicts the most-blocks-first workload and drives a migration for it,
/// while a smaller co-resident workload is left untouched.
#[tokio::test]
async fn s4_s5_forced_eviction_picks_largest_victim() {
    let probe = Arc::new(FixedProbe {
        total_free: AtomicU64::new(20 * GIB),
        online_used: AtomicU64::new(0),
    });
    let migration = Arc::new(RecordingMigration::new());
    let (mut controller, registries) = make_controller(probe.clone(), migration.clone());
    controller.tick().await; // target 36, all free

    {
        let mut inner = registries.lock().await;
        let free_ids = inner.blocks.free_ids();
        let mut iter = free_ids.into_iter();
        let big: Vec<_> = (0..4).map(|_| iter.next().unwrap()).collect();
        let small: Vec<_> = (0..2).map(|_| iter.next().unwrap()).collect();
        for id in &big {
            inner.blocks.mark_used(id, "big-workload");
        }
        for id in &small {
            inner.blocks.mark_used(id, "small-workload");
        }
        inner.workloads.upsert("big-workload", big, Some(100));
        inner.workloads.upsert("small-workload", small, Some(200));
    }

    // Drain to 32 blocks (Phase A only, 30 free blocks available).
    probe.total_free.store(18 * GIB, Ordering::SeqCst);
    controller.tick().await;

    // Collapse to zero target, forcing Phase B to retire both workloads.
    probe.total_free.store(GIB / 2, Ordering::SeqCst);
    controller.tick().await;

    let inner = registries.lock().await;
    assert!(inner.workloads.get("big-workload").unwrap().bound().is_empty());
    assert_eq!(inner.workloads.get("big-workload").unwrap().swapped().len(), 4);

    let calls = migration.calls.lock().unwrap();
    assert!(calls.iter().any(|(name, src, dst)| name == "big-workload" && *src == 0 && *dst == 2));
}

/// Capacity never goes negative even when online usage outstrips free
/// memory entirely.
#[tokio::test]
async fn capacity_floor_is_zero() {
    let probe = Arc::new(FixedProbe {
        total_free: AtomicU64::new(GIB),
        online_used: AtomicU64::new(10 * GIB),
    });
    let (mut controller, registries) = make_controller(probe, Arc::new(RecordingMigration::new()));
    controller.tick().await;

    let inner = registries.lock().await;
    assert_eq!(inner.blocks.count(), 0);
}

/// S6: once a shrink has swapped a workload's blocks out, a later growth
/// in free capacity lets the reclaim loop restore them under their
/// original ids and migrate the workload's pages back in.
#[tokio::test]
async fn s6_reclaim_restores_swapped_blocks() {
    let probe = Arc::new(FixedProbe {
        total_free: AtomicU64::new(20 * GIB),
        online_used: AtomicU64::new(0),
    });
    let migration = Arc::new(RecordingMigration::new());
    let registries = Registries::new();
    let (adapter, _rx) = Adapter::new(DEFAULT_ALLOCATION_ENV_VAR);
    let adapter = Arc::new(adapter);
    let mut controller = CapacityController::new(
        registries.clone(),
        probe.clone(),
        migration.clone(),
        adapter.clone(),
        ControllerTuning {
            safety_ratio: 0.10,
            debounce_threshold: 1,
            min_adjustment_interval: Duration::ZERO,
            debounce_disabled: true,
            local_node: 0,
            fallback_node: 2,
        },
    );
    controller.tick().await; // target 36, all free

    let swapped_ids = {
        let mut inner = registries.lock().await;
        let ids: Vec<_> = inner.blocks.free_ids().into_iter().take(4).collect();
        for id in &ids {
            inner.blocks.mark_used(id, "w1");
        }
        inner.workloads.upsert("w1", ids.clone(), Some(321));
        ids
    };

    let reclaim = ReclaimLoop::new(
        registries.clone(),
        migration.clone(),
        adapter,
        ReclaimTuning {
            local_node: 0,
            fallback_node: 2,
        },
    );

    // Free memory collapses entirely: target drops to 0, exhausting the 32
    // remaining free blocks and forcing Phase B to swap out w1's 4 bound
    // blocks to hit the target exactly.
    probe.total_free.store(GIB / 2, Ordering::SeqCst);
    controller.tick().await;
    {
        let inner = registries.lock().await;
        assert_eq!(inner.blocks.count(), 0);
        assert_eq!(inner.workloads.get("w1").unwrap().swapped().len(), 4);
    }

    // Not enough free capacity yet to reclaim anything.
    assert_eq!(reclaim.tick().await, ReclaimOutcome::Skipped);

    // Free capacity returns: the controller grows the pool back to 36
    // fresh free blocks, and the reclaim loop restores all 4 swapped ids
    // under their original identity.
    probe.total_free.store(20 * GIB, Ordering::SeqCst);
    controller.tick().await;
    let outcome = reclaim.tick().await;
    match outcome {
        ReclaimOutcome::Reclaimed { workloads, blocks } => {
            assert_eq!(workloads, vec!["w1".to_string()]);
            assert_eq!(blocks, 4);
        }
        other => panic!("expected reclaim, got {other:?}"),
    }

    let inner = registries.lock().await;
    let record = inner.workloads.get("w1").unwrap();
    assert!(record.swapped().is_empty());
    for id in &swapped_ids {
        assert!(record.bound().contains(id));
    }

    let calls = migration.calls.lock().unwrap();
    assert!(calls
        .iter()
        .any(|(name, src, dst)| name == "w1" && *src == 2 && *dst == 0));
}
