use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::core::block_registry::BlockRegistry;
use crate::core::workload_registry::WorkloadRegistry;

/// The registries' inner state, guarded by a single mutex rather than by
/// ad-hoc borrowing. The two atomics below retain workload wiring's
/// priority over the capacity controller and reclaim loop as a cheap
/// skip-this-tick check that doesn't require holding the mutex to
/// evaluate.
pub struct Inner {
    pub blocks: BlockRegistry,
    pub workloads: WorkloadRegistry,
}

#[derive(Clone)]
pub struct Registries {
    inner: Arc<Mutex<Inner>>,
    wiring_in_progress: Arc<AtomicBool>,
    reclaim_in_progress: Arc<AtomicBool>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                blocks: BlockRegistry::new(),
                workloads: WorkloadRegistry::new(),
            })),
            wiring_in_progress: Arc::new(AtomicBool::new(false)),
            reclaim_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().await
    }

    pub fn is_wiring_in_progress(&self) -> bool {
        self.wiring_in_progress.load(Ordering::SeqCst)
    }

    pub fn is_reclaim_in_progress(&self) -> bool {
        self.reclaim_in_progress.load(Ordering::SeqCst)
    }

    /// Held for the duration of workload wiring: env read, PID discovery,
    /// and cgroup cap application. Set before the env is read, cleared
    /// only once the registries are consistent again.
    pub fn wiring_guard(&self) -> FlagGuard {
        self.wiring_in_progress.store(true, Ordering::SeqCst);
        FlagGuard {
            flag: self.wiring_in_progress.clone(),
        }
    }

    /// Held by C7 for the duration of a reclaim pass.
    pub fn reclaim_guard(&self) -> FlagGuard {
        self.reclaim_in_progress.store(true, Ordering::SeqCst);
        FlagGuard {
            flag: self.reclaim_in_progress.clone(),
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears its flag on drop, so an early return or panic inside a wiring
/// or reclaim pass can never leave the registries permanently gated.
pub struct FlagGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
