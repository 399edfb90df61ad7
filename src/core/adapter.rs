use std::collections::HashMap;

use tokio::sync::watch;

use crate::core::block::BlockId;

/// The name of the container environment variable through which the
/// orchestrator's allocation decision is disclosed to the workload (and,
/// read back, to the lifecycle watcher). Part of the system's external
/// contract — fixed configuration, not negotiated at runtime.
pub const DEFAULT_ALLOCATION_ENV_VAR: &str = "COLOC_MEMORY_BLOCKS";

/// C9: publishes the current healthy block set on every change, and
/// resolves an orchestrator allocation decision into the env bindings a
/// container will receive. The device-plugin RPC surface itself (gRPC
/// service registration, `ListAndWatch` framing) is external to this
/// crate; `Adapter` models only the two operations C9 owns.
pub struct Adapter {
    sender: watch::Sender<Vec<BlockId>>,
    allocation_env_var: String,
}

impl Adapter {
    pub fn new(allocation_env_var: impl Into<String>) -> (Self, watch::Receiver<Vec<BlockId>>) {
        let (sender, receiver) = watch::channel(Vec::new());
        (
            Self {
                sender,
                allocation_env_var: allocation_env_var.into(),
            },
            receiver,
        )
    }

    /// Publishes a fresh snapshot of the healthy block list. Called after
    /// every C6/C7 mutation completes, never mid-mutation.
    pub fn publish(&self, block_ids: Vec<BlockId>) {
        // A dropped receiver just means nobody is currently subscribed to
        // list-and-watch; that's not a publish failure worth surfacing.
        let _ = self.sender.send(block_ids);
    }

    /// Echoes the orchestrator-chosen block ids into the single
    /// environment variable a container will see.
    pub fn resolve_allocation(&self, block_ids: &[BlockId]) -> HashMap<String, String> {
        let joined = block_ids
            .iter()
            .map(BlockId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        HashMap::from([(self.allocation_env_var.clone(), joined)])
    }
}
