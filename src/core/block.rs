use std::fmt;
use std::time::SystemTime;

use ferroid::base32::Base32UlidExt;
use ferroid::id::ULID;
use serde::{Deserialize, Serialize};

/// 512 MiB, the fixed size of a colocation memory block.
pub const BLOCK_SIZE_BYTES: u64 = 512 * 1024 * 1024;

/// Opaque, globally unique block identifier. Never positional — a fresh id
/// is minted from a ULID generator on every block creation, so shrink/grow
/// cycles never recycle a name an orchestrator may still reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(String);

impl BlockId {
    /// Mints a fresh, time-ordered, globally unique block id.
    pub fn generate() -> Self {
        let ulid = ULID::from_datetime(SystemTime::now()).encode();
        Self(format!("colocmem-{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Healthy,
    Unhealthy,
}

/// A single colocation memory block. `used` and `bound_workload` must never
/// disagree — enforced by construction in [`crate::core::block_registry::BlockRegistry`]
/// rather than by an invariant check scattered across call sites.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub health: Health,
    bound_workload: Option<String>,
    pub last_touch: std::time::Instant,
}

impl Block {
    pub(crate) fn new_free(id: BlockId) -> Self {
        Self {
            id,
            health: Health::Healthy,
            bound_workload: None,
            last_touch: std::time::Instant::now(),
        }
    }

    pub fn is_used(&self) -> bool {
        self.bound_workload.is_some()
    }

    pub fn bound_workload(&self) -> Option<&str> {
        self.bound_workload.as_deref()
    }

    pub(crate) fn bind(&mut self, workload: impl Into<String>) {
        self.bound_workload = Some(workload.into());
        self.last_touch = std::time::Instant::now();
    }

    pub(crate) fn unbind(&mut self) {
        self.bound_workload = None;
        self.last_touch = std::time::Instant::now();
    }
}
