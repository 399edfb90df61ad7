use std::collections::HashMap;

use crate::core::block::BlockId;
use crate::core::workload::WorkloadRecord;

/// Canonical mapping from workload name to its record. Workload names are
/// unique within the observed namespace.
#[derive(Debug, Default)]
pub struct WorkloadRegistry {
    workloads: HashMap<String, WorkloadRecord>,
}

impl WorkloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a workload's bound set and PID.
    pub fn upsert(&mut self, name: &str, bound: Vec<BlockId>, pid: Option<i32>) {
        let record = self
            .workloads
            .entry(name.to_string())
            .or_insert_with(|| WorkloadRecord::new(name));
        for id in bound {
            record.add_bound(id);
        }
        if pid.is_some() {
            record.pid = pid;
        }
    }

    pub fn append_swapped(&mut self, name: &str, id: BlockId) {
        if let Some(record) = self.workloads.get_mut(name) {
            record.move_to_swapped(id);
        }
    }

    /// Clears a workload's bound set, returning the ids that were bound.
    pub fn clear_bound(&mut self, name: &str) -> Vec<BlockId> {
        self.workloads
            .get_mut(name)
            .map(|r| r.clear_bound().into_iter().collect())
            .unwrap_or_default()
    }

    pub fn move_swapped_to_bound(&mut self, name: &str, id: &BlockId) -> bool {
        self.workloads
            .get_mut(name)
            .map(|r| r.move_swapped_to_bound(id))
            .unwrap_or(false)
    }

    pub fn delete(&mut self, name: &str) -> Option<WorkloadRecord> {
        self.workloads.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&WorkloadRecord> {
        self.workloads.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkloadRecord> {
        self.workloads.values()
    }

    /// Workloads ordered by descending bound-set size, ties broken by
    /// iteration order — the most-blocks-first victim selection policy
    /// used by the capacity controller's shrink path.
    pub fn by_descending_bound_size(&self) -> Vec<&WorkloadRecord> {
        let mut records: Vec<&WorkloadRecord> = self.workloads.values().collect();
        records.sort_by(|a, b| b.bound().len().cmp(&a.bound().len()));
        records
    }
}
