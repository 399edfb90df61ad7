use std::collections::HashMap;

use tokio::io::AsyncReadExt;

use crate::core::error::ProbeError;
use crate::core::snapshot::{Probe, RawReadings};

/// C1 production implementation: reads `/sys/devices/system/node/node<N>/meminfo`
/// for each configured NUMA node and a single cgroup `memory.current` file
/// for the aggregate online-workload usage.
#[derive(Debug, Clone)]
pub struct SysfsProbe {
    numa_nodes: Vec<u32>,
    online_cgroup_path: String,
}

impl SysfsProbe {
    pub fn new(numa_nodes: Vec<u32>, online_cgroup_path: impl Into<String>) -> Self {
        Self {
            numa_nodes,
            online_cgroup_path: online_cgroup_path.into(),
        }
    }

    fn node_meminfo_path(node: u32) -> String {
        format!("/sys/devices/system/node/node{node}/meminfo")
    }

    async fn read_node_free_bytes(node: u32) -> Result<u64, ProbeError> {
        let path = Self::node_meminfo_path(node);
        let contents =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ProbeError::NumaMeminfo { node, source })?;
        parse_node_meminfo(node, &contents)
    }

    async fn read_online_used_bytes(&self) -> Result<u64, ProbeError> {
        let mut file = tokio::fs::File::open(&self.online_cgroup_path)
            .await
            .map_err(|source| ProbeError::CgroupUsage {
                path: self.online_cgroup_path.clone(),
                source,
            })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .map_err(|source| ProbeError::CgroupUsage {
                path: self.online_cgroup_path.clone(),
                source,
            })?;
        contents
            .trim()
            .parse::<u64>()
            .map_err(|_| ProbeError::CgroupUsageMalformed {
                path: self.online_cgroup_path.clone(),
            })
    }
}

/// Parses the subset of `node<N>/meminfo` fields we need. Lines look like:
/// `Node 0 MemTotal:       65986868 kB`
fn parse_node_meminfo(node: u32, contents: &str) -> Result<u64, ProbeError> {
    let mut fields: HashMap<&str, u64> = HashMap::new();
    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        let key = parts[2];
        if let Ok(kib) = parts[3].parse::<u64>() {
            fields.insert(key, kib * 1024);
        }
    }
    fields
        .get("MemFree:")
        .copied()
        .ok_or(ProbeError::NumaMeminfoMalformed {
            node,
            field: "MemFree:",
        })
}

#[async_trait::async_trait]
impl Probe for SysfsProbe {
    async fn snapshot(&self) -> Result<RawReadings, ProbeError> {
        let mut total_free_bytes = 0u64;
        for &node in &self.numa_nodes {
            total_free_bytes += Self::read_node_free_bytes(node).await?;
        }
        let online_used_bytes = self.read_online_used_bytes().await?;
        Ok(RawReadings {
            total_free_bytes,
            online_used_bytes,
        })
    }
}
