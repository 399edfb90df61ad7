use std::process::Stdio;

use tokio::process::Command;

use crate::core::error::MigrationError;

/// C8: moves a workload's physical pages between NUMA nodes (or to/from
/// the fallback tier). Stateless; idempotent only insofar as the
/// underlying `migratepages` tool is.
#[async_trait::async_trait]
pub trait MigrationEffector: Send + Sync {
    async fn migrate(
        &self,
        workload: &str,
        pid: i32,
        src_node: u32,
        dst_node: u32,
    ) -> Result<(), MigrationError>;
}

/// Production adapter: invokes the host's `migratepages` tool, capturing
/// combined stdout/stderr and mapping a non-zero exit to a typed error.
pub struct MigratepagesEffector {
    binary: String,
}

impl MigratepagesEffector {
    pub fn new() -> Self {
        Self {
            binary: "migratepages".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for MigratepagesEffector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MigrationEffector for MigratepagesEffector {
    async fn migrate(
        &self,
        workload: &str,
        pid: i32,
        src_node: u32,
        dst_node: u32,
    ) -> Result<(), MigrationError> {
        let output = Command::new(&self.binary)
            .arg(pid.to_string())
            .arg(src_node.to_string())
            .arg(dst_node.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| MigrationError::Spawn {
                workload: workload.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            Err(MigrationError::ToolFailed {
                workload: workload.to_string(),
                pid,
                status: output.status.code(),
                output: combined,
            })
        }
    }
}
