use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How load is driven against the backend.
///
/// `ClosedLoop` keeps a bounded number of operations in flight and reuses a
/// completed operation's slot for the next one until the quota is reached.
/// The open-loop modes give every worker its own key and a fixed local
/// operation count, with no coordination between workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    ClosedLoop,
    OpenLoopReadWrite,
    OpenLoopReadOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub mode: Mode,
    /// Number of distinct keys; fixed for the lifetime of a run.
    pub key_space_size: usize,
    /// Probability that a generated operation is a read, in [0, 1].
    pub read_fraction: f64,
    /// Total operations to issue in closed-loop mode.
    pub op_quota: usize,
    /// Operations each independent worker issues in open-loop modes.
    pub ops_per_worker: usize,
    /// Number of workers; each owns one backend connection.
    pub pool_size: usize,
    /// Prefix joined with the key index to form the backend-visible name.
    pub key_prefix: String,
    /// Length of the random payload written by Set operations.
    pub value_size: usize,
    /// Upper bound on a single backend call before it counts as a failure.
    pub op_timeout_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: Mode::ClosedLoop,
            key_space_size: 50,
            read_fraction: 0.8,
            op_quota: 5000,
            ops_per_worker: 1000,
            pool_size: 5,
            key_prefix: "key:".to_string(),
            value_size: 50,
            op_timeout_ms: 10_000,
        }
    }
}

impl HarnessConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Operations the aggregator must account for before a run can finish.
    pub fn expected_ops(&self) -> usize {
        match self.mode {
            Mode::ClosedLoop => self.op_quota,
            Mode::OpenLoopReadWrite | Mode::OpenLoopReadOnly => {
                self.ops_per_worker * self.pool_size
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.read_fraction) {
            return Err(Error::Config(format!(
                "read_fraction must be in [0, 1], got {}",
                self.read_fraction
            )));
        }
        if self.value_size == 0 {
            return Err(Error::Config("value_size must be at least 1".to_string()));
        }
        match self.mode {
            // Free-key search only terminates when more keys exist than can
            // ever be in flight at once.
            Mode::ClosedLoop => {
                if self.key_space_size <= self.pool_size {
                    return Err(Error::Config(format!(
                        "key_space_size ({}) must exceed pool_size ({}) in closed-loop mode",
                        self.key_space_size, self.pool_size
                    )));
                }
            }
            // Each worker owns one distinct key.
            Mode::OpenLoopReadWrite | Mode::OpenLoopReadOnly => {
                if self.key_space_size < self.pool_size {
                    return Err(Error::Config(format!(
                        "key_space_size ({}) must be at least pool_size ({}) in open-loop modes",
                        self.key_space_size, self.pool_size
                    )));
                }
            }
        }
        Ok(())
    }
}
