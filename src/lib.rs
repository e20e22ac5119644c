pub mod aggregator;
pub mod backend;
pub mod config;
pub mod error;
pub mod generator;
pub mod harness;
pub mod keyspace;
pub mod latency;
pub mod report;
pub mod tracker;
pub mod worker;

pub use backend::{BackendConnection, BackendFactory, MemoryBackend};
pub use config::{HarnessConfig, Mode};
pub use error::{Error, Result};
pub use harness::Harness;
pub use report::{BucketStats, Report};

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Success,
    Failure,
}

/// A single key-addressed operation traveling through the pipeline.
///
/// Created by a generator with timestamps unset, stamped and classified by
/// the worker that executes it, then consumed read-only by the aggregator.
#[derive(Debug, Clone)]
pub struct Operation {
    pub key: usize,
    pub kind: OpKind,
    pub issued_at: Option<Instant>,
    pub completed_at: Option<Instant>,
    pub outcome: Outcome,
}

impl Operation {
    pub fn new(key: usize, kind: OpKind) -> Self {
        Self {
            key,
            kind,
            issued_at: None,
            completed_at: None,
            outcome: Outcome::Pending,
        }
    }

    /// Observed service time, available once a worker has stamped both ends.
    pub fn latency(&self) -> Option<Duration> {
        match (self.issued_at, self.completed_at) {
            (Some(issued), Some(completed)) => Some(completed.duration_since(issued)),
            _ => None,
        }
    }
}
