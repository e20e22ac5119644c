use std::time::Duration;

use crate::{OpKind, Outcome};

/// One of the four outcome buckets a completed operation lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    SuccessRead,
    SuccessWrite,
    FailureRead,
    FailureWrite,
}

impl Bucket {
    /// Classifies a completed operation. Anything other than an explicit
    /// success counts toward the failure bucket of its kind.
    pub fn classify(kind: OpKind, outcome: Outcome) -> Bucket {
        match (kind, outcome) {
            (OpKind::Read, Outcome::Success) => Bucket::SuccessRead,
            (OpKind::Write, Outcome::Success) => Bucket::SuccessWrite,
            (OpKind::Read, _) => Bucket::FailureRead,
            (OpKind::Write, _) => Bucket::FailureWrite,
        }
    }
}

/// Append-only latency samples for one bucket, kept in completion order.
///
/// Completion order is not latency order, so percentile queries sort a copy
/// of the samples before indexing.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    samples: Vec<Duration>,
}

impl LatencyRecorder {
    pub fn record(&mut self, latency: Duration) {
        self.samples.push(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean latency in microseconds; 0 for an empty bucket by definition.
    pub fn mean_us(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total_ns: f64 = self.samples.iter().map(|d| d.as_nanos() as f64).sum();
        total_ns / 1000.0 / self.samples.len() as f64
    }

    /// Latency at percentile rank `p` in microseconds, defined as the sorted
    /// sample at index `floor(p * n)`; 0 for an empty bucket by definition.
    pub fn percentile_us(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<u128> = self.samples.iter().map(|d| d.as_nanos()).collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
        sorted[idx] as f64 / 1000.0
    }

    pub fn p95_us(&self) -> f64 {
        self.percentile_us(0.95)
    }
}
