use std::fmt;

use serde::Serialize;

use crate::latency::LatencyRecorder;

/// Count and latency summary for one outcome bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketStats {
    pub operations: usize,
    pub mean_latency_us: f64,
    pub p95_latency_us: f64,
}

impl BucketStats {
    pub(crate) fn from_recorder(recorder: &LatencyRecorder) -> Self {
        Self {
            operations: recorder.len(),
            mean_latency_us: recorder.mean_us(),
            p95_latency_us: recorder.p95_us(),
        }
    }
}

/// Immutable summary of a finished run.
///
/// Computed once at pipeline shutdown: wall-clock span from the first issue
/// timestamp to the last completion, per-bucket counts and latencies, and
/// overall throughput across all four buckets.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: String,
    pub runtime_secs: f64,
    pub throughput_ops_sec: f64,
    pub success_read: BucketStats,
    pub success_write: BucketStats,
    pub failure_read: BucketStats,
    pub failure_write: BucketStats,
}

impl Report {
    pub fn total_operations(&self) -> usize {
        self.success_read.operations
            + self.success_write.operations
            + self.failure_read.operations
            + self.failure_write.operations
    }
}

fn write_section(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    stats: &BucketStats,
) -> fmt::Result {
    if stats.operations == 0 {
        return Ok(());
    }
    writeln!(f, "[{label}], Operations, {}", stats.operations)?;
    writeln!(
        f,
        "[{label}], AverageLatency(us), {:.3}",
        stats.mean_latency_us
    )?;
    writeln!(
        f,
        "[{label}], 95thPercentileLatency(us), {:.3}",
        stats.p95_latency_us
    )
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[OVERALL], Timestamp, {}", self.timestamp)?;
        writeln!(f, "[OVERALL], RunTime(sec), {:.3}", self.runtime_secs)?;
        writeln!(
            f,
            "[OVERALL], Throughput(ops/sec), {:.3}",
            self.throughput_ops_sec
        )?;
        write_section(f, "READ", &self.success_read)?;
        write_section(f, "WRITE", &self.success_write)?;
        write_section(f, "READ-FAILED", &self.failure_read)?;
        write_section(f, "WRITE-FAILED", &self.failure_write)
    }
}
