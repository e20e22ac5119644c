use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::latency::{Bucket, LatencyRecorder};
use crate::report::{BucketStats, Report};
use crate::Operation;

/// Single consumer of completed operations.
///
/// Classifies each record into one of the four outcome buckets, tracks the
/// run's wall-clock span as min(issued) to max(completed), and in
/// closed-loop mode acks each operation's key back toward the generator so
/// the conflict tracker can release it. Produces the final `Report` once
/// the completion stream closes.
pub struct ResultAggregator {
    expected: usize,
    success_read: LatencyRecorder,
    success_write: LatencyRecorder,
    failure_read: LatencyRecorder,
    failure_write: LatencyRecorder,
    first_issued: Option<Instant>,
    last_completed: Option<Instant>,
}

impl ResultAggregator {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            success_read: LatencyRecorder::default(),
            success_write: LatencyRecorder::default(),
            failure_read: LatencyRecorder::default(),
            failure_write: LatencyRecorder::default(),
            first_issued: None,
            last_completed: None,
        }
    }

    /// Consumes completions until the channel closes. `acks` is present in
    /// closed-loop mode only; open-loop workers own disjoint keys and need
    /// no release signal.
    pub async fn run(
        mut self,
        mut completions: mpsc::Receiver<Operation>,
        acks: Option<mpsc::Sender<usize>>,
    ) -> Result<Report> {
        let mut seen = 0usize;
        while let Some(op) = completions.recv().await {
            self.observe(&op)?;
            seen += 1;
            if let Some(tx) = &acks {
                tx.send(op.key).await.map_err(|_| {
                    Error::ChannelClosed(
                        "ack receiver dropped while completions were pending".to_string(),
                    )
                })?;
            }
        }

        if seen < self.expected {
            return Err(Error::ChannelClosed(format!(
                "completion stream ended after {seen} of {} operations",
                self.expected
            )));
        }

        tracing::debug!(seen, "result aggregator finished");
        Ok(self.finish())
    }

    fn observe(&mut self, op: &Operation) -> Result<()> {
        let issued = op.issued_at.ok_or_else(|| {
            Error::InvariantViolation(format!(
                "completed operation on key {} has no issue timestamp",
                op.key
            ))
        })?;
        let completed = op.completed_at.ok_or_else(|| {
            Error::InvariantViolation(format!(
                "completed operation on key {} has no completion timestamp",
                op.key
            ))
        })?;

        if self.first_issued.map_or(true, |t| issued < t) {
            self.first_issued = Some(issued);
        }
        if self.last_completed.map_or(true, |t| completed > t) {
            self.last_completed = Some(completed);
        }

        let latency = completed.duration_since(issued);
        match Bucket::classify(op.kind, op.outcome) {
            Bucket::SuccessRead => self.success_read.record(latency),
            Bucket::SuccessWrite => self.success_write.record(latency),
            Bucket::FailureRead => self.failure_read.record(latency),
            Bucket::FailureWrite => self.failure_write.record(latency),
        }
        Ok(())
    }

    fn finish(self) -> Report {
        let runtime_secs = match (self.first_issued, self.last_completed) {
            (Some(start), Some(end)) => end.duration_since(start).as_secs_f64(),
            _ => 0.0,
        };
        let total = self.success_read.len()
            + self.success_write.len()
            + self.failure_read.len()
            + self.failure_write.len();
        let throughput_ops_sec = if runtime_secs > 0.0 {
            total as f64 / runtime_secs
        } else {
            0.0
        };

        Report {
            timestamp: Utc::now().to_rfc3339(),
            runtime_secs,
            throughput_ops_sec,
            success_read: BucketStats::from_recorder(&self.success_read),
            success_write: BucketStats::from_recorder(&self.success_write),
            failure_read: BucketStats::from_recorder(&self.failure_read),
            failure_write: BucketStats::from_recorder(&self.failure_write),
        }
    }
}
