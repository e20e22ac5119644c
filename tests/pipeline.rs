//! End-to-end runs of the full generator / pool / aggregator pipeline
//! against in-process backends.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration};

use kvstorm::{
    BackendConnection, BackendFactory, Error, Harness, HarnessConfig, MemoryBackend, Mode, Result,
};

fn closed_loop_config(op_quota: usize) -> HarnessConfig {
    HarnessConfig {
        mode: Mode::ClosedLoop,
        key_space_size: 50,
        pool_size: 5,
        op_quota,
        read_fraction: 0.8,
        ..Default::default()
    }
}

#[tokio::test]
async fn closed_loop_accounts_for_every_operation() {
    let harness = Harness::new(closed_loop_config(500), MemoryBackend::new()).unwrap();
    harness.prefill().await.unwrap();

    let report = harness.run().await.unwrap();
    assert_eq!(report.total_operations(), 500);
    assert_eq!(report.failure_read.operations, 0);
    assert_eq!(report.failure_write.operations, 0);

    // With read_fraction 0.8 the read share is binomial around 400; five
    // standard deviations is about 45.
    let reads = report.success_read.operations;
    assert!((355..=445).contains(&reads), "read count {reads} out of range");
}

#[tokio::test]
async fn zero_quota_produces_an_empty_report() {
    let harness = Harness::new(closed_loop_config(0), MemoryBackend::new()).unwrap();
    let report = harness.run().await.unwrap();
    assert_eq!(report.total_operations(), 0);
    assert_eq!(report.runtime_secs, 0.0);
    assert_eq!(report.throughput_ops_sec, 0.0);
}

#[tokio::test]
async fn open_loop_read_only_issues_reads_per_worker() {
    let config = HarnessConfig {
        mode: Mode::OpenLoopReadOnly,
        key_space_size: 4,
        pool_size: 4,
        ops_per_worker: 100,
        ..Default::default()
    };
    let harness = Harness::new(config, MemoryBackend::new()).unwrap();
    harness.prefill().await.unwrap();

    let report = harness.run().await.unwrap();
    assert_eq!(report.success_read.operations, 400);
    assert_eq!(report.success_write.operations, 0);
    assert_eq!(report.failure_read.operations, 0);
    assert_eq!(report.failure_write.operations, 0);
}

/// Connection whose every third call fails, counted per connection.
struct FlakyConnection {
    calls: usize,
}

#[async_trait]
impl BackendConnection for FlakyConnection {
    async fn get(&mut self, _key: &str) -> Result<String> {
        self.calls += 1;
        if self.calls % 3 == 0 {
            Err(Error::Backend("injected read failure".to_string()))
        } else {
            Ok("value".to_string())
        }
    }

    async fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
        self.calls += 1;
        if self.calls % 3 == 0 {
            Err(Error::Backend("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

struct FlakyBackend;

#[async_trait]
impl BackendFactory for FlakyBackend {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>> {
        Ok(Box::new(FlakyConnection { calls: 0 }))
    }
}

// One open-loop worker alternates read, write, read, write. Failing every
// third call then lands on reads at odd multiples of three and writes at
// even ones, so over 600 calls each kind fails exactly 100 times.
#[tokio::test]
async fn failures_are_recorded_not_fatal() {
    let config = HarnessConfig {
        mode: Mode::OpenLoopReadWrite,
        key_space_size: 1,
        pool_size: 1,
        ops_per_worker: 600,
        ..Default::default()
    };
    let harness = Harness::new(config, FlakyBackend).unwrap();

    let report = harness.run().await.unwrap();
    assert_eq!(report.success_read.operations, 200);
    assert_eq!(report.success_write.operations, 200);
    assert_eq!(report.failure_read.operations, 100);
    assert_eq!(report.failure_write.operations, 100);
}

struct AlwaysFailConnection;

#[async_trait]
impl BackendConnection for AlwaysFailConnection {
    async fn get(&mut self, key: &str) -> Result<String> {
        Err(Error::Backend(format!("unreachable backend: get {key}")))
    }

    async fn set(&mut self, key: &str, _value: &str) -> Result<()> {
        Err(Error::Backend(format!("unreachable backend: set {key}")))
    }
}

struct AlwaysFailBackend;

#[async_trait]
impl BackendFactory for AlwaysFailBackend {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>> {
        Ok(Box::new(AlwaysFailConnection))
    }
}

#[tokio::test]
async fn all_failures_still_complete_the_run() {
    let harness = Harness::new(closed_loop_config(300), AlwaysFailBackend).unwrap();
    let report = harness.run().await.unwrap();

    assert_eq!(report.success_read.operations, 0);
    assert_eq!(report.success_write.operations, 0);
    assert_eq!(
        report.failure_read.operations + report.failure_write.operations,
        300
    );
}

/// Backend that asserts no key is ever touched by two calls at once.
#[derive(Clone, Default)]
struct ConflictProbe {
    active: Arc<Mutex<HashSet<String>>>,
    violations: Arc<AtomicUsize>,
}

struct ProbeConnection {
    probe: ConflictProbe,
}

impl ProbeConnection {
    async fn touch(&self, key: &str) {
        let inserted = self.probe.active.lock().insert(key.to_string());
        if !inserted {
            self.probe.violations.fetch_add(1, Ordering::SeqCst);
        }
        // Hold the key long enough for an overlapping call to collide.
        sleep(Duration::from_millis(1)).await;
        self.probe.active.lock().remove(key);
    }
}

#[async_trait]
impl BackendConnection for ProbeConnection {
    async fn get(&mut self, key: &str) -> Result<String> {
        self.touch(key).await;
        Ok("value".to_string())
    }

    async fn set(&mut self, key: &str, _value: &str) -> Result<()> {
        self.touch(key).await;
        Ok(())
    }
}

#[async_trait]
impl BackendFactory for ConflictProbe {
    async fn connect(&self) -> Result<Box<dyn BackendConnection>> {
        Ok(Box::new(ProbeConnection {
            probe: self.clone(),
        }))
    }
}

// Releases lag completions through the buffered pipeline channels, so at
// the key_space_size = pool_size + 1 boundary every key can be held at
// once; the run must wait for completions there, not abort.
#[tokio::test]
async fn boundary_keyspace_sustains_a_long_run() {
    let config = HarnessConfig {
        mode: Mode::ClosedLoop,
        key_space_size: 6,
        pool_size: 5,
        op_quota: 5000,
        ..Default::default()
    };
    let harness = Harness::new(config, MemoryBackend::new()).unwrap();
    harness.prefill().await.unwrap();

    let report = harness.run().await.unwrap();
    assert_eq!(report.total_operations(), 5000);
    assert_eq!(
        report.failure_read.operations + report.failure_write.operations,
        0
    );
}

// Tight key space relative to the pool maximizes contention pressure on
// the conflict tracker.
#[tokio::test]
async fn closed_loop_never_overlaps_operations_on_a_key() {
    let probe = ConflictProbe::default();
    let config = HarnessConfig {
        mode: Mode::ClosedLoop,
        key_space_size: 6,
        pool_size: 5,
        op_quota: 400,
        ..Default::default()
    };
    let harness = Harness::new(config, probe.clone()).unwrap();

    let report = harness.run().await.unwrap();
    assert_eq!(report.total_operations(), 400);
    assert_eq!(probe.violations.load(Ordering::SeqCst), 0);
}
