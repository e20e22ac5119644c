use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::aggregator::ResultAggregator;
use crate::backend::BackendFactory;
use crate::config::{HarnessConfig, Mode};
use crate::error::{Error, Result};
use crate::generator::WorkGenerator;
use crate::keyspace::KeySpace;
use crate::report::Report;
use crate::worker::{random_letters, Worker};
use crate::Operation;

/// Owns one full measurement run: builds the worker pool against the
/// backend, wires the pipeline channels, and drives it to a `Report`.
pub struct Harness<F: BackendFactory> {
    config: HarnessConfig,
    factory: F,
}

impl<F: BackendFactory> Harness<F> {
    pub fn new(config: HarnessConfig, factory: F) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, factory })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Writes an initial value to every key so reads during the run find
    /// data. Uses a single connection; prefill time is not measured.
    pub async fn prefill(&self) -> Result<()> {
        let keys = self.keyspace();
        let mut conn = self.factory.connect().await?;
        let mut rng = StdRng::from_os_rng();
        for key in 0..keys.size() {
            let value = random_letters(&mut rng, self.config.value_size);
            conn.set(&keys.name(key), &value).await?;
        }
        tracing::info!(keys = keys.size(), "prefill complete");
        Ok(())
    }

    /// Executes the configured run and returns its report.
    pub async fn run(&self) -> Result<Report> {
        tracing::info!(
            mode = ?self.config.mode,
            pool_size = self.config.pool_size,
            expected_ops = self.config.expected_ops(),
            "starting run"
        );
        let report = match self.config.mode {
            Mode::ClosedLoop => self.run_closed_loop().await?,
            Mode::OpenLoopReadWrite => self.run_open_loop(false).await?,
            Mode::OpenLoopReadOnly => self.run_open_loop(true).await?,
        };
        tracing::info!(
            operations = report.total_operations(),
            runtime_secs = report.runtime_secs,
            "run finished"
        );
        Ok(report)
    }

    fn keyspace(&self) -> KeySpace {
        KeySpace::new(&self.config.key_prefix, self.config.key_space_size)
    }

    async fn spawn_pool(
        &self,
    ) -> Result<(Vec<Worker>, mpsc::Sender<Operation>, mpsc::Receiver<Operation>)> {
        let mut workers = Vec::with_capacity(self.config.pool_size);
        for id in 0..self.config.pool_size {
            let conn = self.factory.connect().await?;
            workers.push(Worker::new(
                id,
                conn,
                self.keyspace(),
                self.config.value_size,
                self.config.op_timeout(),
            ));
        }
        let (completion_tx, completion_rx) = mpsc::channel(self.config.pool_size);
        Ok((workers, completion_tx, completion_rx))
    }

    async fn run_closed_loop(&self) -> Result<Report> {
        let (workers, completion_tx, completion_rx) = self.spawn_pool().await?;

        // A dispatch slot doubles as the generator's in-flight permit, so
        // its capacity stays at one.
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1);
        let (ack_tx, ack_rx) = mpsc::channel(self.config.pool_size);
        let dispatch_rx = Arc::new(Mutex::new(dispatch_rx));

        let generator = WorkGenerator::new(
            self.keyspace(),
            self.config.op_quota,
            self.config.read_fraction,
        );
        let generator_task = tokio::spawn(generator.run(dispatch_tx, ack_rx));

        let aggregator = ResultAggregator::new(self.config.expected_ops());
        let aggregator_task = tokio::spawn(aggregator.run(completion_rx, Some(ack_tx)));

        let worker_tasks: Vec<_> = workers
            .into_iter()
            .map(|worker| {
                tokio::spawn(worker.run(Arc::clone(&dispatch_rx), completion_tx.clone()))
            })
            .collect();
        // Workers hold the only remaining completion senders; the channel
        // closes once the last of them exits.
        drop(completion_tx);

        join_pool(worker_tasks).await?;
        join(generator_task).await?;
        join(aggregator_task).await
    }

    async fn run_open_loop(&self, read_only: bool) -> Result<Report> {
        let (workers, completion_tx, completion_rx) = self.spawn_pool().await?;

        let aggregator = ResultAggregator::new(self.config.expected_ops());
        let aggregator_task = tokio::spawn(aggregator.run(completion_rx, None));

        let ops_per_worker = self.config.ops_per_worker;
        let worker_tasks: Vec<_> = workers
            .into_iter()
            .enumerate()
            .map(|(key, worker)| {
                tokio::spawn(worker.run_independent(
                    key,
                    ops_per_worker,
                    read_only,
                    completion_tx.clone(),
                ))
            })
            .collect();
        drop(completion_tx);

        join_pool(worker_tasks).await?;
        join(aggregator_task).await
    }
}

async fn join_pool(tasks: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    let results = futures::future::try_join_all(tasks)
        .await
        .map_err(|e| Error::Task(format!("pipeline task panicked or was cancelled: {e}")))?;
    results.into_iter().collect()
}

async fn join<T>(task: JoinHandle<Result<T>>) -> Result<T> {
    task.await
        .map_err(|e| Error::Task(format!("pipeline task panicked or was cancelled: {e}")))?
}
