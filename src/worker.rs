use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::backend::BackendConnection;
use crate::error::{Error, Result};
use crate::keyspace::KeySpace;
use crate::{OpKind, Operation, Outcome};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random payload for a write, `len` letters long.
pub(crate) fn random_letters<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

/// One pool slot: owns a backend connection, executes one operation at a
/// time, and forwards the completed record.
///
/// A backend failure becomes `Outcome::Failure` on the operation and is
/// forwarded like any other result; it never stops the worker or the run.
pub struct Worker {
    id: usize,
    conn: Box<dyn BackendConnection>,
    keys: KeySpace,
    value_size: usize,
    op_timeout: Duration,
    rng: StdRng,
}

impl Worker {
    pub fn new(
        id: usize,
        conn: Box<dyn BackendConnection>,
        keys: KeySpace,
        value_size: usize,
        op_timeout: Duration,
    ) -> Self {
        Self {
            id,
            conn,
            keys,
            value_size,
            op_timeout,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Closed-loop service loop: pull one operation at a time from the
    /// shared dispatch queue until it closes.
    pub async fn run(
        mut self,
        dispatch: Arc<Mutex<mpsc::Receiver<Operation>>>,
        completions: mpsc::Sender<Operation>,
    ) -> Result<()> {
        loop {
            let next = {
                let mut rx = dispatch.lock().await;
                rx.recv().await
            };
            let Some(op) = next else {
                break;
            };
            let op = self.execute(op).await;
            completions.send(op).await.map_err(|_| {
                Error::ChannelClosed(format!(
                    "completion channel closed while worker {} was running",
                    self.id
                ))
            })?;
        }
        tracing::debug!(worker = self.id, "worker exit");
        Ok(())
    }

    /// Open-loop service loop: a fixed key this worker owns exclusively and
    /// a fixed operation count, generated locally. `ReadWrite` interleaves a
    /// write after every read; read-only issues reads throughout.
    pub async fn run_independent(
        mut self,
        key: usize,
        num_ops: usize,
        read_only: bool,
        completions: mpsc::Sender<Operation>,
    ) -> Result<()> {
        let mut write_next = false;
        for _ in 0..num_ops {
            let kind = if write_next { OpKind::Write } else { OpKind::Read };
            write_next = !read_only && !write_next;

            let op = self.execute(Operation::new(key, kind)).await;
            completions.send(op).await.map_err(|_| {
                Error::ChannelClosed(format!(
                    "completion channel closed while worker {} was running",
                    self.id
                ))
            })?;
        }
        tracing::debug!(worker = self.id, key, num_ops, "independent worker exit");
        Ok(())
    }

    /// Runs one backend call, stamping timestamps immediately around it.
    /// A call that outlives the timeout is classified as a failure, not a
    /// hang.
    async fn execute(&mut self, mut op: Operation) -> Operation {
        let name = self.keys.name(op.key);

        op.issued_at = Some(Instant::now());
        let result = match op.kind {
            OpKind::Read => match timeout(self.op_timeout, self.conn.get(&name)).await {
                Ok(Ok(_value)) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::Backend(format!(
                    "get {name} timed out after {:?}",
                    self.op_timeout
                ))),
            },
            OpKind::Write => {
                let value = random_letters(&mut self.rng, self.value_size);
                match timeout(self.op_timeout, self.conn.set(&name, &value)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::Backend(format!(
                        "set {name} timed out after {:?}",
                        self.op_timeout
                    ))),
                }
            }
        };
        op.completed_at = Some(Instant::now());

        op.outcome = match result {
            Ok(()) => Outcome::Success,
            Err(e) => {
                tracing::debug!(worker = self.id, key = op.key, error = %e, "backend call failed");
                Outcome::Failure
            }
        };
        op
    }
}
