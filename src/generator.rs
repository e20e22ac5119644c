use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::keyspace::KeySpace;
use crate::tracker::KeyConflictTracker;
use crate::{OpKind, Operation};

/// Upper bound on free-key draws per operation, a backstop against
/// misconfiguration. Key selection drains queued acks and waits out a
/// fully held key space, so a free key is otherwise always reachable.
const ACQUIRE_RETRY_BUDGET: usize = 1 << 16;

/// Closed-loop work generator.
///
/// Issues exactly `op_quota` operations, never two in flight on the same
/// key, and closes its output only after every issued operation has also
/// completed. It owns the conflict tracker outright: acquisition happens at
/// key selection, release when the aggregator's ack for that key arrives.
pub struct WorkGenerator {
    keys: KeySpace,
    tracker: KeyConflictTracker,
    op_quota: usize,
    read_fraction: f64,
    rng: StdRng,
}

impl WorkGenerator {
    pub fn new(keys: KeySpace, op_quota: usize, read_fraction: f64) -> Self {
        let tracker = KeyConflictTracker::new(keys.size());
        Self {
            keys,
            tracker,
            op_quota,
            read_fraction,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Drives the loop until the quota is issued and completed, then closes
    /// the dispatch channel.
    ///
    /// While work remains, a `select!` races draining one completion ack
    /// against reserving a dispatch slot; whichever is ready first wins, with
    /// no fairness guarantee between the two. A key is only drawn once a
    /// dispatch slot is held. Releases lag completions through the buffered
    /// completion and ack channels, so key selection drains queued acks
    /// itself and waits for one whenever every key is still held.
    pub async fn run(
        mut self,
        dispatch: mpsc::Sender<Operation>,
        mut acks: mpsc::Receiver<usize>,
    ) -> Result<()> {
        let mut issued = 0usize;
        let mut completed = 0usize;

        while issued < self.op_quota {
            tokio::select! {
                ack = acks.recv() => {
                    let key = ack.ok_or_else(|| {
                        Error::ChannelClosed(format!(
                            "ack stream ended after {completed} of {} completions",
                            self.op_quota
                        ))
                    })?;
                    self.tracker.release(key)?;
                    completed += 1;
                }
                permit = dispatch.reserve() => {
                    let permit = permit.map_err(|_| {
                        Error::ChannelClosed(
                            "dispatch channel closed while work remains".to_string(),
                        )
                    })?;
                    let op = self.next_op(&mut acks, &mut completed).await?;
                    permit.send(op);
                    issued += 1;
                }
            }
        }

        // Quota issued: stop offering work and drain the remaining acks.
        drop(dispatch);
        while completed < self.op_quota {
            let key = acks.recv().await.ok_or_else(|| {
                Error::ChannelClosed(format!(
                    "ack stream ended after {completed} of {} completions",
                    self.op_quota
                ))
            })?;
            self.tracker.release(key)?;
            completed += 1;
        }

        tracing::debug!(issued, completed, "work generator finished");
        Ok(())
    }

    /// Selects a free key by rejection sampling and draws the operation kind.
    ///
    /// Queued acks are released before every draw so keys whose completions
    /// have already arrived are selectable again; when every key is held the
    /// only way forward is to wait for one more completion.
    async fn next_op(
        &mut self,
        acks: &mut mpsc::Receiver<usize>,
        completed: &mut usize,
    ) -> Result<Operation> {
        let mut attempts = 0usize;
        let key = loop {
            while let Ok(key) = acks.try_recv() {
                self.tracker.release(key)?;
                *completed += 1;
            }
            if self.tracker.outstanding() == self.keys.size() {
                let key = acks.recv().await.ok_or_else(|| {
                    Error::ChannelClosed(format!(
                        "ack stream ended after {completed} of {} completions",
                        self.op_quota
                    ))
                })?;
                self.tracker.release(key)?;
                *completed += 1;
            }
            let candidate = self.keys.draw(&mut self.rng);
            if self.tracker.try_acquire(candidate) {
                break candidate;
            }
            attempts += 1;
            if attempts >= ACQUIRE_RETRY_BUDGET {
                return Err(Error::InvariantViolation(format!(
                    "no free key after {attempts} draws over {} keys with {} held",
                    self.keys.size(),
                    self.tracker.outstanding()
                )));
            }
        };

        let kind = if self.rng.random_bool(self.read_fraction) {
            OpKind::Read
        } else {
            OpKind::Write
        };
        Ok(Operation::new(key, kind))
    }
}
