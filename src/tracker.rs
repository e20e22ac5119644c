use crate::error::{Error, Result};

/// Tracks which keys currently have an operation in flight.
///
/// Owned exclusively by the closed-loop work generator task: acquisition
/// happens when a key is selected for a new operation, release only when the
/// aggregator's completion ack for that key arrives. Because a single task
/// performs both mutations, no locking is involved.
#[derive(Debug)]
pub struct KeyConflictTracker {
    in_flight: Vec<bool>,
    outstanding: usize,
}

impl KeyConflictTracker {
    pub fn new(key_space_size: usize) -> Self {
        Self {
            in_flight: vec![false; key_space_size],
            outstanding: 0,
        }
    }

    /// Marks the key in flight and returns true iff it was free.
    pub fn try_acquire(&mut self, key: usize) -> bool {
        match self.in_flight.get_mut(key) {
            Some(slot) if !*slot => {
                *slot = true;
                self.outstanding += 1;
                true
            }
            _ => false,
        }
    }

    /// Marks the key free again.
    ///
    /// Releasing a key that is not in flight is a coordination bug, not a
    /// runtime condition, and aborts the run.
    pub fn release(&mut self, key: usize) -> Result<()> {
        match self.in_flight.get_mut(key) {
            Some(slot) if *slot => {
                *slot = false;
                self.outstanding -= 1;
                Ok(())
            }
            Some(_) => Err(Error::InvariantViolation(format!(
                "release of key {key} that is not in flight"
            ))),
            None => Err(Error::InvariantViolation(format!(
                "release of key {key} outside the key space ({} keys)",
                self.in_flight.len()
            ))),
        }
    }

    /// Number of keys currently in flight.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}
