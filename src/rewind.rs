//! # Rewind Stack
//!
//! Every state-changing debugger action first pushes a [`Snapshot`] of the
//! whole machine tagged with a short message ("step", "patch ROM", ...).
//! Popping one restores the machine to exactly that point.
//!
//! The stack is bounded: once [`RewindConfig::capacity`] snapshots are held,
//! pushing drops the oldest one.

use std::collections::VecDeque;

use log::{debug, info};
use thiserror::Error;

use crate::serializer::StateError;
use crate::{state, System};

/// Rewind stack settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewindConfig {
    /// Maximum number of snapshots kept. 0 disables capture.
    pub capacity: usize,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewindError {
    #[error("no earlier state to rewind to")]
    Empty,

    #[error("could not capture machine state: {0}")]
    Capture(StateError),

    #[error("could not restore machine state: {0}")]
    Restore(StateError),
}

/// One captured machine state. Immutable once created.
#[derive(Debug)]
pub struct Snapshot {
    data: Vec<u8>,
    message: String,
}

impl Snapshot {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Most-recent-first stack of machine snapshots.
#[derive(Debug)]
pub struct RewindManager {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl RewindManager {
    pub fn new(config: RewindConfig) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(config.capacity.min(128)),
            capacity: config.capacity,
        }
    }

    /// Capture `system` and push it with `message`.
    ///
    /// If capture fails the stack is left unchanged.
    pub fn add_state(&mut self, system: &System, message: &str) -> Result<(), RewindError> {
        if let Some(snapshot) = self.capture(system, message)? {
            self.push(snapshot);
        }
        Ok(())
    }

    /// Capture `system` without pushing it. `None` when capture is disabled.
    ///
    /// Lets a caller take the snapshot before an action and decide afterwards
    /// whether the action changed anything worth undoing.
    pub fn capture(
        &self,
        system: &System,
        message: &str,
    ) -> Result<Option<Snapshot>, RewindError> {
        if self.capacity == 0 {
            return Ok(None);
        }
        let data = state::capture(system).map_err(RewindError::Capture)?;
        Ok(Some(Snapshot {
            data,
            message: message.to_string(),
        }))
    }

    /// Push a snapshot taken with [`RewindManager::capture`], dropping the
    /// oldest one when full.
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.snapshots.len() == self.capacity {
            if let Some(oldest) = self.snapshots.pop_back() {
                debug!("rewind stack full, dropping '{}'", oldest.message);
            }
        }
        debug!(
            "saved state for '{}' ({} bytes)",
            snapshot.message,
            snapshot.data.len()
        );
        self.snapshots.push_front(snapshot);
    }

    /// Pop the most recent snapshot and restore it into `system`, returning its
    /// message.
    ///
    /// If the restore fails the snapshot is put back and `system` is untouched.
    pub fn rewind_state(&mut self, system: &mut System) -> Result<String, RewindError> {
        let snapshot = self.snapshots.pop_front().ok_or(RewindError::Empty)?;
        if let Err(err) = state::restore(system, &snapshot.data) {
            self.snapshots.push_front(snapshot);
            return Err(RewindError::Restore(err));
        }
        info!("rewind: {}", snapshot.message);
        Ok(snapshot.message)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages of the held snapshots, most recent first.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.snapshots.iter().map(|s| s.message.as_str())
    }

    /// The snapshot the next rewind would restore.
    pub fn peek(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }
}

impl Default for RewindManager {
    fn default() -> Self {
        Self::new(RewindConfig::default())
    }
}
