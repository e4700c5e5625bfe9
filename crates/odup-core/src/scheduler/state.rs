//! Pool bookkeeping: pending FIFO, active count and finished results.

use std::collections::VecDeque;

use crate::discover::FileDescriptor;
use crate::render::RenderCounts;
use crate::session::UploadedItem;
use crate::uploader::UploadOutcome;

/// A file the pool gave up on, with the reason.
#[derive(Debug, Clone)]
pub struct AbandonedFile {
    pub file: FileDescriptor,
    pub reason: String,
}

/// Everything the pool produced, returned by `PoolHandle::join`.
#[derive(Debug, Clone, Default)]
pub struct PoolSummary {
    pub completed: Vec<UploadedItem>,
    pub abandoned: Vec<AbandonedFile>,
}

impl PoolSummary {
    pub fn all_succeeded(&self) -> bool {
        self.abandoned.is_empty()
    }
}

/// Point-in-time counters of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub total: usize,
    pub active: usize,
    pub pending: usize,
    pub completed: usize,
    pub abandoned: usize,
}

impl From<PoolSnapshot> for RenderCounts {
    fn from(s: PoolSnapshot) -> Self {
        RenderCounts {
            total: s.total,
            running: s.active,
            pending: s.pending,
        }
    }
}

/// Mutable pool state. Owned by the scheduler behind a mutex; every method
/// keeps `active <= max_concurrent`.
#[derive(Debug)]
pub struct PoolState {
    total_files: usize,
    max_concurrent: usize,
    pending: VecDeque<FileDescriptor>,
    active: usize,
    summary: PoolSummary,
}

impl PoolState {
    pub fn new(files: Vec<FileDescriptor>, max_concurrent: usize) -> Self {
        Self {
            total_files: files.len(),
            max_concurrent: max_concurrent.max(1),
            pending: files.into(),
            active: 0,
            summary: PoolSummary::default(),
        }
    }

    /// Take the next pending file if a slot is free.
    pub fn claim(&mut self) -> Option<FileDescriptor> {
        if self.active >= self.max_concurrent {
            return None;
        }
        let file = self.pending.pop_front()?;
        self.active += 1;
        Some(file)
    }

    /// Claim files until the pool is full or the queue is empty.
    pub fn claim_initial(&mut self) -> Vec<FileDescriptor> {
        std::iter::from_fn(|| self.claim()).collect()
    }

    /// Record a finished upload, free its slot and hand back the next file for
    /// the same worker, all in one step so observers never see a half-refilled pool.
    pub fn finish_and_claim(
        &mut self,
        file: FileDescriptor,
        outcome: UploadOutcome,
    ) -> Option<FileDescriptor> {
        self.active = self.active.saturating_sub(1);
        match outcome {
            UploadOutcome::Completed(item) => self.summary.completed.push(item),
            UploadOutcome::Abandoned(e) => self.summary.abandoned.push(AbandonedFile {
                file,
                reason: e.to_string(),
            }),
        }
        self.claim()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            total: self.total_files,
            active: self.active,
            pending: self.pending.len(),
            completed: self.summary.completed.len(),
            abandoned: self.summary.abandoned.len(),
        }
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.active == 0
    }

    pub fn take_summary(&mut self) -> PoolSummary {
        std::mem::take(&mut self.summary)
    }
}
