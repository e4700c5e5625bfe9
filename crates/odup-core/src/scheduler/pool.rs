//! Worker tasks that drain the pending queue through the uploader.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::discover::FileDescriptor;
use crate::session::UploadSession;
use crate::uploader::RetryingUploader;

use super::state::{PoolSnapshot, PoolState, PoolSummary};

/// Running pool. Dropping it detaches the workers; call [`join`](Self::join)
/// to wait for the queue to drain.
pub struct PoolHandle {
    state: Arc<Mutex<PoolState>>,
    workers: tokio::task::JoinSet<()>,
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

impl PoolHandle {
    pub fn snapshot(&self) -> PoolSnapshot {
        lock(&self.state).snapshot()
    }

    /// Wait until the pending queue is empty and no upload is active.
    pub async fn join(mut self) -> Result<PoolSummary> {
        while let Some(res) = self.workers.join_next().await {
            res.map_err(|e| anyhow::anyhow!("upload worker join: {}", e))?;
        }
        let mut state = lock(&self.state);
        debug_assert!(state.is_drained());
        Ok(state.take_summary())
    }
}

/// Start uploading `files` with up to `max_concurrent` in flight, in the given order.
///
/// The first `max_concurrent` files are claimed before this returns; each gets
/// a worker that keeps pulling from the queue until it is empty.
/// Must be called from within a tokio runtime.
pub fn schedule<S: UploadSession>(
    uploader: Arc<RetryingUploader<S>>,
    files: Vec<FileDescriptor>,
    max_concurrent: usize,
) -> PoolHandle {
    let state = Arc::new(Mutex::new(PoolState::new(files, max_concurrent)));
    let mut workers = tokio::task::JoinSet::new();

    let initial = lock(&state).claim_initial();
    publish_counts(&uploader, &state);
    tracing::info!(
        started = initial.len(),
        pending = lock(&state).snapshot().pending,
        max_concurrent,
        "upload pool started"
    );

    for (slot, file) in initial.into_iter().enumerate() {
        let uploader = Arc::clone(&uploader);
        let state = Arc::clone(&state);
        workers.spawn(run_worker(slot, uploader, state, file));
    }

    PoolHandle { state, workers }
}

/// Show the pool counters. The pool lock is only held for the snapshot, never
/// across the redraw, so a slow terminal cannot hold up `finish_and_claim`.
fn publish_counts<S: UploadSession>(uploader: &RetryingUploader<S>, state: &Mutex<PoolState>) {
    uploader
        .dashboard()
        .refresh_counts(|| lock(state).snapshot().into());
}

async fn run_worker<S: UploadSession>(
    slot: usize,
    uploader: Arc<RetryingUploader<S>>,
    state: Arc<Mutex<PoolState>>,
    first: FileDescriptor,
) {
    let mut next = Some(first);
    while let Some(file) = next {
        tracing::debug!(slot, file = %file.relative_path, size = file.size, "slot picked up file");
        let outcome = uploader.upload_with_retry(&file).await;
        next = lock(&state).finish_and_claim(file, outcome);
        publish_counts(&uploader, &state);
    }
    tracing::debug!(slot, "slot idle, queue drained");
}
