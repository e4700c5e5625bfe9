//! Bounded worker pool for file uploads.
//!
//! Keeps up to `max_concurrent` files uploading at once; when one finishes
//! (either way) its worker claims the next pending file, FIFO, until the
//! queue is empty. [`PoolHandle::join`] resolves once every worker is done.

mod pool;
mod state;

pub use pool::{schedule, PoolHandle};
pub use state::{AbandonedFile, PoolSnapshot, PoolState, PoolSummary};
