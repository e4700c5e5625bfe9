//! Resumable upload primitive used by the uploader.
//!
//! Implementations are blocking (they do network I/O on the calling thread);
//! the uploader runs them inside `spawn_blocking`.

use serde::Deserialize;

use crate::discover::FileDescriptor;
pub use crate::retry::UploadError;

/// Bytes `[min, max)` acknowledged by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub min: u64,
    pub max: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.max.saturating_sub(self.min)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Metadata of the remote object created by a finished upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub created_date_time: Option<String>,
}

/// A provider's resumable, chunked upload protocol.
///
/// `Session` is an opaque handle. Once created for a file it can be passed to
/// [`upload`](UploadSession::upload) again after a failure, and the upload
/// continues from the last acknowledged byte instead of restarting.
pub trait UploadSession: Send + Sync + 'static {
    type Session: Clone + Send + Sync + 'static;

    /// Open a session that will write `file` to `remote_path`.
    fn create(&self, file: &FileDescriptor, remote_path: &str) -> Result<Self::Session, UploadError>;

    /// Send the remaining bytes of `file`, calling `on_progress` once per
    /// acknowledged chunk, and return the created item.
    fn upload(
        &self,
        session: &Self::Session,
        file: &FileDescriptor,
        on_progress: &mut dyn FnMut(ByteRange),
    ) -> Result<UploadedItem, UploadError>;
}
