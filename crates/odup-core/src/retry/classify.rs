//! Classify upload errors into retry policy error kinds.

use super::error::UploadError;
use super::policy::ErrorKind;

/// Classify an upload error for retry decisions.
pub fn classify(e: &UploadError) -> ErrorKind {
    match e {
        UploadError::Provider { .. } => ErrorKind::Provider,
        UploadError::Io(_) | UploadError::Aborted(_) => ErrorKind::Local,
        UploadError::SessionExpired => ErrorKind::SessionLost,
        UploadError::Unconfirmed(_) => ErrorKind::Unconfirmed,
        UploadError::Http(_) | UploadError::Transport(_) | UploadError::Protocol(_) => {
            ErrorKind::Transient
        }
    }
}
