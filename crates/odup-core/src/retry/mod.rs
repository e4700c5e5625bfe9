//! Retry policy for uploads.
//!
//! Errors that carry a provider error code (and local file errors) are final;
//! everything else is retried after a fixed delay, resuming the same session.

mod classify;
mod error;
mod policy;

pub use classify::classify;
pub use error::UploadError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
