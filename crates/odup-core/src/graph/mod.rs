//! Microsoft Graph collaborators: app-only token exchange and OneDrive upload sessions.
//!
//! All requests go through libcurl (blocking); callers run them on blocking
//! threads. Response bodies are parsed in [`parse`].

mod auth;
mod http;
mod parse;
mod upload;

pub use auth::{ClientCredentials, TokenSource, GRAPH_SCOPE};
pub use upload::{create_session_url, drive_item_url, GraphSession, GraphUploader};
