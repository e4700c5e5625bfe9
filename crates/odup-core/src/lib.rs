pub mod config;
pub mod dashboard;
pub mod logging;

// Upload pipeline: discover → scheduler → uploader → session, with progress
// flowing back through registry → render.
pub mod discover;
pub mod graph;
pub mod registry;
pub mod render;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod size;
pub mod uploader;

#[cfg(test)]
pub(crate) mod test_support;
